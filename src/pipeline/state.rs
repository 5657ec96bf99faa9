//! Prompt-chain state machine and the stop signal shared with the UI.
//!
//! ```text
//! Idle ──stage i sent──▶ Requesting(i) ──reply──▶ Idle ──…──▶ Done
//!                              └────error / stop────────────▶ Failed
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ChainState
// ---------------------------------------------------------------------------

/// Progress of one prompt chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChainState {
    /// Between stages, or not started.
    #[default]
    Idle,
    /// Waiting for the reply to stage `i`.
    Requesting(usize),
    /// Every stage answered.
    Done,
    /// A stage failed or the chain was stopped.
    Failed,
}

// ---------------------------------------------------------------------------
// StopSignal
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked by the chain between stages.
///
/// Cheap to clone; every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
