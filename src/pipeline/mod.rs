//! Pipeline orchestration for a quick-ai run.
//!
//! This module wires note resolution, the prompt chain and narration together
//! behind two channels the UI talks to.
//!
//! # Architecture
//!
//! ```text
//! UI ──PipelineCommand (mpsc)──▶ PipelineOrchestrator::run()  ← tokio task
//!                                      │
//!                                      ├─ Run  → spawn: resolve notes → CompletionRunner
//!                                      │          └─ ok + play_sound → spawn: narrate()
//!                                      ├─ Stop → StopSignal::stop()
//!                                      ├─ ListModels → ChatCompletion::list_models()
//!                                      └─ ApplySettings → ServiceFactory rebuilds the clients
//!
//! UI ◀──PipelineResult (mpsc)── try_recv() every egui frame
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use quick_ai::collection::AnkiCollection;
//! use quick_ai::config::AppConfig;
//! use quick_ai::pipeline::{
//!     ApiServices, PipelineCommand, PipelineContext, PipelineOrchestrator, RunRequest,
//! };
//! use quick_ai::speech::RodioPlayer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let store = AnkiCollection::open("collection.anki2".as_ref()).unwrap();
//!     let context = PipelineContext::new(
//!         &config,
//!         Arc::new(store),
//!         Arc::new(RodioPlayer),
//!         Arc::new(ApiServices),
//!     );
//!
//!     let (command_tx, command_rx) = mpsc::channel(16);
//!     let (result_tx, mut result_rx) = mpsc::channel(32);
//!     tokio::spawn(PipelineOrchestrator::new(context, result_tx).run(command_rx));
//!
//!     let request = RunRequest::from_config(&config, None).unwrap();
//!     command_tx.send(PipelineCommand::Run(request)).await.unwrap();
//!     while let Some(result) = result_rx.recv().await {
//!         println!("{result:?}");
//!     }
//! }
//! ```

pub mod chain;
pub mod narration;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use chain::{run_chain, ChainError, ChainOutcome, CompletionRunner};
pub use narration::{narrate, NarrationError, NarrationRequest};
pub use runner::{
    ApiServices, PipelineCommand, PipelineContext, PipelineError, PipelineOrchestrator,
    PipelineResult, RunRequest, ServiceFactory,
};
pub use state::{ChainState, StopSignal};
