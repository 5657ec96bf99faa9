//! Chat-completion layer.
//!
//! This module provides:
//! * [`ChatCompletion`]: async trait implemented by every completion backend.
//! * [`ApiCompletion`]: OpenAI-compatible REST client (OpenAI, Groq, local).
//! * [`CompletionParams`]: model + sampling parameters for one request.
//! * [`PromptTemplate`]: placeholder substitution for a prompt chain.
//! * [`LlmError`]: error variants for completion calls.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use quick_ai::config::AppConfig;
//! use quick_ai::llm::{ApiCompletion, ChatCompletion};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let completion = ApiCompletion::from_config(&config.ai);
//!
//!     let reply = completion
//!         .complete("Say hello in French.", &config.ai.completion_params())
//!         .await
//!         .unwrap();
//!     println!("{reply}");
//! }
//! ```

pub mod client;
pub mod template;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{ApiCompletion, ChatCompletion, CompletionParams, LlmError};
pub use template::{list_literal, PromptTemplate};

#[cfg(test)]
pub use client::MockCompletion;
