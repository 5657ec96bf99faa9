//! quick-ai: run a chain of AI prompts over the notes a search selects, show
//! every prompt and response, and optionally read the responses aloud.
//!
//! * [`collection`]: search expressions and the read-only collection reader.
//! * [`llm`]: chat-completion client and prompt templating.
//! * [`speech`]: text-to-speech client and audio playback.
//! * [`pipeline`]: the orchestrator, prompt chain and narration runner.
//! * [`present`]: the transcript shown after a run.
//! * [`app`]: the egui window.
//! * [`config`], [`cli`]: settings file and command-line overrides.

pub mod app;
pub mod cli;
pub mod collection;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod present;
pub mod speech;
