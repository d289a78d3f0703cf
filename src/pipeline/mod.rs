//! Message pipeline and its inbound event source.

mod orchestrator;
pub mod source;

pub use orchestrator::{Outcome, Pipeline, PipelineState};
pub use source::{ChatEvent, spawn_stdin_source};
