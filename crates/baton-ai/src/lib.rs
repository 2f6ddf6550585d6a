//! baton-ai: model provider boundary
//!
//! This crate defines the message and tool-call types exchanged with a
//! chat-completion model, the incremental stream events a provider emits,
//! and the [`providers::ModelProvider`] trait the agent runtime drives.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::ModelProvider;
pub use stream::{StreamCollector, StreamEvent, StreamEventStream, ToolCallAccumulator};
pub use types::*;
