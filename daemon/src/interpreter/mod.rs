//! Turns transcripts into commands via a remote language model
//!
//! One request is made per transcript and never retried. Every failure mode
//! has its own [`InterpretError`] variant whose display text is the message
//! shown to the user.

mod client;
mod prompt;

use async_trait::async_trait;

use crate::browser::Command;

pub use client::GeminiInterpreter;
pub use prompt::{build_prompt, parse_command};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpretError {
    /// Request never produced a response (connect, TLS, timeout)
    #[error("Network Error: {0}")]
    Network(String),

    /// Service answered with a non-success status
    #[error("Interpretation service error: {0}")]
    Status(u16),

    /// Response envelope lacked the generated text
    #[error("Received invalid response from AI.")]
    InvalidEnvelope(String),

    /// Generated text was not JSON
    #[error("Failed to understand command.")]
    Malformed(String),

    /// Generated JSON had no `action`
    #[error("Couldn't determine action.")]
    MissingAction,
}

/// Something that can interpret a transcript into a [`Command`]
#[async_trait]
pub trait Interpret: Send + Sync {
    async fn interpret(&self, credential: &str, transcript: &str) -> Result<Command, InterpretError>;
}
