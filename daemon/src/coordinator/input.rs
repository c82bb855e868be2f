//! Messages consumed by the coordinator loop

use tokio::sync::oneshot;

use crate::browser::Command;
use crate::capture::CaptureEvent;
use crate::interpreter::InterpretError;

use super::worker::CaptureReport;

/// Everything the coordinator reacts to from outside its own task
#[derive(Debug)]
pub enum CoordinatorInput {
    /// Control surface pressed the listen button
    Toggle { reply: oneshot::Sender<()> },

    /// Control surface supplied a new credential
    Configure {
        value: String,
        reply: oneshot::Sender<Result<(), ConfigureError>>,
    },

    /// Lifecycle event or transcript from the capture context
    Capture(CaptureEvent),

    /// A browser peer attached to the bridge
    BridgeAttached,
}

/// Progress reported by tasks the coordinator spawned
#[derive(Debug)]
pub(crate) enum TaskEvent {
    /// An interpretation round got its reply
    Interpreted(Result<Command, InterpretError>),
    /// An interpretation round finished executing its command
    ActionsFinished,
    /// The capture worker finished an operation
    Capture(CaptureReport),
}

/// Why a credential was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigureError {
    #[error("No API key provided.")]
    Empty,

    #[error("Failed to save API key.")]
    Storage(String),
}
