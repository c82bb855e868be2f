//! Capture context management
//!
//! The capture context owns the microphone and speech-to-text capability.
//! The daemon only creates it, sends it start/stop requests and receives its
//! lifecycle events.

mod context;
mod protocol;

pub use context::{CaptureContext, CaptureHost, EnsureOutcome, CAPTURE_CONTEXT_ADDRESS};
pub use protocol::{CaptureCommand, CaptureErrorCode, CaptureEvent};
