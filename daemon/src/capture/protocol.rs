//! Messages exchanged with the capture context

use serde::{Deserialize, Serialize};

/// Requests sent from the coordinator to the capture context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCommand {
    StartCapture,
    StopCapture,
}

/// Lifecycle events reported by the capture context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureEvent {
    CaptureStarted,
    CaptureEnded,
    CaptureError { code: CaptureErrorCode },
    Transcript { text: String },
}

/// Error codes raised by the speech capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CaptureErrorCode {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    StartFailed,
    NotInitialized,
    Unsupported,
    Other(String),
}

impl CaptureErrorCode {
    /// Message shown on the control surface
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureErrorCode::NoSpeech => "No speech detected.",
            CaptureErrorCode::AudioCapture => "Microphone issue.",
            CaptureErrorCode::NotAllowed => "Microphone permission denied.",
            CaptureErrorCode::StartFailed => "Failed to start microphone.",
            CaptureErrorCode::NotInitialized => "Mic API not ready.",
            CaptureErrorCode::Unsupported => "Speech recognition not supported.",
            CaptureErrorCode::Other(_) => "Microphone error.",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CaptureErrorCode::NoSpeech => "no-speech",
            CaptureErrorCode::AudioCapture => "audio-capture",
            CaptureErrorCode::NotAllowed => "not-allowed",
            CaptureErrorCode::StartFailed => "start_failed",
            CaptureErrorCode::NotInitialized => "not_initialized",
            CaptureErrorCode::Unsupported => "api_not_supported",
            CaptureErrorCode::Other(code) => code,
        }
    }
}

impl From<String> for CaptureErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "no-speech" => CaptureErrorCode::NoSpeech,
            "audio-capture" => CaptureErrorCode::AudioCapture,
            "not-allowed" => CaptureErrorCode::NotAllowed,
            "start_failed" => CaptureErrorCode::StartFailed,
            "not_initialized" => CaptureErrorCode::NotInitialized,
            "api_not_supported" => CaptureErrorCode::Unsupported,
            _ => CaptureErrorCode::Other(code),
        }
    }
}

impl From<CaptureErrorCode> for String {
    fn from(code: CaptureErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl std::fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
