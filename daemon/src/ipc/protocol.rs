//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Control surfaces and the browser peer share the same socket; what a frame
//! means is decided by its `type` tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::BridgeCall;
use crate::capture::CaptureEvent;
use crate::events::ControlEvent;

/// Largest frame body accepted from a client
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from a control surface or the browser peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Flip the listening intent
    Toggle,

    /// Current listening state and credential presence
    GetState,

    /// Store a new interpretation credential
    SetCredential { value: String },

    /// Receive broadcasts on this connection
    Subscribe,

    /// Ping to check connectivity
    Ping,

    /// Attach this connection as the browser peer
    AttachBridge,
}

/// Answer from the peer to a [`BridgeCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeReply {
    BridgeReply {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl BridgeReply {
    pub fn into_parts(self) -> (u64, Result<Value, String>) {
        let BridgeReply::BridgeReply { id, result, error } = self;
        match error {
            Some(reason) => (id, Err(reason)),
            None => (id, Ok(result)),
        }
    }
}

/// Any frame a client may send
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Request(Request),
    Capture(CaptureEvent),
    Reply(BridgeReply),
}

/// Responses from daemon to a requesting client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Toggle accepted; the outcome follows as broadcasts
    Ack { success: bool },

    State {
        success: bool,
        listening: bool,
        #[serde(rename = "credentialSet")]
        credential_set: bool,
    },

    Credential {
        success: bool,
        #[serde(
            rename = "credentialSet",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        credential_set: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    BridgeAttached,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Frames pushed to the browser peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerFrame {
    BridgeCall(BridgeCall),
}

/// Anything the daemon writes to a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    Response(Response),
    Event(ControlEvent),
    Peer(PeerFrame),
}

impl From<Response> for Outgoing {
    fn from(response: Response) -> Self {
        Outgoing::Response(response)
    }
}

impl From<ControlEvent> for Outgoing {
    fn from(event: ControlEvent) -> Self {
        Outgoing::Event(event)
    }
}

impl From<BridgeCall> for Outgoing {
    fn from(call: BridgeCall) -> Self {
        Outgoing::Peer(PeerFrame::BridgeCall(call))
    }
}
