//! Events broadcast from the coordinator to control surfaces
//!
//! Every report the daemon makes (state changes, progress, errors) goes out
//! as a [`ControlEvent`] on a broadcast channel. Having nobody listening is
//! the normal case and is distinguished from genuine delivery failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::state::SessionSnapshot;

/// Events pushed to subscribed control surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Listening state or credential presence changed
    StateUpdate {
        listening: bool,
        #[serde(rename = "credentialSet")]
        credential_set: bool,
        processing: bool,
    },

    /// Progress report, cleared by the surface after `clear_after_ms`
    Status {
        message: String,
        #[serde(rename = "clearAfterMs")]
        clear_after_ms: u64,
    },

    /// Error report, cleared by the surface after `clear_after_ms`
    Error {
        message: String,
        #[serde(rename = "clearAfterMs")]
        clear_after_ms: u64,
    },
}

impl From<SessionSnapshot> for ControlEvent {
    fn from(snapshot: SessionSnapshot) -> Self {
        ControlEvent::StateUpdate {
            listening: snapshot.listening,
            credential_set: snapshot.credential_set,
            processing: snapshot.processing,
        }
    }
}

impl std::fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlEvent::StateUpdate {
                listening,
                credential_set,
                processing,
            } => write!(
                f,
                "STATE_UPDATE (listening={listening}, credential_set={credential_set}, processing={processing})"
            ),
            ControlEvent::Status { message, .. } => write!(f, "STATUS ({message})"),
            ControlEvent::Error { message, .. } => write!(f, "ERROR ({message})"),
        }
    }
}

/// Why a broadcast did not reach anyone
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No control surface is currently subscribed
    #[error("no active listener")]
    NoListener,

    /// A subscriber exists but the event could not be written to it
    #[error("failed to deliver event: {0}")]
    Transport(String),
}

impl PublishError {
    /// Log the failure at a level matching its severity
    pub fn log(&self, event: &ControlEvent) {
        match self {
            PublishError::NoListener => trace!(%event, "broadcast had no listener"),
            PublishError::Transport(reason) => warn!(%event, %reason, "broadcast delivery failed"),
        }
    }
}

/// Cloneable handle for publishing control events
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<ControlEvent>,
    clear_after: Duration,
}

impl Broadcaster {
    pub fn new(capacity: usize, clear_after: Duration) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, clear_after }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: ControlEvent) -> Result<usize, PublishError> {
        self.tx.send(event).map_err(|_| PublishError::NoListener)
    }

    pub fn state(&self, snapshot: SessionSnapshot) {
        self.deliver(snapshot.into());
    }

    pub fn status(&self, message: impl Into<String>) {
        self.deliver(ControlEvent::Status {
            message: message.into(),
            clear_after_ms: self.clear_after.as_millis() as u64,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.deliver(ControlEvent::Error {
            message: message.into(),
            clear_after_ms: self.clear_after.as_millis() as u64,
        });
    }

    fn deliver(&self, event: ControlEvent) {
        debug!(%event, "broadcasting");
        if let Err(e) = self.publish(event.clone()) {
            e.log(&event);
        }
    }
}
