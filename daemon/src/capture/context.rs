//! Lifecycle of the single capture context
//!
//! The capture context is created lazily the first time capture starts and
//! then kept warm. Creation is guarded by a latch so overlapping start
//! requests collapse into one creation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::browser::HostError;

use super::protocol::CaptureCommand;

/// Well-known address of the capture context
pub const CAPTURE_CONTEXT_ADDRESS: &str = "/capture.html";

/// Operations on whatever hosts the capture context
#[async_trait]
pub trait CaptureHost: Send + Sync {
    async fn has_context(&self, address: &str) -> Result<bool, HostError>;

    async fn create_context(&self, address: &str) -> Result<(), HostError>;

    async fn close_context(&self, address: &str) -> Result<(), HostError>;

    /// Deliver a start/stop request to the live context
    async fn send(&self, command: CaptureCommand) -> Result<(), HostError>;
}

/// Result of [`CaptureContext::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyPresent,
    /// Another caller holds the creation latch
    CreationInFlight,
}

/// Handle managing the zero-or-one capture context
pub struct CaptureContext {
    host: Arc<dyn CaptureHost>,
    address: String,
    creating: AtomicBool,
}

/// Releases the creation latch when dropped
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CaptureContext {
    pub fn new(host: Arc<dyn CaptureHost>) -> Self {
        Self {
            host,
            address: CAPTURE_CONTEXT_ADDRESS.to_string(),
            creating: AtomicBool::new(false),
        }
    }

    /// Make sure exactly one capture context exists
    pub async fn ensure(&self) -> Result<EnsureOutcome, HostError> {
        if self.creating.swap(true, Ordering::SeqCst) {
            warn!("capture context creation already in progress");
            return Ok(EnsureOutcome::CreationInFlight);
        }
        let _latch = LatchGuard(&self.creating);

        if self.host.has_context(&self.address).await? {
            debug!(address = %self.address, "capture context already exists");
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        info!(address = %self.address, "creating capture context");
        self.host.create_context(&self.address).await?;
        Ok(EnsureOutcome::Created)
    }

    /// Destroy the capture context if one exists. Returns whether one did.
    pub async fn release(&self) -> Result<bool, HostError> {
        if !self.host.has_context(&self.address).await? {
            debug!("no capture context to close");
            return Ok(false);
        }

        info!(address = %self.address, "closing capture context");
        self.host.close_context(&self.address).await?;
        Ok(true)
    }

    pub async fn start(&self) -> Result<(), HostError> {
        self.host.send(CaptureCommand::StartCapture).await
    }

    /// Ask the context to stop. Returns `false` when there was no context.
    pub async fn stop(&self) -> Result<bool, HostError> {
        if !self.host.has_context(&self.address).await? {
            warn!("stop requested but no capture context exists");
            return Ok(false);
        }
        self.host.send(CaptureCommand::StopCapture).await?;
        Ok(true)
    }
}
