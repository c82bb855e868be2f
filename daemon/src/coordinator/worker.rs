//! Capture-context operations, run off the coordinator loop
//!
//! Every operation reaches the browser peer, which may be slow or busy
//! sending us events. Operations run one at a time in submission order, so a
//! stop never overtakes the start before it.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::browser::HostError;
use crate::capture::CaptureContext;

use super::input::TaskEvent;

/// Work queued for the capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureOp {
    /// Ensure a context exists and ask it to start; `attempt` identifies the
    /// toggle that asked
    Start { attempt: u64 },
    Stop,
    /// Close the context if one exists
    Release,
}

/// Why a start attempt did not reach the capture context
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartFailure {
    Context(HostError),
    Delivery(HostError),
}

impl StartFailure {
    pub(crate) fn user_message(&self) -> &'static str {
        match self {
            StartFailure::Context(_) => "Failed to initialize microphone.",
            StartFailure::Delivery(_) => "Mic not ready, try again.",
        }
    }
}

/// Result of one [`CaptureOp`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CaptureReport {
    StartSent { attempt: u64 },
    StartFailed { attempt: u64, failure: StartFailure },
    Stopped,
    Released { closed: bool },
}

/// Run queued operations until the coordinator goes away
pub(crate) async fn run(
    context: CaptureContext,
    mut ops: mpsc::UnboundedReceiver<CaptureOp>,
    reports: mpsc::Sender<TaskEvent>,
) {
    while let Some(op) = ops.recv().await {
        let report = match op {
            CaptureOp::Start { attempt } => start(&context, attempt).await,
            CaptureOp::Stop => {
                match context.stop().await {
                    Ok(true) => debug!("stop sent to capture context"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "failed to send stop to capture context"),
                }
                CaptureReport::Stopped
            }
            CaptureOp::Release => {
                let closed = match context.release().await {
                    Ok(closed) => closed,
                    Err(e) => {
                        warn!(error = %e, "failed to close capture context");
                        false
                    }
                };
                CaptureReport::Released { closed }
            }
        };

        if reports.send(TaskEvent::Capture(report)).await.is_err() {
            break;
        }
    }

    debug!("capture worker stopped");
}

async fn start(context: &CaptureContext, attempt: u64) -> CaptureReport {
    match context.ensure().await {
        Ok(outcome) => debug!(?outcome, attempt, "capture context ready"),
        Err(e) => {
            error!(error = %e, attempt, "failed to set up capture context");
            return CaptureReport::StartFailed {
                attempt,
                failure: StartFailure::Context(e),
            };
        }
    }

    match context.start().await {
        Ok(()) => {
            info!(attempt, "start sent to capture context");
            CaptureReport::StartSent { attempt }
        }
        Err(e) => {
            warn!(error = %e, attempt, "failed to send start to capture context");
            CaptureReport::StartFailed {
                attempt,
                failure: StartFailure::Delivery(e),
            }
        }
    }
}
