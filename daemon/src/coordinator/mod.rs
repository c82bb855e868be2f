//! Session coordinator
//!
//! Owns the session state and the credential. Runs as a single task: control
//! requests and capture events arrive on one channel, spawned work reports
//! back on another. Interpretation rounds and capture-context operations run
//! outside the loop, so it never waits on the interpretation service or the
//! browser peer, and a stop request never cancels a round already in flight.

mod input;
mod worker;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserHost, Dispatcher};
use crate::capture::{CaptureContext, CaptureEvent, CaptureHost};
use crate::credential::CredentialStore;
use crate::events::Broadcaster;
use crate::interpreter::Interpret;
use crate::state::{Phase, SessionSnapshot, SessionState, Trigger};

pub use input::{ConfigureError, CoordinatorInput};
use input::TaskEvent;
use worker::{CaptureOp, CaptureReport, StartFailure};

const TASK_QUEUE_DEPTH: usize = 16;

/// Collaborators handed to [`Coordinator::new`]
pub struct CoordinatorParts {
    pub store: Arc<dyn CredentialStore>,
    /// Credential loaded from the store at startup
    pub credential: Option<String>,
    pub capture: Arc<dyn CaptureHost>,
    pub browser: Arc<dyn BrowserHost>,
    pub interpreter: Arc<dyn Interpret>,
    pub events: Broadcaster,
}

pub struct Coordinator {
    session: SessionState,
    credential: Option<String>,
    store: Arc<dyn CredentialStore>,
    capture_ops: mpsc::UnboundedSender<CaptureOp>,
    capture_ops_in_flight: u32,
    /// Identifies the latest start so failures of older ones are ignored
    start_attempt: u64,
    interpreter: Arc<dyn Interpret>,
    dispatcher: Arc<Dispatcher>,
    events: Broadcaster,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    task_tx: mpsc::Sender<TaskEvent>,
    task_rx: mpsc::Receiver<TaskEvent>,
}

impl Coordinator {
    /// Build the coordinator and spawn its capture worker. Must be called
    /// inside the runtime.
    pub fn new(parts: CoordinatorParts) -> Self {
        let session = SessionState::new();
        let (snapshot_tx, _) = watch::channel(session.snapshot(parts.credential.is_some()));
        let (task_tx, task_rx) = mpsc::channel(TASK_QUEUE_DEPTH);

        let (capture_ops, ops_rx) = mpsc::unbounded_channel();
        tokio::spawn(worker::run(
            CaptureContext::new(parts.capture),
            ops_rx,
            task_tx.clone(),
        ));

        Self {
            session,
            credential: parts.credential,
            store: parts.store,
            capture_ops,
            capture_ops_in_flight: 0,
            start_attempt: 0,
            interpreter: parts.interpreter,
            dispatcher: Arc::new(Dispatcher::new(parts.browser, parts.events.clone())),
            events: parts.events,
            snapshot_tx,
            task_tx,
            task_rx,
        }
    }

    /// Read-only view of the session that never waits on this task
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot(self.credential.is_some())
    }

    /// Run until the input channel closes
    pub async fn run(mut self, mut inputs: mpsc::Receiver<CoordinatorInput>) {
        info!(
            credential_set = self.credential.is_some(),
            "coordinator started in Idle state"
        );
        self.publish_state();

        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => break,
                },
                Some(event) = self.task_rx.recv() => self.handle_task_event(event),
            }
        }

        info!("coordinator stopped");
    }

    async fn handle_input(&mut self, input: CoordinatorInput) {
        match input {
            CoordinatorInput::Toggle { reply } => {
                // Acknowledge first; the outcome arrives as broadcasts
                let _ = reply.send(());
                self.toggle();
            }
            CoordinatorInput::Configure { value, reply } => {
                let result = self.configure(&value).await;
                let _ = reply.send(result);
            }
            CoordinatorInput::Capture(event) => self.on_capture_event(event),
            CoordinatorInput::BridgeAttached => self.release_capture(),
        }
    }

    /// Flip the listening intent
    pub fn toggle(&mut self) {
        if self.session.wants_capture() {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    fn start_listening(&mut self) {
        if self.credential.is_none() {
            warn!("cannot start listening: credential not set");
            self.events.error("API key not set. Please set it first.");
            self.publish_state();
            return;
        }

        // Listening is only entered once the context confirms it started
        self.apply(Trigger::StartRequested);
        self.start_attempt += 1;
        self.submit(CaptureOp::Start {
            attempt: self.start_attempt,
        });
    }

    fn stop_listening(&mut self) {
        self.apply(Trigger::StopRequested);
        self.submit(CaptureOp::Stop);
    }

    /// Store a new credential durably
    pub async fn configure(&mut self, value: &str) -> Result<(), ConfigureError> {
        let value = value.trim();
        if value.is_empty() {
            warn!("rejecting empty credential");
            return Err(ConfigureError::Empty);
        }

        if let Err(e) = self.store.save(value).await {
            error!(error = %e, "failed to persist credential");
            return Err(ConfigureError::Storage(e.to_string()));
        }

        self.credential = Some(value.to_string());
        info!("credential configured");
        self.publish_state();
        Ok(())
    }

    pub fn on_capture_event(&mut self, event: CaptureEvent) {
        debug!(?event, "capture event");

        match event {
            CaptureEvent::CaptureStarted => {
                if !self.apply(Trigger::CaptureStarted) {
                    debug!(phase = %self.session.phase(), "capture started outside Starting, ignored");
                }
            }
            CaptureEvent::CaptureEnded => {
                self.apply(Trigger::CaptureEnded);
            }
            CaptureEvent::CaptureError { code } => {
                warn!(%code, "capture context reported an error");
                self.events.error(code.user_message());
                if !self.apply(Trigger::CaptureError) {
                    self.publish_state();
                }
            }
            CaptureEvent::Transcript { text } => self.on_transcript(&text),
        }
    }

    /// Start an interpretation round for a transcript
    pub fn on_transcript(&mut self, text: &str) {
        let transcript = text.trim();
        if transcript.is_empty() {
            debug!("ignoring empty transcript");
            return;
        }

        let Some(credential) = self.credential.clone() else {
            warn!("transcript received but credential not set");
            self.events.error("API key not set.");
            return;
        };

        info!(transcript, "transcript received");
        self.apply(Trigger::TranscriptReceived);
        self.events.status(format!("Processing: \"{transcript}\""));

        let interpreter = Arc::clone(&self.interpreter);
        let task_tx = self.task_tx.clone();
        let transcript = transcript.to_string();
        tokio::spawn(async move {
            let result = interpreter.interpret(&credential, &transcript).await;
            if task_tx.send(TaskEvent::Interpreted(result)).await.is_err() {
                debug!("coordinator stopped before interpretation finished");
            }
        });
    }

    /// Close the capture context, if any
    pub fn release_capture(&mut self) {
        self.submit(CaptureOp::Release);
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Interpreted(Ok(command)) => {
                info!(action = %command.action, "command interpreted");
                self.events.status(format!("Executing: {}", command.action));
                self.apply(Trigger::Interpreted);

                let dispatcher = Arc::clone(&self.dispatcher);
                let task_tx = self.task_tx.clone();
                tokio::spawn(async move {
                    // A panicking action still finishes the round
                    let dispatch = tokio::spawn(async move { dispatcher.dispatch(&command).await });
                    if let Err(e) = dispatch.await {
                        error!(error = %e, "action task failed");
                    }
                    let _ = task_tx.send(TaskEvent::ActionsFinished).await;
                });
            }
            TaskEvent::Interpreted(Err(e)) => {
                warn!(error = ?e, "interpretation failed");
                self.events.error(e.to_string());
                if !self.apply(Trigger::InterpretationFailed) {
                    self.publish_state();
                }
            }
            TaskEvent::ActionsFinished => {
                if !self.apply(Trigger::ActionsFinished) {
                    self.publish_state();
                }
            }
            TaskEvent::Capture(report) => {
                self.capture_ops_in_flight = self.capture_ops_in_flight.saturating_sub(1);
                self.on_capture_report(report);
            }
        }
    }

    fn on_capture_report(&mut self, report: CaptureReport) {
        match report {
            CaptureReport::StartSent { attempt } => debug!(attempt, "awaiting capture confirmation"),
            CaptureReport::StartFailed { attempt, failure } => {
                if attempt != self.start_attempt || self.session.phase() != Phase::Starting {
                    debug!(attempt, ?failure, "failure of a superseded start, ignored");
                    return;
                }
                self.events.error(failure.user_message());
                self.apply(Trigger::CaptureStartFailed);
            }
            CaptureReport::Stopped => {}
            CaptureReport::Released { closed } => {
                if closed {
                    info!("closed leftover capture context");
                    self.apply(Trigger::CaptureEnded);
                }
            }
        }
    }

    fn submit(&mut self, op: CaptureOp) {
        if self.capture_ops.send(op).is_err() {
            error!(?op, "capture worker is not running");
            if matches!(op, CaptureOp::Start { .. }) {
                self.events.error(
                    StartFailure::Delivery(crate::browser::HostError::Disconnected).user_message(),
                );
                self.apply(Trigger::CaptureStartFailed);
            }
            return;
        }
        self.capture_ops_in_flight += 1;
    }

    /// Apply a trigger and publish the new state if the phase changed
    fn apply(&mut self, trigger: Trigger) -> bool {
        let changed = self.session.apply(trigger);
        if changed {
            self.publish_state();
        }
        changed
    }

    fn publish_state(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot);
        self.events.state(snapshot);
    }

    /// Process spawned work until no round or capture operation is pending
    #[cfg(test)]
    pub(crate) async fn settle(&mut self) {
        while self.session.rounds_in_flight() > 0 || self.capture_ops_in_flight > 0 {
            match self.task_rx.recv().await {
                Some(event) => self.handle_task_event(event),
                None => break,
            }
        }
    }
}
