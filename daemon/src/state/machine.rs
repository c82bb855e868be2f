//! Core session state machine
//!
//! Tracks the coordinator's phase across Idle, Starting, Listening,
//! Interpreting and Acting. Transitions are computed from the current phase
//! and a [`Trigger`]; the listening/processing flags seen by the control
//! surface are derived from the phase, never stored separately.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// The five phases of a listening session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not listening, nothing in flight
    #[default]
    Idle,
    /// Capture start requested, waiting for the capture context to confirm
    Starting,
    /// Capture confirmed active
    Listening,
    /// Transcript received, waiting on the interpretation service
    Interpreting,
    /// Command identified, browser side effects running
    Acting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Starting => write!(f, "Starting"),
            Phase::Listening => write!(f, "Listening"),
            Phase::Interpreting => write!(f, "Interpreting"),
            Phase::Acting => write!(f, "Acting"),
        }
    }
}

/// Inputs that may move the session to another phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Toggle asked to start capture (credential already checked)
    StartRequested,
    /// Toggle asked to stop capture
    StopRequested,
    /// Capture context reported it started
    CaptureStarted,
    /// Capture context could not be created or reached
    CaptureStartFailed,
    /// Capture context reported it ended
    CaptureEnded,
    /// Capture context reported an error
    CaptureError,
    /// A non-empty transcript arrived and a round was started
    TranscriptReceived,
    /// A round produced a command
    Interpreted,
    /// A round failed to produce a command
    InterpretationFailed,
    /// A round finished executing its command
    ActionsFinished,
}

/// Read-only view of the session handed to other components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub listening: bool,
    pub processing: bool,
    pub credential_set: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            listening: false,
            processing: false,
            credential_set: false,
        }
    }
}

/// Session state owned by the coordinator
#[derive(Debug, Default)]
pub struct SessionState {
    phase: Phase,
    /// Interpretation rounds started but not yet finished
    rounds_in_flight: u32,
    /// Time when the current non-Idle phase was entered
    entered_at: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rounds_in_flight(&self) -> u32 {
        self.rounds_in_flight
    }

    /// True while the capture context has confirmed it is capturing
    pub fn is_listening(&self) -> bool {
        self.phase == Phase::Listening
    }

    /// True while a start or an interpretation round is pending
    pub fn is_processing(&self) -> bool {
        matches!(
            self.phase,
            Phase::Starting | Phase::Interpreting | Phase::Acting
        )
    }

    /// Whether a toggle should stop capture rather than start it
    pub fn wants_capture(&self) -> bool {
        matches!(self.phase, Phase::Starting | Phase::Listening)
    }

    pub fn snapshot(&self, credential_set: bool) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            listening: self.is_listening(),
            processing: self.is_processing(),
            credential_set,
        }
    }

    /// Apply a trigger. Returns `true` if the phase changed.
    pub fn apply(&mut self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::TranscriptReceived => self.rounds_in_flight += 1,
            Trigger::InterpretationFailed | Trigger::ActionsFinished => {
                self.rounds_in_flight = self.rounds_in_flight.saturating_sub(1);
            }
            _ => {}
        }

        let next = self.compute_next_phase(trigger);
        if next == self.phase {
            debug!(phase = %self.phase, ?trigger, "trigger caused no transition");
            return false;
        }

        self.transition_to(next, trigger);
        true
    }

    fn compute_next_phase(&self, trigger: Trigger) -> Phase {
        // Capture errors reset from anywhere
        if trigger == Trigger::CaptureError {
            return Phase::Idle;
        }

        match self.phase {
            Phase::Idle => self.compute_from_idle(trigger),
            Phase::Starting => self.compute_from_starting(trigger),
            Phase::Listening => self.compute_from_listening(trigger),
            Phase::Interpreting | Phase::Acting => self.compute_from_round(trigger),
        }
    }

    fn compute_from_idle(&self, trigger: Trigger) -> Phase {
        match trigger {
            Trigger::StartRequested => Phase::Starting,
            // Late transcript after an optimistic stop
            Trigger::TranscriptReceived => Phase::Interpreting,
            _ => Phase::Idle,
        }
    }

    fn compute_from_starting(&self, trigger: Trigger) -> Phase {
        match trigger {
            Trigger::CaptureStarted => Phase::Listening,
            // An end reported here belongs to the capture that was just stopped
            Trigger::CaptureStartFailed | Trigger::StopRequested => Phase::Idle,
            Trigger::TranscriptReceived => Phase::Interpreting,
            _ => Phase::Starting,
        }
    }

    fn compute_from_listening(&self, trigger: Trigger) -> Phase {
        match trigger {
            Trigger::StopRequested | Trigger::CaptureEnded => Phase::Idle,
            Trigger::TranscriptReceived => Phase::Interpreting,
            _ => Phase::Listening,
        }
    }

    /// Interpreting and Acting share exit rules: the phase only drops back to
    /// Idle once the last in-flight round has finished.
    fn compute_from_round(&self, trigger: Trigger) -> Phase {
        match trigger {
            Trigger::StartRequested => Phase::Starting,
            Trigger::Interpreted if self.phase == Phase::Interpreting => Phase::Acting,
            Trigger::InterpretationFailed | Trigger::ActionsFinished
                if self.rounds_in_flight == 0 =>
            {
                Phase::Idle
            }
            _ => self.phase,
        }
    }

    fn transition_to(&mut self, next: Phase, trigger: Trigger) {
        let duration_ms = self
            .entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %self.phase,
            to = %next,
            ?trigger,
            duration_ms,
            "session transition"
        );

        self.phase = next;
        self.entered_at = if next != Phase::Idle {
            Some(Instant::now())
        } else {
            None
        };
    }
}
