//! Session state machine
//!
//! Provides an explicit state machine with five phases:
//! - Idle: nothing captured, nothing in flight
//! - Starting: capture requested, awaiting confirmation
//! - Listening: capture confirmed active
//! - Interpreting: transcript sent to the interpretation service
//! - Acting: browser side effects running

mod machine;

pub use machine::{Phase, SessionSnapshot, SessionState, Trigger};
