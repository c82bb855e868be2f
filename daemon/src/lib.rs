//! voice-nav daemon: hands-free browser control by voice
//!
//! The daemon coordinates a listening session:
//! - a capture context in the browser turns speech into transcripts
//! - the interpreter turns a transcript into one structured command
//! - the dispatcher performs the command against the browser
//!
//! Control surfaces and the browser peer reach the daemon over a Unix socket.

pub mod bridge;
pub mod browser;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod events;
pub mod interpreter;
pub mod ipc;
pub mod lifecycle;
pub mod state;

#[cfg(test)]
mod test_support;
