//! IPC module for control surface and browser peer communication

mod protocol;
mod server;

pub use protocol::{Incoming, Outgoing, PeerFrame, Request, Response, MAX_FRAME_LEN};
pub use server::{Server, ServerContext};
