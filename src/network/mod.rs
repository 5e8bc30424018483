//! Network Layer
//!
//! WebSocket transport for the engine operations. Everything here is
//! plumbing: all game rules live in `engine/`.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ClientRequest, ErrorCode, ServerMessage};
pub use server::{ServerError, SpinServer};
