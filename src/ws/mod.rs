//! WebSocket transport for the relay

pub mod handler;
pub mod protocol;

pub use handler::ws_handler;
pub use protocol::{ClientMsg, ProtocolError, ServerMsg};
