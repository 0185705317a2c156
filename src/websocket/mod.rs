//! WebSocket support: frame codec, incremental frame parser, opening
//! handshake and the JSON message envelope used on top of it.

pub mod frame;
pub mod handshake;
pub mod parser;
pub mod protocol;

pub use frame::{Frame, OpCode, WebSocket, apply_mask};
pub use parser::WebSocketParser;
pub use protocol::{Message, MessageType};
