//! HTTP/1.1 message model, incremental parsers and connection state machines.
//!
//! # Architecture
//!
//! - **`headers`**, **`request`**, **`reply`**, **`form`**: the message model
//! - **`parser`**, **`reply_parser`**: byte-at-a-time parsers that resume
//!   across reads
//! - **`connection`**: sans-io server connection (HTTP and WebSocket)
//! - **`client`**: sans-io client connection and a tokio client on top of it
//! - **`writer`**: flushes queued output to a tokio stream
//! - **`mime`**: extension to MIME type lookup
//!
//! # Server connection states
//!
//! ```text
//!        ┌─────────────┐
//!        │ WaitRequest │ ← bytes arrive, parser resumes
//!        └──────┬──────┘
//!               │ Complete            Invalid → 400, close
//!               ▼
//!        ┌──────────────────┐
//!        │    RequestOk     │ ← handler builds the reply (504 on timeout)
//!        └──────┬───────────┘
//!               │ send_reply
//!               ▼
//!        ┌──────────────────┐
//!        │    ReplyReady    │ ← output flushed by the runner
//!        └──────┬───────────┘
//!               │ on_reply_sent
//!               ├─ keep-alive → WaitRequest
//!               ├─ 101        → WebSocket framing
//!               └─ close      → Closed
//! ```

pub mod client;
pub mod connection;
pub mod form;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod reply;
pub mod reply_parser;
pub mod request;
pub mod writer;

pub use client::{ClientConnection, ClientHandler, HttpClient};
pub use connection::{ConnectionId, ConnectionStatus, Protocol, ServerConnection, ServerHandler};
pub use headers::{Header, Headers};
pub use parser::{ParseResult, RequestParser};
pub use reply::{ContentType, Reply, StatusCode};
pub use reply_parser::ReplyParser;
pub use request::{Method, Request};
