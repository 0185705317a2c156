//! TCP front end driving [`ServerConnection`](crate::http::ServerConnection)s.

pub mod listener;

pub use listener::{ProxyRoute, run, serve};
