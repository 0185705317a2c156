//! Rampart - HTTP/WebSocket server toolkit with an asynchronous PostgreSQL pool
//!
//! Core library: sans-io HTTP and WebSocket connections, a reverse proxy,
//! and a reactor-driven database connection pool.

pub mod config;
pub mod http;
pub mod postgres;
pub mod proxy;
pub mod reactor;
pub mod server;
pub mod websocket;
