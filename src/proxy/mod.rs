//! Reverse proxy: requests under a configured path prefix are relayed to an
//! upstream HTTP server and the upstream reply is sent back to the client.

pub mod manager;
pub mod upstream;

pub use manager::ProxyManager;
pub use upstream::Proxy;
