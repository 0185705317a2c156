//! Asynchronous PostgreSQL connection pool.
//!
//! - **`conninfo`**: connection parameters and connection strings
//! - **`driver`**: the native client interface the pool drives
//! - **`connection`**: pooled connection state
//! - **`query`**: SQL, results and completion callbacks
//! - **`pool`**: the reactor-driven pool and its query queue
//! - **`client`**: pool built from configuration

pub mod client;
pub mod connection;
pub mod conninfo;
pub mod driver;
pub mod error;
pub mod pool;
pub mod query;

pub use client::PqClient;
pub use connection::{ConnId, PollConnection, PollStatus, PqConnection};
pub use conninfo::ConnInfo;
pub use driver::{
    ConnStatus, Driver, ExecStatus, FlushStatus, NativeConnection, Notice, Notification,
    PingStatus, PollingStatus, PqResult,
};
pub use error::PqError;
pub use pool::{ConnectPoll, PoolHandler, PoolOptions};
pub use query::{PollQuery, Query, QueryCallback, QueryId};
