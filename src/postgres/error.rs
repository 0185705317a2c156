use thiserror::Error;

/// Errors raised by the poll engine.
///
/// Query failures reported by the server are not errors: they arrive as
/// results with a failing [`ExecStatus`](super::ExecStatus).
#[derive(Debug, Error)]
pub enum PqError {
    #[error("query queue is full ({0} queries waiting)")]
    QueueFull(usize),

    #[error("no connection available")]
    NoConnection,

    #[error("server did not answer ping: {0}")]
    Ping(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid connection info: {0}")]
    ConnInfo(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
