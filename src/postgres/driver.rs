//! Native driver interface.
//!
//! The engine drives an asynchronous libpq-style client through these
//! traits; the wire protocol itself lives in the implementation.

use crate::postgres::error::PqError;
use crate::reactor::SocketId;

/// Connection status as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Ok,
    Bad,
    Started,
    Made,
    AwaitingResponse,
    AuthOk,
    Setenv,
    SslStartup,
}

impl ConnStatus {
    /// True while the handshake has not reached `Ok` or `Bad`.
    pub fn in_progress(&self) -> bool {
        !matches!(self, ConnStatus::Ok | ConnStatus::Bad)
    }
}

/// Result of one non-blocking connect or reset step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    Failed,
    Reading,
    Writing,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    CopyOut,
    CopyIn,
    BadResponse,
    NonfatalError,
    FatalError,
}

impl ExecStatus {
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ExecStatus::EmptyQuery | ExecStatus::CommandOk | ExecStatus::TuplesOk
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Ok,
    Reject,
    NoResponse,
    NoAttempt,
}

/// Outcome of flushing queued output to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Done,
    Pending,
    Failed,
}

/// One statement's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PqResult {
    pub status: ExecStatus,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub command_tag: String,
    pub error_message: String,
}

impl PqResult {
    pub fn new(status: ExecStatus) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            command_tag: String::new(),
            error_message: String::new(),
        }
    }

    /// A failed result carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        let mut result = Self::new(ExecStatus::FatalError);
        result.error_message = message.into();
        result
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Asynchronous `NOTIFY` delivered on a listening connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
    pub pid: i32,
}

/// Server notice (`NOTICE`, `WARNING`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: String,
    pub message: String,
}

/// Opens connections and pings servers.
pub trait Driver {
    type Connection: NativeConnection;

    /// Begins a non-blocking connect; the handshake is then driven with
    /// [`NativeConnection::connect_poll`].
    fn connect_start(&mut self, conn_string: &str) -> Result<Self::Connection, PqError>;

    /// Blocking reachability check.
    fn ping(&mut self, conn_string: &str) -> PingStatus;
}

/// One native connection handle.
pub trait NativeConnection {
    fn status(&self) -> ConnStatus;

    fn connect_poll(&mut self) -> PollingStatus;

    /// Begins a non-blocking reset; returns `false` when it cannot start.
    fn reset_start(&mut self) -> bool;

    fn reset_poll(&mut self) -> PollingStatus;

    /// Current socket. It may change while the handshake runs.
    fn socket(&self) -> Option<SocketId>;

    fn error_message(&self) -> String;

    /// Dispatches `sql` without waiting for the result.
    fn send_query(&mut self, sql: &str) -> bool;

    fn flush(&mut self) -> FlushStatus;

    fn consume_input(&mut self) -> bool;

    /// True when [`get_result`](Self::get_result) would block.
    fn is_busy(&self) -> bool;

    /// Next result of the running query; `None` once it is finished.
    fn get_result(&mut self) -> Option<PqResult>;

    /// Next pending notification.
    fn notifies(&mut self) -> Option<Notification>;

    /// Drains notices received since the last call.
    fn notices(&mut self) -> Vec<Notice>;

    /// Out-of-band cancel of the running query.
    fn cancel(&mut self) -> Result<(), PqError>;

    fn finish(&mut self);
}
