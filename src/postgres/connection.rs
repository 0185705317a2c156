//! Pooled connection wrappers.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::postgres::driver::{ConnStatus, FlushStatus, NativeConnection, PqResult};
use crate::postgres::query::PollQuery;
use crate::reactor::{Interest, SocketId};

pub type ConnId = u64;

/// One native handle plus the bookkeeping the pool needs around it.
#[derive(Debug)]
pub struct PqConnection<C> {
    id: ConnId,
    native: Option<C>,
    socket: Option<SocketId>,
    /// Set while a handshake or reset is in progress
    anti_freeze: Option<Instant>,
    last_activity: Instant,
    connected: bool,
    listeners: BTreeSet<String>,
}

impl<C: NativeConnection> PqConnection<C> {
    pub fn new(id: ConnId, native: C, now: Instant) -> Self {
        Self {
            id,
            native: Some(native),
            socket: None,
            anti_freeze: None,
            last_activity: now,
            connected: false,
            listeners: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn native(&self) -> Option<&C> {
        self.native.as_ref()
    }

    pub fn native_mut(&mut self) -> Option<&mut C> {
        self.native.as_mut()
    }

    /// Driver status; `Bad` once the handle is gone.
    pub fn status(&self) -> ConnStatus {
        self.native.as_ref().map_or(ConnStatus::Bad, |n| n.status())
    }

    pub fn error_message(&self) -> String {
        self.native
            .as_ref()
            .map_or_else(|| "connection closed".to_string(), |n| n.error_message())
    }

    /// Socket last seen by the pool.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Reads the driver's socket. Returns the previous one when it changed.
    pub fn update_socket(&mut self) -> Option<Option<SocketId>> {
        let current = self.native.as_ref().and_then(|n| n.socket());
        if current == self.socket {
            return None;
        }
        Some(std::mem::replace(&mut self.socket, current))
    }

    pub fn anti_freeze(&self) -> Option<Instant> {
        self.anti_freeze
    }

    pub fn set_anti_freeze(&mut self, at: Option<Instant>) {
        self.anti_freeze = at;
    }

    /// True when a handshake started before `now - window` is still running.
    pub fn is_frozen(&self, now: Instant, window: Duration) -> bool {
        self.anti_freeze
            .is_some_and(|at| now.saturating_duration_since(at) > window)
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self) {
        self.connected = true;
    }

    /// Closes the native handle.
    ///
    /// Returns `true` on the first call for a connection that had completed
    /// its handshake, which is when the disconnect notification fires.
    pub fn disconnect(&mut self) -> bool {
        let Some(mut native) = self.native.take() else {
            return false;
        };
        native.finish();
        self.socket = None;
        self.anti_freeze = None;
        std::mem::replace(&mut self.connected, false)
    }

    pub fn listeners(&self) -> &BTreeSet<String> {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.listeners
    }
}

/// Where a pooled connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Connect,
    Reset,
    Ready,
    Wait,
    Error,
}

/// A pooled connection with at most one query bound to it.
#[derive(Debug)]
pub struct PollConnection<C> {
    conn: PqConnection<C>,
    status: PollStatus,
    interest: Interest,
    /// Interest currently registered with the reactor
    registered: Option<Interest>,
    work_query: Option<PollQuery>,
}

impl<C: NativeConnection> PollConnection<C> {
    pub fn new(id: ConnId, native: C, now: Instant) -> Self {
        let mut conn = PqConnection::new(id, native, now);
        conn.set_anti_freeze(Some(now));
        Self {
            conn,
            status: PollStatus::Connect,
            interest: Interest::Write,
            registered: None,
            work_query: None,
        }
    }

    pub fn id(&self) -> ConnId {
        self.conn.id()
    }

    pub fn conn(&self) -> &PqConnection<C> {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut PqConnection<C> {
        &mut self.conn
    }

    pub fn status(&self) -> PollStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PollStatus) {
        self.status = status;
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    pub(crate) fn registered(&self) -> Option<Interest> {
        self.registered
    }

    pub(crate) fn set_registered(&mut self, interest: Option<Interest>) {
        self.registered = interest;
    }

    pub fn work_query(&self) -> Option<&PollQuery> {
        self.work_query.as_ref()
    }

    pub fn work_query_mut(&mut self) -> Option<&mut PollQuery> {
        self.work_query.as_mut()
    }

    /// Sends the query and binds it to this connection.
    ///
    /// On failure the query is handed back with an error result attached
    /// and the connection is left in `Error`.
    pub fn query_start(&mut self, mut query: PollQuery, now: Instant) -> Result<(), PollQuery> {
        debug_assert!(self.work_query.is_none());

        let sql = query.query().sql_text();
        let sent = self
            .conn
            .native_mut()
            .is_some_and(|native| native.send_query(&sql));
        if !sent {
            let message = self.conn.error_message();
            query.query_mut().push_result(PqResult::error(message));
            self.status = PollStatus::Error;
            return Err(query);
        }

        query.query_mut().set_started(now);
        self.conn.touch(now);
        self.status = PollStatus::Wait;
        self.work_query = Some(query);
        self.flush();
        Ok(())
    }

    /// Releases the bound query and makes the connection available again.
    pub fn query_stop(&mut self) -> Option<PollQuery> {
        if self.status == PollStatus::Wait {
            self.status = PollStatus::Ready;
        }
        self.work_query.take()
    }

    /// Flushes queued output, choosing the interest from the outcome.
    pub fn flush(&mut self) -> FlushStatus {
        let status = self
            .conn
            .native_mut()
            .map_or(FlushStatus::Failed, |native| native.flush());
        self.interest = match status {
            FlushStatus::Pending => Interest::ReadWrite,
            _ => Interest::Read,
        };
        status
    }
}
