//! Connection pool driven by reactor events.
//!
//! The pool never blocks on the network. Handshakes, queries and
//! notifications advance when the external dispatcher calls
//! [`ConnectPoll::handle_event`] for a pooled socket, and housekeeping runs
//! from [`ConnectPoll::handle_timeout`]. The only blocking call is the
//! bounded ping retry before a new connection is opened.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::postgres::connection::{ConnId, PollConnection, PollStatus};
use crate::postgres::conninfo::ConnInfo;
use crate::postgres::driver::{
    ConnStatus, Driver, FlushStatus, NativeConnection, Notice, Notification, PingStatus,
    PollingStatus,
};
use crate::postgres::error::PqError;
use crate::postgres::query::{ListenAction, PollQuery, Query, QueryId};
use crate::reactor::{Interest, Reactor, ReactorEvent, SocketId};

/// Most queries that may wait for a connection.
pub const QUEUE_CAPACITY: usize = 4095;

/// Ping attempts before a new connection is given up.
pub const PING_ATTEMPTS: usize = 3;

/// Pool-level notifications. Every method defaults to doing nothing.
pub trait PoolHandler {
    /// A connection finished its handshake (or reset).
    fn on_connected(&mut self, _conn: ConnId) {}

    /// A connected connection was closed.
    fn on_disconnected(&mut self, _conn: ConnId) {}

    /// A connection could not be established.
    fn on_connect_exception(&mut self, _error: &PqError) {}

    /// An established connection failed and was removed.
    fn on_server_exception(&mut self, _conn: ConnId, _error: &PqError) {}

    fn on_notice(&mut self, _conn: ConnId, _notice: &Notice) {}

    fn on_notify(&mut self, _conn: ConnId, _notification: &Notification) {}

    /// A query could not be dispatched on `conn`.
    fn on_error(&mut self, _conn: ConnId, _error: &PqError) {}
}

impl PoolHandler for () {}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub size_min: usize,
    pub size_max: usize,
    /// Pause between ping attempts
    pub ping_retry_delay: Duration,
    /// How long an idle connection above `size_min` is kept
    pub retention: Duration,
    /// How long a handshake may run before it is abandoned
    pub anti_freeze: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size_min: 1,
            size_max: 10,
            ping_retry_delay: Duration::from_secs(1),
            retention: Duration::from_secs(30 * 60),
            anti_freeze: Duration::from_secs(10),
        }
    }
}

pub struct ConnectPoll<D: Driver, R, H = ()> {
    driver: D,
    reactor: R,
    handler: H,
    conninfo: ConnInfo,
    options: PoolOptions,
    connections: Vec<PollConnection<D::Connection>>,
    queue: VecDeque<PollQuery>,
    next_conn_id: ConnId,
    next_query_id: QueryId,
    active: bool,
}

impl<D, R, H> ConnectPoll<D, R, H>
where
    D: Driver,
    R: Reactor,
    H: PoolHandler,
{
    pub fn new(driver: D, reactor: R, handler: H, conninfo: ConnInfo, options: PoolOptions) -> Self {
        Self {
            driver,
            reactor,
            handler,
            conninfo,
            options,
            connections: Vec::new(),
            queue: VecDeque::new(),
            next_conn_id: 1,
            next_query_id: 1,
            active: false,
        }
    }

    /// Number of pooled connections, in any state.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn conninfo(&self) -> &ConnInfo {
        &self.conninfo
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn connection(&self, id: ConnId) -> Option<&PollConnection<D::Connection>> {
        self.connections.iter().find(|c| c.id() == id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &PollConnection<D::Connection>> {
        self.connections.iter()
    }

    pub fn ready_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.status() == PollStatus::Ready)
            .count()
    }

    /// Activates the pool and opens `size_min` connections. Returns how many
    /// handshakes were started.
    pub fn start(&mut self, now: Instant) -> usize {
        self.active = true;
        let mut opened = 0;
        while self.connections.len() < self.options.size_min {
            if self.new_connection(now).is_err() {
                break;
            }
            opened += 1;
        }
        tracing::info!(
            opened,
            size_min = self.options.size_min,
            size_max = self.options.size_max,
            "Connection pool started"
        );
        opened
    }

    /// Closes every connection and fails every pending query.
    pub fn stop(&mut self) {
        self.active = false;
        while !self.connections.is_empty() {
            self.close_at(self.connections.len() - 1, "connection pool stopped");
        }
        let pending = self.queue.len();
        while let Some(query) = self.queue.pop_front() {
            query.fail("connection pool stopped");
        }
        tracing::info!(pending, "Connection pool stopped");
    }

    /// Index of a ready connection.
    ///
    /// When none is ready, frozen handshakes are closed, broken connections
    /// are reset and, below `size_max`, a new connection is started.
    pub fn get_ready_connection(&mut self, now: Instant) -> Option<usize> {
        if let Some(idx) = self.find_ready() {
            return Some(idx);
        }

        self.recover(now);

        if self.active && self.connections.len() < self.options.size_max {
            let _ = self.new_connection(now);
        }
        self.find_ready()
    }

    fn find_ready(&self) -> Option<usize> {
        self.connections
            .iter()
            .position(|c| c.status() == PollStatus::Ready)
    }

    fn recover(&mut self, now: Instant) {
        for idx in (0..self.connections.len()).rev() {
            let pc = &self.connections[idx];
            let handshaking = matches!(pc.status(), PollStatus::Connect | PollStatus::Reset);
            let native = pc.conn().status();

            if pc.status() == PollStatus::Error {
                self.close_at(idx, "connection in error state");
            } else if handshaking && native.in_progress() && pc.conn().is_frozen(now, self.options.anti_freeze) {
                let error = PqError::Connection(format!(
                    "handshake did not finish within {:?}",
                    self.options.anti_freeze
                ));
                tracing::warn!(conn = pc.id(), "{}", error);
                self.handler.on_connect_exception(&error);
                self.close_at(idx, "handshake timed out");
            } else if !handshaking && native == ConnStatus::Bad {
                self.restart_at(idx, now);
            }
        }
    }

    /// Resets a broken connection in place, or drops it when the reset
    /// cannot start.
    fn restart_at(&mut self, idx: usize, now: Instant) {
        let pc = &mut self.connections[idx];
        let id = pc.id();
        if let Some(query) = pc.query_stop() {
            query.fail("connection lost");
        }

        let started = pc.conn_mut().native_mut().is_some_and(|n| n.reset_start());
        if !started {
            self.close_at(idx, "reset failed");
            return;
        }
        pc.set_status(PollStatus::Reset);
        pc.set_interest(Interest::Write);
        pc.conn_mut().set_anti_freeze(Some(now));
        tracing::info!(conn = id, "Resetting connection");
        self.refresh(idx);
    }

    /// Starts a new connection handshake.
    ///
    /// The server is pinged first unless a previous ping is still valid.
    pub fn new_connection(&mut self, now: Instant) -> Result<ConnId, PqError> {
        if self.connections.len() >= self.options.size_max {
            return Err(PqError::NoConnection);
        }
        if !self.conninfo.ping_valid() {
            self.ping()?;
        }

        let native = match self.driver.connect_start(self.conninfo.conn_string()) {
            Ok(native) => native,
            Err(e) => {
                self.conninfo.set_ping_valid(false);
                self.handler.on_connect_exception(&e);
                return Err(e);
            }
        };
        if native.status() == ConnStatus::Bad {
            let error = PqError::Connection(native.error_message());
            let mut native = native;
            native.finish();
            self.conninfo.set_ping_valid(false);
            self.handler.on_connect_exception(&error);
            return Err(error);
        }

        let id = self.next_conn_id;
        self.next_conn_id += 1;
        self.connections.push(PollConnection::new(id, native, now));
        self.refresh(self.connections.len() - 1);

        tracing::debug!(conn = id, pool = self.connections.len(), "Connection started");
        Ok(id)
    }

    fn ping(&mut self) -> Result<(), PqError> {
        let conn_string = self.conninfo.conn_string().to_string();
        for attempt in 1..=PING_ATTEMPTS {
            match self.driver.ping(&conn_string) {
                PingStatus::Ok => {
                    self.conninfo.set_ping_valid(true);
                    return Ok(());
                }
                status => {
                    tracing::warn!(attempt, ?status, "Server ping failed");
                    if attempt < PING_ATTEMPTS && !self.options.ping_retry_delay.is_zero() {
                        std::thread::sleep(self.options.ping_retry_delay);
                    }
                }
            }
        }
        let error = PqError::Ping(self.conninfo.to_string());
        self.handler.on_connect_exception(&error);
        Err(error)
    }

    /// Starts `query` on a ready connection, or queues it.
    ///
    /// Queued queries keep their order. A full queue rejects the query
    /// without calling its callback.
    pub fn execute(&mut self, mut query: PollQuery, now: Instant) -> Result<QueryId, PqError> {
        if !self.active {
            return Err(PqError::NoConnection);
        }

        let id = self.next_query_id;
        self.next_query_id += 1;
        query.query_mut().set_id(id);

        if self.queue.is_empty() {
            if let Some(idx) = self.get_ready_connection(now) {
                self.start_query(idx, query, now);
                return Ok(id);
            }
        }

        if self.queue.len() >= QUEUE_CAPACITY {
            tracing::warn!(query = id, capacity = QUEUE_CAPACITY, "Query queue is full");
            return Err(PqError::QueueFull(self.queue.len()));
        }
        self.queue.push_back(query);
        tracing::debug!(query = id, queued = self.queue.len(), "Query queued");
        Ok(id)
    }

    /// Dispatches queued queries to ready connections, oldest first.
    pub fn check_queue(&mut self, now: Instant) {
        while !self.queue.is_empty() {
            let Some(idx) = self.get_ready_connection(now) else {
                break;
            };
            let Some(query) = self.queue.pop_front() else {
                break;
            };
            self.start_query(idx, query, now);
        }
    }

    fn start_query(&mut self, idx: usize, query: PollQuery, now: Instant) {
        let action = query.action().cloned();
        let query_id = query.id();
        let pc = &mut self.connections[idx];
        let id = pc.id();

        match pc.query_start(query, now) {
            Ok(()) => {
                match action {
                    Some(ListenAction::Listen(channel)) => {
                        pc.conn_mut().listeners_mut().insert(channel);
                    }
                    Some(ListenAction::Unlisten(channel)) => {
                        pc.conn_mut().listeners_mut().remove(&channel);
                    }
                    None => {}
                }
                tracing::debug!(conn = id, query = query_id, "Query started");
                self.refresh(idx);
            }
            Err(query) => {
                let message = query.query().error_message().unwrap_or_default().to_string();
                let error = PqError::Query(message.clone());
                tracing::warn!(conn = id, query = query_id, error = %error, "Query dispatch failed");
                self.handler.on_error(id, &error);
                query.complete();
                // A connection that cannot take a query is not coming back.
                self.fail_connection(idx, PqError::Connection(message));
            }
        }
    }

    /// Advances the connection owning `socket`.
    pub fn handle_event(&mut self, socket: SocketId, event: ReactorEvent, now: Instant) {
        let Some(idx) = self
            .connections
            .iter()
            .position(|c| c.conn().socket() == Some(socket))
        else {
            tracing::debug!(%socket, ?event, "Event for unknown socket");
            return;
        };
        self.connections[idx].conn_mut().touch(now);

        match event {
            ReactorEvent::Error => {
                let error = PqError::Connection(self.connections[idx].conn().error_message());
                self.fail_connection(idx, error);
                return;
            }
            ReactorEvent::Timeout => {
                let pc = &self.connections[idx];
                if matches!(pc.status(), PollStatus::Connect | PollStatus::Reset)
                    && pc.conn().is_frozen(now, self.options.anti_freeze)
                {
                    let error = PqError::Connection("handshake timed out".to_string());
                    self.handler.on_connect_exception(&error);
                    self.close_at(idx, "handshake timed out");
                }
                return;
            }
            ReactorEvent::Readable | ReactorEvent::Writable => {}
        }

        match self.connections[idx].status() {
            PollStatus::Connect | PollStatus::Reset => self.poll_handshake(idx, now),
            PollStatus::Wait => {
                if event == ReactorEvent::Writable {
                    self.do_write(idx);
                } else {
                    self.do_read(idx, now);
                }
            }
            PollStatus::Ready => {
                if event == ReactorEvent::Readable {
                    self.read_idle(idx);
                } else {
                    self.connections[idx].set_interest(Interest::Read);
                    self.refresh(idx);
                }
                self.check_queue(now);
            }
            PollStatus::Error => self.close_at(idx, "connection in error state"),
        }
    }

    fn poll_handshake(&mut self, idx: usize, now: Instant) {
        let pc = &mut self.connections[idx];
        let id = pc.id();
        let reset = pc.status() == PollStatus::Reset;
        let result = match pc.conn_mut().native_mut() {
            Some(native) if reset => native.reset_poll(),
            Some(native) => native.connect_poll(),
            None => PollingStatus::Failed,
        };

        match result {
            PollingStatus::Reading => {
                pc.set_interest(Interest::Read);
                self.refresh(idx);
            }
            PollingStatus::Writing => {
                pc.set_interest(Interest::Write);
                self.refresh(idx);
            }
            PollingStatus::Failed => {
                let error = PqError::Connection(pc.conn().error_message());
                tracing::warn!(conn = id, error = %error, "Connection handshake failed");
                self.conninfo.set_ping_valid(false);
                self.handler.on_connect_exception(&error);
                self.close_at(idx, "handshake failed");
            }
            PollingStatus::Ok => {
                pc.set_status(PollStatus::Ready);
                pc.set_interest(Interest::Read);
                pc.conn_mut().set_anti_freeze(None);
                pc.conn_mut().set_connected();
                let relisten = reset && !pc.conn().listeners().is_empty();
                self.refresh(idx);

                tracing::info!(conn = id, reset, pool = self.connections.len(), "Connection ready");
                self.handler.on_connected(id);

                if relisten {
                    self.relisten(idx, now);
                }
                self.check_queue(now);
            }
        }
    }

    /// Reissues `LISTEN` for the channels of a connection that was reset.
    fn relisten(&mut self, idx: usize, now: Instant) {
        let sql = self.connections[idx]
            .conn()
            .listeners()
            .iter()
            .map(|channel| format!("LISTEN {}", quote_ident(channel)))
            .collect::<Vec<_>>()
            .join("; ");
        let mut query = PollQuery::detached(Query::new(sql));
        query.query_mut().set_id(self.next_query_id);
        self.next_query_id += 1;
        self.start_query(idx, query, now);
    }

    fn do_write(&mut self, idx: usize) {
        match self.connections[idx].flush() {
            FlushStatus::Failed => {
                let error = PqError::Connection(self.connections[idx].conn().error_message());
                self.fail_connection(idx, error);
            }
            FlushStatus::Done | FlushStatus::Pending => self.refresh(idx),
        }
    }

    /// Drains input for the bound query; completes it once the driver has
    /// no more results.
    fn do_read(&mut self, idx: usize, now: Instant) {
        if !self.consume(idx) {
            return;
        }

        match self.connections[idx].flush() {
            FlushStatus::Done => {}
            FlushStatus::Pending => {
                self.refresh(idx);
                return;
            }
            FlushStatus::Failed => {
                let error = PqError::Connection(self.connections[idx].conn().error_message());
                self.fail_connection(idx, error);
                return;
            }
        }

        let pc = &mut self.connections[idx];
        let id = pc.id();
        let mut finished = false;
        let mut results = Vec::new();
        if let Some(native) = pc.conn_mut().native_mut() {
            while !native.is_busy() {
                match native.get_result() {
                    Some(result) => results.push(result),
                    None => {
                        finished = true;
                        break;
                    }
                }
            }
        }
        if let Some(query) = pc.work_query_mut() {
            for result in results {
                query.query_mut().push_result(result);
            }
        }

        if !finished {
            self.refresh(idx);
            return;
        }

        pc.conn_mut().touch(now);
        let query = pc.query_stop();
        self.refresh(idx);
        if let Some(query) = query {
            let elapsed = query.query().started().map(|t| now.saturating_duration_since(t));
            tracing::debug!(conn = id, query = query.id(), ?elapsed, ok = query.query().is_ok(), "Query finished");
            query.complete();
        }
        self.check_queue(now);
    }

    /// Input on a connection with no query: notices and notifications.
    fn read_idle(&mut self, idx: usize) {
        if self.consume(idx) {
            self.refresh(idx);
        }
    }

    /// Reads pending input and dispatches notices and notifications.
    /// Returns `false` when the connection failed and was removed.
    fn consume(&mut self, idx: usize) -> bool {
        let pc = &mut self.connections[idx];
        let id = pc.id();
        let Some(native) = pc.conn_mut().native_mut() else {
            self.fail_connection(idx, PqError::Connection("connection closed".to_string()));
            return false;
        };

        if !native.consume_input() {
            let error = PqError::Connection(native.error_message());
            self.fail_connection(idx, error);
            return false;
        }

        for notice in native.notices() {
            self.handler.on_notice(id, &notice);
        }

        loop {
            let mut received = false;
            while let Some(notification) = native.notifies() {
                received = true;
                tracing::debug!(conn = id, channel = %notification.channel, "Notification");
                self.handler.on_notify(id, &notification);
            }
            if !received || !native.consume_input() {
                break;
            }
        }
        true
    }

    fn fail_connection(&mut self, idx: usize, error: PqError) {
        let id = self.connections[idx].id();
        tracing::error!(conn = id, error = %error, "Connection failed");
        self.connections[idx].set_status(PollStatus::Error);
        self.conninfo.set_ping_valid(false);
        self.handler.on_server_exception(id, &error);
        self.close_at(idx, &error.to_string());
    }

    /// Removes the connection at `idx`, failing its bound query.
    fn close_at(&mut self, idx: usize, reason: &str) {
        let mut pc = self.connections.remove(idx);
        let id = pc.id();

        if let Some(socket) = pc.conn().socket() {
            if let Err(e) = self.reactor.unregister(socket) {
                tracing::warn!(conn = id, %socket, error = %e, "Failed to unregister socket");
            }
        }
        if let Some(query) = pc.query_stop() {
            query.fail(reason);
        }
        if pc.conn_mut().disconnect() {
            self.handler.on_disconnected(id);
        }
        tracing::debug!(conn = id, reason, pool = self.connections.len(), "Connection closed");
    }

    /// Brings the reactor registration in line with the connection's socket
    /// and interest.
    fn refresh(&mut self, idx: usize) {
        let pc = &mut self.connections[idx];
        let id = pc.id();

        if let Some(previous) = pc.conn_mut().update_socket() {
            if let Some(old) = previous {
                if let Err(e) = self.reactor.unregister(old) {
                    tracing::warn!(conn = id, socket = %old, error = %e, "Failed to unregister socket");
                }
            }
            pc.set_registered(None);
            if let Some(new) = pc.conn().socket() {
                match self.reactor.register(new, pc.interest()) {
                    Ok(()) => pc.set_registered(Some(pc.interest())),
                    Err(e) => tracing::warn!(conn = id, socket = %new, error = %e, "Failed to register socket"),
                }
                tracing::debug!(conn = id, ?previous, socket = %new, "Connection socket changed");
            }
            return;
        }

        let Some(socket) = pc.conn().socket() else {
            return;
        };
        if pc.registered() != Some(pc.interest()) {
            match self.reactor.modify(socket, pc.interest()) {
                Ok(()) => pc.set_registered(Some(pc.interest())),
                Err(e) => tracing::warn!(conn = id, %socket, error = %e, "Failed to update socket interest"),
            }
        }
    }

    /// Periodic housekeeping: abandons frozen handshakes, prunes idle
    /// connections, tops the pool up to `size_min` and drains the queue.
    pub fn handle_timeout(&mut self, now: Instant) {
        for idx in (0..self.connections.len()).rev() {
            let pc = &self.connections[idx];
            if matches!(pc.status(), PollStatus::Connect | PollStatus::Reset)
                && pc.conn().is_frozen(now, self.options.anti_freeze)
            {
                let error = PqError::Connection("handshake timed out".to_string());
                self.handler.on_connect_exception(&error);
                self.close_at(idx, "handshake timed out");
            }
        }

        self.pack_connections(now);

        if self.active {
            while self.connections.len() < self.options.size_min {
                if self.new_connection(now).is_err() {
                    break;
                }
            }
        }
        self.check_queue(now);
    }

    /// Closes connections above `size_min` that have been idle longer than
    /// the retention window, have no listeners and run no query. Returns how
    /// many were closed.
    pub fn pack_connections(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        let mut idx = self.connections.len();
        while idx > 0 {
            idx -= 1;
            if self.connections.len() <= self.options.size_min {
                break;
            }
            let pc = &self.connections[idx];
            if pc.status() != PollStatus::Wait
                && pc.conn().listeners().is_empty()
                && pc.conn().idle_for(now) > self.options.retention
            {
                self.close_at(idx, "idle");
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, pool = self.connections.len(), "Idle connections pruned");
        }
        removed
    }

    /// Subscribes to `channel` on one of the pooled connections.
    pub fn listen(&mut self, channel: &str, now: Instant) -> Result<QueryId, PqError> {
        let query = PollQuery::detached(Query::new(format!("LISTEN {}", quote_ident(channel))))
            .with_action(ListenAction::Listen(channel.to_string()));
        self.execute(query, now)
    }

    /// Drops the subscription to `channel`. Returns `None` when no
    /// connection listens on it.
    pub fn unlisten(&mut self, channel: &str, now: Instant) -> Result<Option<QueryId>, PqError> {
        let Some(idx) = self
            .connections
            .iter()
            .position(|c| c.conn().listeners().contains(channel))
        else {
            return Ok(None);
        };
        if self.connections[idx].status() != PollStatus::Ready {
            return Err(PqError::NoConnection);
        }

        let mut query = PollQuery::detached(Query::new(format!("UNLISTEN {}", quote_ident(channel))))
            .with_action(ListenAction::Unlisten(channel.to_string()));
        let id = self.next_query_id;
        self.next_query_id += 1;
        query.query_mut().set_id(id);
        self.start_query(idx, query, now);
        Ok(Some(id))
    }

    /// Cancels a query: a queued one is failed at once, a running one gets
    /// an out-of-band cancel and completes through the normal path.
    /// Returns `false` when the query is unknown.
    pub fn cancel_query(&mut self, id: QueryId) -> Result<bool, PqError> {
        if let Some(pos) = self.queue.iter().position(|q| q.id() == id) {
            if let Some(query) = self.queue.remove(pos) {
                query.fail("canceling statement due to user request");
            }
            return Ok(true);
        }

        let Some(pc) = self
            .connections
            .iter_mut()
            .find(|c| c.work_query().is_some_and(|q| q.id() == id))
        else {
            return Ok(false);
        };
        let conn = pc.id();
        match pc.conn_mut().native_mut() {
            Some(native) => native.cancel()?,
            None => return Err(PqError::NoConnection),
        }
        tracing::info!(conn, query = id, "Cancel requested");
        Ok(true)
    }
}

/// Double-quotes an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
