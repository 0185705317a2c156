//! Pool tests against a scripted driver and a reactor that records calls.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rampart::config::PostgresConfig;
use rampart::postgres::pool::{QUEUE_CAPACITY, quote_ident};
use rampart::postgres::{
    ConnId, ConnInfo, ConnStatus, ConnectPoll, Driver, ExecStatus, FlushStatus, NativeConnection,
    Notice, Notification, PingStatus, PollQuery, PollStatus, PollingStatus, PoolHandler,
    PoolOptions, PqClient, PqError, PqResult, Query, QueryId,
};
use rampart::reactor::{Interest, Reactor, ReactorEvent, SocketId};

struct NativeState {
    status: ConnStatus,
    socket: Option<SocketId>,
    socket_after_poll: Option<SocketId>,
    connect_polls: VecDeque<PollingStatus>,
    reset_polls: VecDeque<PollingStatus>,
    reset_ok: bool,
    send_ok: bool,
    consume_ok: bool,
    flush: FlushStatus,
    busy: bool,
    error: String,
    sent: Vec<String>,
    results: VecDeque<PqResult>,
    notifications: VecDeque<Notification>,
    notices: Vec<Notice>,
    cancels: usize,
    finished: bool,
}

impl NativeState {
    fn new(socket: SocketId) -> Self {
        Self {
            status: ConnStatus::Started,
            socket: Some(socket),
            socket_after_poll: None,
            connect_polls: VecDeque::new(),
            reset_polls: VecDeque::new(),
            reset_ok: true,
            send_ok: true,
            consume_ok: true,
            flush: FlushStatus::Done,
            busy: false,
            error: String::new(),
            sent: Vec::new(),
            results: VecDeque::new(),
            notifications: VecDeque::new(),
            notices: Vec::new(),
            cancels: 0,
            finished: false,
        }
    }

    fn step(&mut self, result: PollingStatus) -> PollingStatus {
        if let Some(socket) = self.socket_after_poll.take() {
            self.socket = Some(socket);
        }
        match result {
            PollingStatus::Ok => self.status = ConnStatus::Ok,
            PollingStatus::Failed => self.status = ConnStatus::Bad,
            PollingStatus::Reading | PollingStatus::Writing => {
                self.status = ConnStatus::AwaitingResponse
            }
        }
        result
    }
}

type Native = Rc<RefCell<NativeState>>;

struct MockConnection {
    state: Native,
}

impl NativeConnection for MockConnection {
    fn status(&self) -> ConnStatus {
        self.state.borrow().status
    }

    fn connect_poll(&mut self) -> PollingStatus {
        let mut state = self.state.borrow_mut();
        let next = state.connect_polls.pop_front().unwrap_or(PollingStatus::Ok);
        state.step(next)
    }

    fn reset_start(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.reset_ok {
            state.status = ConnStatus::Started;
        }
        state.reset_ok
    }

    fn reset_poll(&mut self) -> PollingStatus {
        let mut state = self.state.borrow_mut();
        let next = state.reset_polls.pop_front().unwrap_or(PollingStatus::Ok);
        state.step(next)
    }

    fn socket(&self) -> Option<SocketId> {
        self.state.borrow().socket
    }

    fn error_message(&self) -> String {
        self.state.borrow().error.clone()
    }

    fn send_query(&mut self, sql: &str) -> bool {
        let mut state = self.state.borrow_mut();
        state.sent.push(sql.to_string());
        state.send_ok
    }

    fn flush(&mut self) -> FlushStatus {
        self.state.borrow().flush
    }

    fn consume_input(&mut self) -> bool {
        self.state.borrow().consume_ok
    }

    fn is_busy(&self) -> bool {
        self.state.borrow().busy
    }

    fn get_result(&mut self) -> Option<PqResult> {
        self.state.borrow_mut().results.pop_front()
    }

    fn notifies(&mut self) -> Option<Notification> {
        self.state.borrow_mut().notifications.pop_front()
    }

    fn notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.state.borrow_mut().notices)
    }

    fn cancel(&mut self) -> Result<(), PqError> {
        self.state.borrow_mut().cancels += 1;
        Ok(())
    }

    fn finish(&mut self) {
        self.state.borrow_mut().finished = true;
    }
}

#[derive(Default)]
struct Script {
    pings: usize,
    ping_replies: VecDeque<PingStatus>,
    conn_strings: Vec<String>,
    natives: Vec<Native>,
    refuse: bool,
}

struct MockDriver {
    script: Rc<RefCell<Script>>,
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect_start(&mut self, conn_string: &str) -> Result<MockConnection, PqError> {
        let mut script = self.script.borrow_mut();
        if script.refuse {
            return Err(PqError::Connection("connection refused".to_string()));
        }
        script.conn_strings.push(conn_string.to_string());
        let socket = SocketId(script.natives.len() as i32 + 1);
        let state = Rc::new(RefCell::new(NativeState::new(socket)));
        script.natives.push(Rc::clone(&state));
        Ok(MockConnection { state })
    }

    fn ping(&mut self, _conn_string: &str) -> PingStatus {
        let mut script = self.script.borrow_mut();
        script.pings += 1;
        script.ping_replies.pop_front().unwrap_or(PingStatus::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Register(i32, Interest),
    Modify(i32, Interest),
    Unregister(i32),
}

#[derive(Default)]
struct Recorder {
    ops: Vec<Op>,
}

impl Reactor for Recorder {
    fn register(&mut self, socket: SocketId, interest: Interest) -> io::Result<()> {
        self.ops.push(Op::Register(socket.0, interest));
        Ok(())
    }

    fn modify(&mut self, socket: SocketId, interest: Interest) -> io::Result<()> {
        self.ops.push(Op::Modify(socket.0, interest));
        Ok(())
    }

    fn unregister(&mut self, socket: SocketId) -> io::Result<()> {
        self.ops.push(Op::Unregister(socket.0));
        Ok(())
    }
}

#[derive(Default)]
struct Events {
    connected: Vec<ConnId>,
    disconnected: Vec<ConnId>,
    connect_errors: Vec<String>,
    server_errors: Vec<ConnId>,
    query_errors: Vec<ConnId>,
    notices: Vec<String>,
    notifies: Vec<(ConnId, String, String)>,
}

impl PoolHandler for Events {
    fn on_connected(&mut self, conn: ConnId) {
        self.connected.push(conn);
    }

    fn on_disconnected(&mut self, conn: ConnId) {
        self.disconnected.push(conn);
    }

    fn on_connect_exception(&mut self, error: &PqError) {
        self.connect_errors.push(error.to_string());
    }

    fn on_server_exception(&mut self, conn: ConnId, _error: &PqError) {
        self.server_errors.push(conn);
    }

    fn on_notice(&mut self, _conn: ConnId, notice: &Notice) {
        self.notices.push(notice.message.clone());
    }

    fn on_notify(&mut self, conn: ConnId, notification: &Notification) {
        self.notifies.push((
            conn,
            notification.channel.clone(),
            notification.payload.clone(),
        ));
    }

    fn on_error(&mut self, conn: ConnId, _error: &PqError) {
        self.query_errors.push(conn);
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Done {
    id: QueryId,
    ok: bool,
    error: Option<String>,
    results: usize,
}

type Log = Rc<RefCell<Vec<Done>>>;

fn record(log: &Log) -> impl FnOnce(&Query) + 'static {
    let log = Rc::clone(log);
    move |query: &Query| {
        log.borrow_mut().push(Done {
            id: query.id(),
            ok: query.is_ok(),
            error: query.error_message().map(str::to_string),
            results: query.results().len(),
        })
    }
}

type Pool = ConnectPoll<MockDriver, Recorder, Events>;

fn new_pool(size_min: usize, size_max: usize) -> (Pool, Rc<RefCell<Script>>) {
    let script = Rc::new(RefCell::new(Script::default()));
    let options = PoolOptions {
        size_min,
        size_max,
        ping_retry_delay: Duration::ZERO,
        retention: Duration::from_secs(60),
        anti_freeze: Duration::from_secs(10),
    };
    let driver = MockDriver {
        script: Rc::clone(&script),
    };
    let pool = ConnectPoll::new(
        driver,
        Recorder::default(),
        Events::default(),
        ConnInfo::new(),
        options,
    );
    (pool, script)
}

fn native(script: &Rc<RefCell<Script>>, idx: usize) -> Native {
    Rc::clone(&script.borrow().natives[idx])
}

fn writable(pool: &mut Pool, socket: i32, now: Instant) {
    pool.handle_event(SocketId(socket), ReactorEvent::Writable, now);
}

fn readable(pool: &mut Pool, socket: i32, now: Instant) {
    pool.handle_event(SocketId(socket), ReactorEvent::Readable, now);
}

fn sql(text: &str, log: &Log) -> PollQuery {
    PollQuery::new(Query::new(text), record(log))
}

#[test]
fn test_start_opens_size_min_connections() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(2, 4);

    assert_eq!(pool.start(t0), 2);
    assert!(pool.is_active());
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.ready_count(), 0);
    assert_eq!(script.borrow().pings, 1);
    assert_eq!(
        script.borrow().conn_strings[0],
        "host=localhost port=5432 dbname=postgres user=postgres application_name=rampart"
    );
    assert_eq!(
        pool.reactor().ops,
        vec![
            Op::Register(1, Interest::Write),
            Op::Register(2, Interest::Write)
        ]
    );

    writable(&mut pool, 1, t0);

    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Ready);
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Modify(1, Interest::Read)));
    assert_eq!(pool.handler().connected, vec![1]);
    assert_eq!(pool.ready_count(), 1);
}

#[test]
fn test_execute_before_start_is_rejected() {
    let (mut pool, _script) = new_pool(1, 1);
    let log = Log::default();

    let err = pool.execute(sql("SELECT 1", &log), Instant::now()).unwrap_err();
    assert!(matches!(err, PqError::NoConnection));
    assert!(log.borrow().is_empty());
}

#[test]
fn test_query_runs_to_completion() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    let log = Log::default();
    let id = pool.execute(sql("SELECT 1", &log), t0).unwrap();
    assert_eq!(id, 1);
    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Wait);

    let conn = native(&script, 0);
    assert_eq!(conn.borrow().sent, vec!["SELECT 1".to_string()]);
    {
        let mut result = PqResult::new(ExecStatus::TuplesOk);
        result.columns = vec!["?column?".to_string()];
        result.rows = vec![vec![Some("1".to_string())]];
        conn.borrow_mut().results.push_back(result);
    }

    conn.borrow_mut().busy = true;
    readable(&mut pool, 1, t0);
    assert!(log.borrow().is_empty());

    conn.borrow_mut().busy = false;
    readable(&mut pool, 1, t0);

    assert_eq!(
        log.borrow().as_slice(),
        &[Done {
            id: 1,
            ok: true,
            error: None,
            results: 1
        }]
    );
    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Ready);
    assert!(pool.connection(1).unwrap().work_query().is_none());
}

#[test]
fn test_pool_grows_to_size_max_and_keeps_fifo_order() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 2);
    pool.start(t0);

    let log = Log::default();
    for text in ["q1", "q2", "q3"] {
        pool.execute(sql(text, &log), t0).unwrap();
    }

    assert_eq!(pool.len(), 2);
    assert_eq!(pool.queue_len(), 3);
    assert_eq!(script.borrow().pings, 1);

    writable(&mut pool, 1, t0);
    writable(&mut pool, 2, t0);
    assert_eq!(pool.queue_len(), 1);

    readable(&mut pool, 1, t0);

    assert_eq!(native(&script, 0).borrow().sent, vec!["q1", "q3"]);
    assert_eq!(native(&script, 1).borrow().sent, vec!["q2"]);
    assert_eq!(pool.queue_len(), 0);
    assert_eq!(log.borrow().iter().map(|d| d.id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_full_queue_rejects_without_callback() {
    let t0 = Instant::now();
    let (mut pool, _script) = new_pool(1, 1);
    pool.start(t0);

    let log = Log::default();
    for i in 0..QUEUE_CAPACITY {
        pool.execute(sql(&format!("SELECT {i}"), &log), t0).unwrap();
    }
    assert_eq!(pool.queue_len(), QUEUE_CAPACITY);

    let err = pool.execute(sql("SELECT 'late'", &log), t0).unwrap_err();
    assert!(matches!(err, PqError::QueueFull(n) if n == QUEUE_CAPACITY));
    assert!(log.borrow().is_empty());

    pool.stop();

    assert!(!pool.is_active());
    assert!(pool.is_empty());
    assert_eq!(log.borrow().len(), QUEUE_CAPACITY);
    assert!(log.borrow().iter().all(|d| {
        !d.ok && d.error.as_deref() == Some("connection pool stopped")
    }));
}

#[test]
fn test_pending_flush_waits_for_writable() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    let conn = native(&script, 0);
    conn.borrow_mut().flush = FlushStatus::Pending;

    let log = Log::default();
    pool.execute(sql("INSERT INTO big VALUES (1)", &log), t0).unwrap();
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Modify(1, Interest::ReadWrite)));

    conn.borrow_mut().flush = FlushStatus::Done;
    writable(&mut pool, 1, t0);
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Modify(1, Interest::Read)));

    readable(&mut pool, 1, t0);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_dispatch_failure_drops_connection_and_redispatches() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    {
        let conn = native(&script, 0);
        let mut state = conn.borrow_mut();
        state.send_ok = false;
        state.error = "server closed the connection unexpectedly".to_string();
    }

    let log = Log::default();
    pool.execute(sql("SELECT 1", &log), t0).unwrap();

    assert_eq!(log.borrow().len(), 1);
    assert!(!log.borrow()[0].ok);
    assert_eq!(
        log.borrow()[0].error.as_deref(),
        Some("server closed the connection unexpectedly")
    );
    assert_eq!(pool.handler().query_errors, vec![1]);

    // dropped at once, without waiting for an event on its socket
    assert!(pool.is_empty());
    assert_eq!(pool.handler().server_errors, vec![1]);
    assert_eq!(pool.handler().disconnected, vec![1]);
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Unregister(1)));

    // the next query gets a fresh connection instead of queueing forever
    pool.execute(sql("SELECT 2", &log), t0).unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.queue_len(), 1);
    writable(&mut pool, 2, t0);
    assert_eq!(pool.queue_len(), 0);
    assert_eq!(native(&script, 1).borrow().sent, vec!["SELECT 2"]);
    assert_eq!(script.borrow().pings, 2);
}

#[test]
fn test_socket_error_fails_running_query() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    let log = Log::default();
    pool.execute(sql("SELECT pg_sleep(10)", &log), t0).unwrap();
    native(&script, 0).borrow_mut().error = "terminating connection".to_string();

    pool.handle_event(SocketId(1), ReactorEvent::Error, t0);

    assert!(pool.is_empty());
    assert_eq!(pool.handler().server_errors, vec![1]);
    assert_eq!(pool.handler().disconnected, vec![1]);
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Unregister(1)));
    assert!(native(&script, 0).borrow().finished);

    assert_eq!(log.borrow().len(), 1);
    assert!(!log.borrow()[0].ok);
    assert!(
        log.borrow()[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("terminating connection"))
    );

    // the failure invalidated the ping, so the next connection pings again
    pool.new_connection(t0).unwrap();
    assert_eq!(script.borrow().pings, 2);
}

#[test]
fn test_handshake_failure_closes_connection() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    {
        let conn = native(&script, 0);
        let mut state = conn.borrow_mut();
        state.connect_polls.push_back(PollingStatus::Failed);
        state.error = "password authentication failed".to_string();
    }

    writable(&mut pool, 1, t0);

    assert!(pool.is_empty());
    assert_eq!(pool.handler().connect_errors.len(), 1);
    assert!(pool.handler().connect_errors[0].contains("password authentication failed"));
    assert!(pool.handler().disconnected.is_empty());
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Unregister(1)));
}

#[test]
fn test_ping_failure_prevents_connecting() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    script.borrow_mut().ping_replies = VecDeque::from([
        PingStatus::NoResponse,
        PingStatus::Reject,
        PingStatus::NoResponse,
    ]);

    assert_eq!(pool.start(t0), 0);
    assert_eq!(script.borrow().pings, 3);
    assert!(script.borrow().conn_strings.is_empty());
    assert_eq!(pool.handler().connect_errors.len(), 1);

    script.borrow_mut().ping_replies = VecDeque::from([PingStatus::NoResponse, PingStatus::Ok]);
    assert_eq!(pool.new_connection(t0).unwrap(), 1);
    assert_eq!(script.borrow().pings, 5);
}

#[test]
fn test_refused_connect_is_reported() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    script.borrow_mut().refuse = true;

    assert_eq!(pool.start(t0), 0);
    assert_eq!(pool.handler().connect_errors, vec!["connection failed: connection refused"]);
    assert!(!pool.conninfo().ping_valid());
}

#[test]
fn test_frozen_handshake_is_replaced() {
    let t0 = Instant::now();
    let (mut pool, _script) = new_pool(1, 2);
    pool.start(t0);

    pool.handle_timeout(t0 + Duration::from_secs(5));
    assert!(pool.connection(1).is_some());

    pool.handle_timeout(t0 + Duration::from_secs(11));

    assert!(pool.connection(1).is_none());
    assert!(pool.connection(2).is_some());
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.handler().connect_errors.len(), 1);
    assert!(pool.handler().disconnected.is_empty());
}

#[test]
fn test_socket_change_is_reregistered() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    {
        let conn = native(&script, 0);
        let mut state = conn.borrow_mut();
        state.socket_after_poll = Some(SocketId(99));
        state.connect_polls = VecDeque::from([PollingStatus::Reading, PollingStatus::Ok]);
    }

    writable(&mut pool, 1, t0);
    assert_eq!(
        pool.reactor().ops,
        vec![
            Op::Register(1, Interest::Write),
            Op::Unregister(1),
            Op::Register(99, Interest::Read)
        ]
    );

    // events for the old socket no longer reach the connection
    readable(&mut pool, 1, t0);
    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Connect);

    readable(&mut pool, 99, t0);
    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Ready);
    assert_eq!(pool.connection(1).unwrap().conn().socket(), Some(SocketId(99)));
    assert_eq!(pool.reactor().ops.len(), 3);
}

#[test]
fn test_idle_connections_are_pruned_except_listeners() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 3);
    pool.start(t0);
    pool.new_connection(t0).unwrap();
    pool.new_connection(t0).unwrap();

    // only the third connection is ready, so it takes the LISTEN
    writable(&mut pool, 3, t0);
    pool.listen("events", t0).unwrap();
    assert_eq!(native(&script, 2).borrow().sent, vec![r#"LISTEN "events""#]);
    readable(&mut pool, 3, t0);
    assert!(pool.connection(3).unwrap().conn().listeners().contains("events"));

    writable(&mut pool, 1, t0);
    writable(&mut pool, 2, t0);

    pool.handle_timeout(t0 + Duration::from_secs(30));
    assert_eq!(pool.len(), 3);

    pool.handle_timeout(t0 + Duration::from_secs(61));

    assert_eq!(pool.len(), 1);
    assert!(pool.connection(3).is_some());
    assert_eq!(pool.handler().disconnected, vec![2, 1]);
}

#[test]
fn test_notifications_and_notices_are_dispatched() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);
    pool.listen("jobs", t0).unwrap();
    readable(&mut pool, 1, t0);

    {
        let conn = native(&script, 0);
        let mut state = conn.borrow_mut();
        state.notices.push(Notice {
            severity: "NOTICE".to_string(),
            message: "relation already exists".to_string(),
        });
        state.notifications.push_back(Notification {
            channel: "jobs".to_string(),
            payload: "42".to_string(),
            pid: 7,
        });
        state.notifications.push_back(Notification {
            channel: "jobs".to_string(),
            payload: "43".to_string(),
            pid: 7,
        });
    }

    readable(&mut pool, 1, t0);

    assert_eq!(pool.handler().notices, vec!["relation already exists"]);
    assert_eq!(
        pool.handler().notifies,
        vec![
            (1, "jobs".to_string(), "42".to_string()),
            (1, "jobs".to_string(), "43".to_string())
        ]
    );
    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Ready);
}

#[test]
fn test_unlisten() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    assert_eq!(pool.unlisten("jobs", t0).unwrap(), None);

    pool.listen("jobs", t0).unwrap();
    assert!(matches!(pool.unlisten("jobs", t0), Err(PqError::NoConnection)));

    readable(&mut pool, 1, t0);
    assert!(pool.unlisten("jobs", t0).unwrap().is_some());
    assert_eq!(
        native(&script, 0).borrow().sent,
        vec![r#"LISTEN "jobs""#, r#"UNLISTEN "jobs""#]
    );
    assert!(pool.connection(1).unwrap().conn().listeners().is_empty());
}

#[test]
fn test_reset_connection_relistens_and_resumes_queue() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);
    pool.listen("jobs", t0).unwrap();
    readable(&mut pool, 1, t0);

    let log = Log::default();
    pool.execute(sql("q1", &log), t0).unwrap();
    native(&script, 0).borrow_mut().status = ConnStatus::Bad;

    pool.execute(sql("q2", &log), t0).unwrap();

    assert_eq!(pool.connection(1).unwrap().status(), PollStatus::Reset);
    assert_eq!(pool.reactor().ops.last(), Some(&Op::Modify(1, Interest::Write)));
    assert_eq!(pool.queue_len(), 1);
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].error.as_deref(), Some("connection lost"));

    writable(&mut pool, 1, t0);
    assert_eq!(pool.handler().connected, vec![1, 1]);

    readable(&mut pool, 1, t0);

    assert_eq!(
        native(&script, 0).borrow().sent,
        vec![r#"LISTEN "jobs""#, "q1", r#"LISTEN "jobs""#, "q2"]
    );
    assert_eq!(pool.queue_len(), 0);
}

#[test]
fn test_cancel_query() {
    let t0 = Instant::now();
    let (mut pool, script) = new_pool(1, 1);
    pool.start(t0);
    writable(&mut pool, 1, t0);

    let log = Log::default();
    let running = pool.execute(sql("SELECT pg_sleep(60)", &log), t0).unwrap();
    let queued = pool.execute(sql("SELECT 2", &log), t0).unwrap();
    assert_eq!(pool.queue_len(), 1);

    assert!(pool.cancel_query(queued).unwrap());
    assert_eq!(pool.queue_len(), 0);
    assert_eq!(
        log.borrow().as_slice(),
        &[Done {
            id: queued,
            ok: false,
            error: Some("canceling statement due to user request".to_string()),
            results: 1
        }]
    );

    assert!(pool.cancel_query(running).unwrap());
    assert_eq!(native(&script, 0).borrow().cancels, 1);
    assert_eq!(log.borrow().len(), 1);

    assert!(!pool.cancel_query(999).unwrap());
}

#[test]
fn test_client_from_config() {
    let t0 = Instant::now();
    let script = Rc::new(RefCell::new(Script::default()));
    let config = PostgresConfig {
        conninfo: "host=db dbname=app".to_string(),
        size_min: 1,
        size_max: 2,
        ping_retry_delay_ms: 0,
    };
    let driver = MockDriver {
        script: Rc::clone(&script),
    };
    let mut client = PqClient::new(&config, driver, Recorder::default(), Events::default()).unwrap();

    assert_eq!(client.start(t0), 1);
    assert_eq!(
        script.borrow().conn_strings[0],
        "port=5432 user=postgres host=db dbname=app application_name=rampart"
    );
    client
        .pool_mut()
        .handle_event(SocketId(1), ReactorEvent::Writable, t0);

    let log = Log::default();
    client
        .execute_batch(
            ["CREATE TABLE t (id int)", "INSERT INTO t VALUES (1)"],
            record(&log),
            t0,
        )
        .unwrap();
    {
        let conn = native(&script, 0);
        assert_eq!(
            conn.borrow().sent,
            vec!["CREATE TABLE t (id int)\nINSERT INTO t VALUES (1)"]
        );
        let mut state = conn.borrow_mut();
        state.results.push_back(PqResult::new(ExecStatus::CommandOk));
        state.results.push_back(PqResult::new(ExecStatus::CommandOk));
    }
    client
        .pool_mut()
        .handle_event(SocketId(1), ReactorEvent::Readable, t0);

    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].results, 2);
    assert!(log.borrow()[0].ok);

    client.stop();
    assert!(client.pool().is_empty());
    assert_eq!(client.pool().handler().disconnected, vec![1]);
}

#[test]
fn test_client_rejects_bad_config() {
    let make = |conninfo: &str, size_min, size_max| {
        let config = PostgresConfig {
            conninfo: conninfo.to_string(),
            size_min,
            size_max,
            ping_retry_delay_ms: 0,
        };
        let driver = MockDriver {
            script: Rc::new(RefCell::new(Script::default())),
        };
        PqClient::new(&config, driver, Recorder::default(), ()).map(|_| ())
    };

    assert!(make("host=db", 1, 2).is_ok());
    assert!(matches!(make("host=db", 1, 0), Err(PqError::ConnInfo(_))));
    assert!(matches!(make("host=db", 3, 2), Err(PqError::ConnInfo(_))));
    assert!(matches!(make("host", 1, 2), Err(PqError::ConnInfo(_))));
}

#[test]
fn test_quote_ident() {
    assert_eq!(quote_ident("jobs"), r#""jobs""#);
    assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
}
