use std::fmt;
use std::time::Instant;

use crate::postgres::driver::PqResult;

pub type QueryId = u64;

/// Called once with the finished query.
pub type QueryCallback = Box<dyn FnOnce(&Query)>;

/// SQL text and the results it produced, one per statement.
#[derive(Debug, Clone, Default)]
pub struct Query {
    id: QueryId,
    sql: Vec<String>,
    started: Option<Instant>,
    results: Vec<PqResult>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: vec![sql.into()],
            ..Self::default()
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sql: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: QueryId) {
        self.id = id;
    }

    pub fn sql(&self) -> &[String] {
        &self.sql
    }

    pub fn add_sql(&mut self, line: impl Into<String>) {
        self.sql.push(line.into());
    }

    /// Lines joined into the text sent to the server.
    pub fn sql_text(&self) -> String {
        self.sql.join("\n")
    }

    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    pub(crate) fn set_started(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn results(&self) -> &[PqResult] {
        &self.results
    }

    pub fn push_result(&mut self, result: PqResult) {
        self.results.push(result);
    }

    /// True when every result succeeded.
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(PqResult::is_ok)
    }

    /// First error reported by any result.
    pub fn error_message(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| !r.is_ok())
            .map(|r| r.error_message.as_str())
    }
}

/// A query handed to the pool, waiting in its queue or bound to a
/// connection.
pub struct PollQuery {
    query: Query,
    on_complete: Option<QueryCallback>,
    action: Option<ListenAction>,
}

/// Channel bookkeeping applied when a `LISTEN`/`UNLISTEN` query starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListenAction {
    Listen(String),
    Unlisten(String),
}

impl PollQuery {
    pub fn new(query: Query, on_complete: impl FnOnce(&Query) + 'static) -> Self {
        Self {
            query,
            on_complete: Some(Box::new(on_complete)),
            action: None,
        }
    }

    /// A query whose outcome nobody waits for.
    pub fn detached(query: Query) -> Self {
        Self {
            query,
            on_complete: None,
            action: None,
        }
    }

    pub(crate) fn with_action(mut self, action: ListenAction) -> Self {
        self.action = Some(action);
        self
    }

    pub(crate) fn action(&self) -> Option<&ListenAction> {
        self.action.as_ref()
    }

    pub fn id(&self) -> QueryId {
        self.query.id()
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    /// Fires the completion callback.
    pub fn complete(mut self) {
        if let Some(callback) = self.on_complete.take() {
            callback(&self.query);
        }
    }

    /// Completes with a single failed result.
    pub fn fail(mut self, message: impl Into<String>) {
        self.query.push_result(PqResult::error(message));
        self.complete();
    }
}

impl fmt::Debug for PollQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollQuery")
            .field("query", &self.query)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
