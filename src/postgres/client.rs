use std::time::Instant;

use crate::config::PostgresConfig;
use crate::postgres::conninfo::ConnInfo;
use crate::postgres::driver::Driver;
use crate::postgres::error::PqError;
use crate::postgres::pool::{ConnectPoll, PoolHandler, PoolOptions};
use crate::postgres::query::{PollQuery, Query, QueryId};
use crate::reactor::Reactor;

/// Application-facing database client: a pool configured from
/// [`PostgresConfig`] plus convenience entry points.
pub struct PqClient<D: Driver, R, H = ()> {
    pool: ConnectPoll<D, R, H>,
}

impl<D, R, H> PqClient<D, R, H>
where
    D: Driver,
    R: Reactor,
    H: PoolHandler,
{
    pub fn new(config: &PostgresConfig, driver: D, reactor: R, handler: H) -> Result<Self, PqError> {
        let conninfo = ConnInfo::parse(&config.conninfo)?;
        if config.size_max == 0 || config.size_min > config.size_max {
            return Err(PqError::ConnInfo(format!(
                "invalid pool size {}..{}",
                config.size_min, config.size_max
            )));
        }
        let options = PoolOptions {
            size_min: config.size_min,
            size_max: config.size_max,
            ping_retry_delay: config.ping_retry_delay(),
            ..PoolOptions::default()
        };
        tracing::debug!(conninfo = %conninfo, "Database client configured");
        Ok(Self {
            pool: ConnectPoll::new(driver, reactor, handler, conninfo, options),
        })
    }

    pub fn pool(&self) -> &ConnectPoll<D, R, H> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ConnectPoll<D, R, H> {
        &mut self.pool
    }

    pub fn start(&mut self, now: Instant) -> usize {
        self.pool.start(now)
    }

    pub fn stop(&mut self) {
        self.pool.stop();
    }

    /// Runs `sql`; `on_complete` receives the finished query.
    pub fn execute_sql(
        &mut self,
        sql: impl Into<String>,
        on_complete: impl FnOnce(&Query) + 'static,
        now: Instant,
    ) -> Result<QueryId, PqError> {
        self.pool.execute(PollQuery::new(Query::new(sql), on_complete), now)
    }

    /// Runs several statements as one batch, one result per statement.
    pub fn execute_batch<I, S>(
        &mut self,
        lines: I,
        on_complete: impl FnOnce(&Query) + 'static,
        now: Instant,
    ) -> Result<QueryId, PqError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pool.execute(PollQuery::new(Query::from_lines(lines), on_complete), now)
    }

    pub fn cancel_query(&mut self, id: QueryId) -> Result<bool, PqError> {
        self.pool.cancel_query(id)
    }
}
