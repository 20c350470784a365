//! A connection and the state machine serializing its operations.
//!
//! A [`MySqlConnection`] moves between these phases:
//!
//! ```text
//! Fresh --(operation)--> Connecting --> Querying <--> Idle
//!   ^                                                  |
//!   +-------------------------(end)--------------------+
//! ```
//!
//! The socket is opened (or taken from the pool) by the first operation. Only one operation
//! runs at a time; starting another fails with [`Error::Busy`]. An operation that returns a
//! [`MySqlResultSet`] lasts until that result set has been read, discarded or dropped.
//!
//! [`MySqlConnection::end`] gives the socket back and bumps the connection's `state_id`.
//! An operation still in flight notices the change at its next suspension point, fails
//! with [`Error::Canceled`] and releases the socket it was using.

use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::mem;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use event_listener::{Event, EventListener};
use futures_util::future::{self, Either};
use mywire_core::net::Buffers;
use mywire_core::rt;

use crate::engine::{Cursor, MySqlEngine, PreparedInfo, ResultHead, ResultSummary};
use crate::error::Error;
use crate::options::MySqlConnectOptions;
use crate::pool::MySqlPool;
use crate::result_set::MySqlResultSet;
use crate::row::{MySqlRow, Row, RowType};
use crate::template::{CompileOptions, SqlTemplate};
use crate::value::Value;

mod statement;

pub use statement::MySqlStatement;

/// A connection to a MySQL server, opened lazily by its first operation.
///
/// ```rust,no_run
/// # async fn example() -> mywire::Result<()> {
/// use mywire::mysql::{MySqlConnection, RowType, SqlTemplate};
///
/// let conn = MySqlConnection::new("mysql://root@localhost/test".parse()?);
///
/// let rows = conn
///     .query_all(
///         SqlTemplate::new("SELECT * FROM users WHERE name='").param("ann").sql("'"),
///         RowType::Map,
///     )
///     .await?;
///
/// conn.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct MySqlConnection {
    shared: Arc<Shared>,
}

enum Source {
    Direct,
    Pool(MySqlPool),
}

pub(crate) struct Shared {
    state: Mutex<State>,

    // notified by `end`
    cancel: Event,

    options: Arc<MySqlConnectOptions>,
    source: Source,
}

struct State {
    state_id: u64,
    phase: Phase,

    // statements dropped while an operation held the engine: (generation, statement id)
    deferred_closes: Vec<(u64, u32)>,
}

enum Phase {
    Fresh,
    Connecting,
    Idle(Box<MySqlEngine>),
    Querying,
}

impl Shared {
    fn new(options: MySqlConnectOptions, source: Source) -> Arc<Self> {
        Arc::new(Shared {
            state: Mutex::new(State {
                state_id: 0,
                phase: Phase::Fresh,
                deferred_closes: Vec::new(),
            }),
            cancel: Event::new(),
            options: Arc::new(options),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a socket, or take one from the pool. Also returns whether it was reused.
    async fn connect(&self, reuse: bool) -> Result<(Box<MySqlEngine>, bool), Error> {
        match &self.source {
            Source::Direct => {
                let engine =
                    MySqlEngine::establish(Arc::clone(&self.options), Buffers::new()).await?;

                Ok((Box::new(engine), false))
            }

            Source::Pool(pool) => pool.0.acquire(&self.options, reuse).await,
        }
    }

    /// Give up an engine. A pooled engine with an unread response is drained in the
    /// background first.
    fn release(&self, mut engine: Box<MySqlEngine>) {
        match &self.source {
            Source::Direct => {
                rt::try_spawn(async move {
                    (*engine).close().await;
                });
            }

            Source::Pool(pool) if engine.needs_drain() && !engine.broken => {
                let pool = Arc::clone(&pool.0);

                rt::try_spawn(async move {
                    if let Err(error) = engine.drain().await {
                        tracing::debug!(target: "mywire::pool", %error, "failed to discard a response");

                        if error.breaks_connection() {
                            engine.broken = true;
                        }
                    }

                    pool.release(engine);
                });
            }

            Source::Pool(pool) => pool.0.release(engine),
        }
    }

    async fn release_gracefully(&self, mut engine: Box<MySqlEngine>) -> Result<(), Error> {
        match &self.source {
            Source::Direct => {
                (*engine).close().await;
                Ok(())
            }

            Source::Pool(pool) => {
                let drained = if engine.needs_drain() && !engine.broken {
                    engine.drain().await
                } else {
                    Ok(())
                };

                if let Err(error) = &drained {
                    if error.breaks_connection() {
                        engine.broken = true;
                    }
                }

                pool.0.release(engine);

                drained
            }
        }
    }

    /// Cancel whatever runs and take the idle engine, if there is one.
    fn end(&self) -> Option<Box<MySqlEngine>> {
        let engine = {
            let mut state = self.lock();

            state.state_id = state.state_id.wrapping_add(1);
            state.deferred_closes.clear();

            match mem::replace(&mut state.phase, Phase::Fresh) {
                Phase::Idle(engine) => Some(engine),
                _ => None,
            }
        };

        self.cancel.notify(usize::MAX);

        engine
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        if let Phase::Idle(engine) = mem::replace(&mut state.phase, Phase::Fresh) {
            self.release(engine);
        }
    }
}

/// One operation on a connection, holding its engine until finished.
///
/// Dropping an operation hands the engine back as well. If that happens while the engine
/// was in the middle of I/O, the socket is closed.
pub(crate) struct Operation {
    shared: Arc<Shared>,
    state_id: u64,
    engine: Option<Box<MySqlEngine>>,

    // the engine came from the pool's idle set and no command has succeeded on it yet
    first_use: bool,

    // the next connect must open a new socket
    force_new: bool,

    in_flight: bool,
    finished: bool,
}

/// Run `fut` until it completes or the connection is ended.
pub(crate) async fn cancelable<T, F>(cancel: EventListener, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match future::select(pin!(fut), cancel).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(Error::Canceled),
    }
}

impl Operation {
    pub(crate) fn begin(shared: &Arc<Shared>) -> Result<Self, Error> {
        let mut state = shared.lock();

        let engine = match mem::replace(&mut state.phase, Phase::Querying) {
            Phase::Idle(engine) => Some(engine),

            Phase::Fresh => {
                state.phase = Phase::Connecting;
                None
            }

            busy @ (Phase::Querying | Phase::Connecting) => {
                state.phase = busy;
                return Err(Error::Busy(
                    "another operation is in progress on this connection",
                ));
            }
        };

        Ok(Operation {
            shared: Arc::clone(shared),
            state_id: state.state_id,
            engine,
            first_use: false,
            force_new: false,
            in_flight: false,
            finished: false,
        })
    }

    fn listen(&self) -> Result<EventListener, Error> {
        let listener = self.shared.cancel.listen();

        if self.shared.lock().state_id != self.state_id {
            return Err(Error::Canceled);
        }

        Ok(listener)
    }

    /// The engine, connected if necessary, and a listener to race its I/O against `end`.
    ///
    /// Pass the result of the I/O to [`settle`](Self::settle).
    pub(crate) async fn engine(&mut self) -> Result<(&mut MySqlEngine, EventListener), Error> {
        if self.engine.is_none() {
            let cancel = self.listen()?;
            let (engine, reused) = cancelable(cancel, self.shared.connect(!self.force_new)).await?;

            {
                let mut state = self.shared.lock();

                if state.state_id != self.state_id {
                    drop(state);
                    self.shared.release(engine);
                    return Err(Error::Canceled);
                }

                state.phase = Phase::Querying;
            }

            self.first_use = reused;
            self.engine = Some(engine);
        }

        let cancel = self.listen()?;
        self.in_flight = true;

        match self.engine.as_deref_mut() {
            Some(engine) => Ok((engine, cancel)),
            None => Err(Error::Canceled),
        }
    }

    /// Record the outcome of I/O on the engine.
    pub(crate) fn settle<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.in_flight = false;

        match &result {
            Ok(_) => self.first_use = false,

            Err(error) if error.breaks_connection() || matches!(error, Error::Canceled) => {
                if let Some(engine) = &mut self.engine {
                    engine.broken = true;
                }
            }

            Err(_) => {}
        }

        result
    }

    /// After a failed command: whether it may be repeated on a new socket. If so, the
    /// current socket has been given up.
    ///
    /// A pooled socket can have been closed by the server while it sat idle; that shows as
    /// an I/O error on its first command.
    pub(crate) fn retry_on_new_socket(&mut self, error: &Error) -> bool {
        if !self.first_use || !matches!(error, Error::Io(_)) {
            return false;
        }

        self.first_use = false;
        self.force_new = true;

        if let Some(mut engine) = self.engine.take() {
            tracing::debug!(
                target: "mywire::pool",
                connection_id = engine.connection_id,
                %error,
                "reused connection failed; retrying on a new one"
            );

            engine.broken = true;
            self.shared.release(engine);
        }

        true
    }

    /// Whether rows of a resultset are pending.
    pub(crate) fn in_rows(&self) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|engine| !engine.broken && matches!(engine.cursor, Cursor::Rows { .. }))
    }

    /// Whether the running command's response has been read completely.
    pub(crate) fn is_done(&self) -> bool {
        self.engine
            .as_ref()
            .map_or(true, |engine| engine.broken || !engine.needs_drain())
    }

    /// Hand the engine back to the connection.
    ///
    /// Fails with [`Error::Canceled`] if the connection was ended meanwhile.
    pub(crate) fn finish(mut self) -> Result<(), Error> {
        self.put_back()
    }

    /// Settle `result` and finish.
    pub(crate) fn complete<T>(mut self, result: Result<T, Error>) -> Result<T, Error> {
        let result = self.settle(result);
        let finished = self.put_back();

        let value = result?;
        finished?;

        Ok(value)
    }

    fn put_back(&mut self) -> Result<(), Error> {
        if mem::replace(&mut self.finished, true) {
            return Ok(());
        }

        let engine = self.engine.take();
        let mut state = self.shared.lock();

        if state.state_id != self.state_id {
            drop(state);

            if let Some(engine) = engine {
                self.shared.release(engine);
            }

            return Err(Error::Canceled);
        }

        match engine {
            Some(mut engine) if !engine.broken => {
                for (generation, statement) in mem::take(&mut state.deferred_closes) {
                    if generation != engine.generation {
                        continue;
                    }

                    if let Err(error) = engine.queue_close(statement) {
                        tracing::debug!(target: "mywire::protocol", %error, statement, "failed to queue COM_STMT_CLOSE");
                    }
                }

                state.phase = Phase::Idle(engine);
            }

            engine => {
                state.phase = Phase::Fresh;
                state.deferred_closes.clear();
                drop(state);

                if let Some(engine) = engine {
                    self.shared.release(engine);
                }
            }
        }

        Ok(())
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if self.in_flight {
            if let Some(engine) = &mut self.engine {
                engine.broken = true;
            }
        }

        let _ = self.put_back();
    }
}

impl MySqlConnection {
    /// A connection that opens its own socket. Nothing happens on the network until the
    /// first operation.
    pub fn new(options: MySqlConnectOptions) -> Self {
        MySqlConnection {
            shared: Shared::new(options, Source::Direct),
        }
    }

    pub(crate) fn pooled(pool: MySqlPool, options: MySqlConnectOptions) -> Self {
        MySqlConnection {
            shared: Shared::new(options, Source::Pool(pool)),
        }
    }

    /// Open a connection and authenticate right away.
    pub async fn connect(options: MySqlConnectOptions) -> Result<Self, Error> {
        let conn = Self::new(options);

        let mut op = Operation::begin(&conn.shared)?;
        let result = op.engine().await.map(drop);
        op.complete(result)?;

        Ok(conn)
    }

    pub fn options(&self) -> &MySqlConnectOptions {
        &self.shared.options
    }

    /// Whether an operation is running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.shared.lock().phase,
            Phase::Querying | Phase::Connecting
        )
    }

    fn with_idle<T>(&self, f: impl FnOnce(&MySqlEngine) -> T) -> Option<T> {
        match &self.shared.lock().phase {
            Phase::Idle(engine) => Some(f(engine)),
            _ => None,
        }
    }

    /// The server's version string, while the connection holds an idle socket.
    pub fn server_version(&self) -> Option<String> {
        self.with_idle(|engine| engine.server_version.clone())
    }

    /// The server's id for this session, while the connection holds an idle socket.
    pub fn connection_id(&self) -> Option<u32> {
        self.with_idle(|engine| engine.connection_id)
    }

    /// The session's default schema as last reported by the server.
    pub fn schema(&self) -> Option<String> {
        self.with_idle(|engine| engine.schema.clone()).flatten()
    }

    /// Run a statement and return its first resultset.
    ///
    /// A template with stream parameters runs as a prepared statement, its streams sent as
    /// long data; any other template is compiled to text with its values inlined.
    pub async fn query(&self, template: impl Into<SqlTemplate>) -> Result<MySqlResultSet, Error> {
        let mut template = Some(template.into());
        let mut op = Operation::begin(&self.shared)?;

        loop {
            let result = match op.engine().await {
                Ok((engine, cancel)) => cancelable(cancel, run_query(engine, &mut template)).await,
                Err(error) => Err(error),
            };

            match op.settle(result) {
                Ok(head) => return MySqlResultSet::new(op, head),

                // streams are consumed by the first attempt
                Err(error) if template.is_some() && op.retry_on_new_socket(&error) => continue,

                Err(error) => return op.complete(Err(error)),
            }
        }
    }

    /// Run a statement and read every row of its first resultset in the given shape.
    pub async fn query_all(
        &self,
        template: impl Into<SqlTemplate>,
        row_type: RowType,
    ) -> Result<Vec<Row>, Error> {
        let mut rs = self.query(template).await?;
        let mut rows = Vec::new();

        while let Some(row) = rs.next_row_as(row_type).await? {
            rows.push(row);
        }

        rs.discard().await?;

        Ok(rows)
    }

    /// Run a statement and return its first row, if any.
    pub async fn query_row(&self, template: impl Into<SqlTemplate>) -> Result<Option<MySqlRow>, Error> {
        let mut rs = self.query(template).await?;
        let row = rs.next_row().await?;

        rs.discard().await?;

        Ok(row)
    }

    /// Run a statement and return the first column of its first row, or `NULL` without rows.
    pub async fn query_col(&self, template: impl Into<SqlTemplate>) -> Result<Value, Error> {
        Ok(self
            .query_row(template)
            .await?
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }

    /// Run a statement for its effect and return the counters of its first resultset.
    pub async fn execute(&self, template: impl Into<SqlTemplate>) -> Result<ResultSummary, Error> {
        let mut rs = self.query(template).await?;
        let summary = rs.summary().clone();

        rs.discard().await?;

        Ok(summary)
    }

    /// Prepare a statement on the server.
    ///
    /// The statement stays usable after the socket is replaced; it is prepared again on
    /// the new one when next run.
    pub async fn prepare(&self, sql: &str) -> Result<MySqlStatement, Error> {
        let mut op = Operation::begin(&self.shared)?;

        loop {
            let result = match op.engine().await {
                Ok((engine, cancel)) => cancelable(cancel, run_prepare(engine, sql)).await,
                Err(error) => Err(error),
            };

            match op.settle(result) {
                Err(error) if op.retry_on_new_socket(&error) => continue,

                result => {
                    let (info, generation) = op.complete(result)?;

                    return Ok(MySqlStatement::new(
                        Arc::clone(&self.shared),
                        sql,
                        info,
                        generation,
                    ));
                }
            }
        }
    }

    /// Check that the server is reachable, with `COM_PING`.
    pub async fn ping(&self) -> Result<(), Error> {
        let mut op = Operation::begin(&self.shared)?;

        let result = match op.engine().await {
            Ok((engine, cancel)) => {
                cancelable(cancel, async move {
                    engine.prepare_for_command().await?;
                    engine.ping().await
                })
                .await
            }

            Err(error) => Err(error),
        };

        op.complete(result)
    }

    /// Give the socket back and cancel whatever operation is running.
    ///
    /// A pooled socket returns to the pool, any unread response drained in the background;
    /// any other socket is closed. The connection can be used again afterwards and will
    /// open a new socket.
    pub fn end(&self) {
        if let Some(engine) = self.shared.end() {
            self.shared.release(engine);
        }
    }

    /// Like [`end`](Self::end), but waits until the socket has been closed or returned.
    ///
    /// Returns the SQL error of an unread response that had to be drained, if any.
    pub async fn close(self) -> Result<(), Error> {
        match self.shared.end() {
            Some(engine) => self.shared.release_gracefully(engine).await,
            None => Ok(()),
        }
    }
}

async fn run_query(
    engine: &mut MySqlEngine,
    template: &mut Option<SqlTemplate>,
) -> Result<ResultHead, Error> {
    engine.prepare_for_command().await?;

    let options = Arc::clone(&engine.options);
    let compile = CompileOptions {
        no_backslash_escapes: engine.no_backslash_escapes(),
        policy: &*options.sql_policy,
    };

    let Some(current) = template.as_ref() else {
        return Err(Error::Canceled);
    };

    if !current.has_streams() {
        let sql = current.compile(&compile)?;
        return engine.query(&sql).await;
    }

    let Some(template) = template.take() else {
        return Err(Error::Canceled);
    };

    let (sql, params) = template.into_prepared(&compile)?;

    let statement = engine.prepare(&sql).await?;
    let head = engine.execute(&sql, &statement, params).await;
    let closed = engine.queue_close(statement.id);

    let head = head?;
    closed?;

    Ok(head)
}

async fn run_prepare(engine: &mut MySqlEngine, sql: &str) -> Result<(PreparedInfo, u64), Error> {
    engine.prepare_for_command().await?;

    let info = engine.prepare(sql).await?;

    Ok((info, engine.generation))
}

impl Debug for MySqlConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();

        let phase = match &state.phase {
            Phase::Fresh => "fresh",
            Phase::Connecting => "connecting",
            Phase::Idle(_) => "idle",
            Phase::Querying => "querying",
        };

        f.debug_struct("MySqlConnection")
            .field("options", &self.shared.options)
            .field("state_id", &state.state_id)
            .field("phase", &phase)
            .field("pooled", &matches!(self.shared.source, Source::Pool(_)))
            .finish()
    }
}
