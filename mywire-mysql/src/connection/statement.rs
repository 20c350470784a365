use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use super::{cancelable, Operation, Phase, Shared};
use crate::column::MySqlColumn;
use crate::engine::{MySqlEngine, PreparedInfo, ResultHead, ResultSummary};
use crate::error::Error;
use crate::result_set::MySqlResultSet;
use crate::value::Param;

/// A statement prepared on a connection's server.
///
/// Dropping it closes it on the server: right away if the connection is idle, after the
/// running operation otherwise. Several statements may be open at once, but like any other
/// operation only one of them runs at a time.
///
/// ```rust,no_run
/// # async fn example(conn: &mywire::mysql::MySqlConnection) -> mywire::Result<()> {
/// use mywire::params;
///
/// let mut insert = conn.prepare("INSERT INTO t (n, s) VALUES (?, ?)").await?;
///
/// let summary = insert.execute(params![42, "hello"]).await?;
/// println!("inserted row {}", summary.last_insert_id);
/// # Ok(())
/// # }
/// ```
pub struct MySqlStatement {
    shared: Arc<Shared>,
    sql: String,
    info: PreparedInfo,

    // the socket `info` is valid on
    generation: u64,
}

impl MySqlStatement {
    pub(super) fn new(
        shared: Arc<Shared>,
        sql: &str,
        info: PreparedInfo,
        generation: u64,
    ) -> Self {
        Self {
            shared,
            sql: sql.to_owned(),
            info,
            generation,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders.
    pub fn params_len(&self) -> usize {
        self.info.params.len()
    }

    /// Columns of the statement's resultset, as reported when it was prepared.
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.info.columns
    }

    /// Run the statement and return its first resultset.
    ///
    /// Values too large to go inline, and every stream, are sent as long data first.
    pub async fn query(
        &mut self,
        params: impl IntoIterator<Item = impl Into<Param>>,
    ) -> Result<MySqlResultSet, Error> {
        let params = params.into_iter().map(Into::into).collect();
        let mut op = Operation::begin(&self.shared)?;

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, self.run(engine, params)).await,
            Err(error) => Err(error),
        };

        match op.settle(result) {
            Ok(head) => MySqlResultSet::new(op, head),
            Err(error) => op.complete(Err(error)),
        }
    }

    /// Run the statement for its effect and return the counters of its first resultset.
    pub async fn execute(
        &mut self,
        params: impl IntoIterator<Item = impl Into<Param>>,
    ) -> Result<ResultSummary, Error> {
        let mut rs = self.query(params).await?;
        let summary = rs.summary().clone();

        rs.discard().await?;

        Ok(summary)
    }

    async fn run(
        &mut self,
        engine: &mut MySqlEngine,
        params: Vec<Param>,
    ) -> Result<ResultHead, Error> {
        engine.prepare_for_command().await?;

        if engine.generation != self.generation {
            tracing::debug!(
                target: "mywire::protocol",
                statement = self.info.id,
                "socket was replaced; preparing statement again"
            );

            self.info = engine.prepare(&self.sql).await?;
            self.generation = engine.generation;
        }

        engine.execute(&self.sql, &self.info, params).await
    }
}

impl Drop for MySqlStatement {
    fn drop(&mut self) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        match &mut state.phase {
            Phase::Idle(engine) if engine.generation == self.generation => {
                if let Err(error) = engine.queue_close(self.info.id) {
                    tracing::debug!(target: "mywire::protocol", %error, "failed to queue COM_STMT_CLOSE");
                }
            }

            Phase::Querying => state.deferred_closes.push((self.generation, self.info.id)),

            // the socket it was prepared on is gone
            _ => {}
        }
    }
}

impl Debug for MySqlStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlStatement")
            .field("sql", &self.sql)
            .field("id", &self.info.id)
            .field("params", &self.info.params.len())
            .field("columns", &self.info.columns.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::tests::connected;
    use crate::engine::mock::{column_def, MockServer};
    use crate::params;
    use crate::type_id::ColumnType;

    async fn answer_prepare(server: &mut MockServer, id: u32) {
        let prepare = server.read_packet().await;
        assert_eq!(prepare[0], 0x16);

        server.prepare_ok(id, 2, 0).await;
        server
            .column_defs(&[
                column_def("?", ColumnType::VarString),
                column_def("?", ColumnType::VarString),
            ])
            .await;
    }

    #[tokio::test]
    async fn it_executes_and_closes_on_drop() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            answer_prepare(&mut server, 9).await;

            let execute = server.read_packet().await;
            assert_eq!(execute[0], 0x17);
            assert_eq!(&execute[1..5], &9_u32.to_le_bytes());
            server.ok_with(1, 1, 0x0002, 0, "").await;

            // the close is queued, then goes out ahead of the next command
            let (seq, close) = server.read_packet_with_seq().await;
            assert_eq!((seq, &close[..]), (0, &b"\x19\x09\x00\x00\x00"[..]));

            let ping = server.read_packet().await;
            assert_eq!(&ping[..], &[0x0e]);
            server.ok().await;
        });

        let mut insert = conn.prepare("INSERT INTO t (n, s) VALUES (?, ?)").await.unwrap();
        assert_eq!(insert.params_len(), 2);

        let summary = insert.execute(params![42, "hello"]).await.unwrap();
        assert_eq!(summary.affected_rows, 1);
        assert_eq!(summary.last_insert_id, 1);

        drop(insert);
        conn.ping().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_defers_close_while_the_connection_is_busy() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            answer_prepare(&mut server, 3).await;

            let _ = server.read_packet().await;
            server.columns(&[column_def("n", ColumnType::LongLong)]).await;
            server.text_row(&[Some("1")]).await;
            server.eof(0x0002).await;

            let (_, close) = server.read_packet_with_seq().await;
            assert_eq!(&close[..], b"\x19\x03\x00\x00\x00");

            let ping = server.read_packet().await;
            assert_eq!(&ping[..], &[0x0e]);
            server.ok().await;
        });

        let statement = conn.prepare("SELECT ?, ?").await.unwrap();

        let mut rs = conn.query("SELECT n FROM t").await.unwrap();
        drop(statement);

        assert!(rs.next_row().await.unwrap().is_some());
        assert!(rs.next_row().await.unwrap().is_none());

        conn.ping().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_checks_the_number_of_parameters() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            answer_prepare(&mut server, 1).await;
            server
        });

        let mut statement = conn.prepare("SELECT ?, ?").await.unwrap();
        let err = statement.execute(params![1]).await.unwrap_err();

        assert!(matches!(err, crate::error::Error::Template(_)));
        assert!(!conn.is_busy());

        drop(server.await.unwrap());
    }
}
