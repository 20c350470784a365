//! Reading the response of a statement.
//!
//! A [`MySqlResultSet`] is a cursor over a chain of resultsets. It starts at the first one;
//! [`next_row`](MySqlResultSet::next_row) reads the rows of the current resultset and
//! [`next_resultset`](MySqlResultSet::next_resultset) moves on to the next statement of a
//! multi-statement query. Rows are read from the socket on demand.
//!
//! While anything is left to read, the result set holds its connection's operation slot;
//! the connection is released when the response has been read to the end, by
//! [`discard`](MySqlResultSet::discard), or by dropping the result set (the rest of the
//! response is then skipped before the connection's next command).

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_core::stream::Stream;
use futures_util::stream;

use crate::column::MySqlColumn;
use crate::connection::{cancelable, Operation};
use crate::engine::{ResultHead, ResultSummary};
use crate::error::Error;
use crate::row::{MySqlRow, Row, RowType};

/// The response of a statement: its columns and counters, and the rows still to be read.
pub struct MySqlResultSet {
    // the running command; `None` once the response has been read
    op: Option<Operation>,
    columns: Arc<[MySqlColumn]>,
    summary: ResultSummary,
}

/// The last column of a row read with [`MySqlResultSet::next_row_streaming`], still on the
/// socket.
pub struct LastColumn<'rs> {
    rs: &'rs mut MySqlResultSet,
    len: Option<u64>,
    remaining: u64,
}

impl MySqlResultSet {
    pub(crate) fn new(op: Operation, head: ResultHead) -> Result<Self, Error> {
        let mut rs = MySqlResultSet {
            op: Some(op),
            columns: head.columns,
            summary: head.summary,
        };

        rs.finish_if_done()?;

        Ok(rs)
    }

    // Let go of the connection once its response has been read.
    fn finish_if_done(&mut self) -> Result<(), Error> {
        if self.op.as_ref().is_some_and(Operation::is_done) {
            if let Some(op) = self.op.take() {
                op.finish()?;
            }
        }

        Ok(())
    }

    /// Columns of the current resultset; empty for a statement without rows.
    pub fn columns(&self) -> &[MySqlColumn] {
        &self.columns
    }

    /// Counters of the current resultset. A resultset with rows reports them once its
    /// rows have been read.
    pub fn summary(&self) -> &ResultSummary {
        &self.summary
    }

    pub fn affected_rows(&self) -> u64 {
        self.summary.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.summary.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.summary.warnings
    }

    /// Rows matched by an `UPDATE`, when the server reports them.
    pub fn found_rows(&self) -> Option<u64> {
        self.summary.found_rows
    }

    /// Whether anything of the response is left to read: rows of the current resultset,
    /// or further resultsets.
    pub fn has_more(&self) -> bool {
        self.op.is_some()
    }

    /// Whether rows of the current resultset are left to read.
    pub fn has_more_rows(&self) -> bool {
        self.op.as_ref().is_some_and(Operation::in_rows)
    }

    /// Read the next row of the current resultset, or `None` at its end.
    pub async fn next_row(&mut self) -> Result<Option<MySqlRow>, Error> {
        let Some(op) = self.op.as_mut().filter(|op| op.in_rows()) else {
            return Ok(None);
        };

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, engine.next_row()).await,
            Err(error) => Err(error),
        };

        let result = op.settle(result);
        self.finish_if_done()?;

        Ok(result?.map(|values| MySqlRow::new(Arc::clone(&self.columns), values)))
    }

    /// Read the next row in the given shape.
    pub async fn next_row_as(&mut self, row_type: RowType) -> Result<Option<Row>, Error> {
        Ok(self.next_row().await?.map(|row| row.into_row(row_type)))
    }

    /// Read the next row, leaving its last column on the socket to be read in chunks.
    ///
    /// The returned row holds `NULL` in place of the last column. Large `BLOB` or `TEXT`
    /// values can be read this way without holding them in memory as a whole.
    pub async fn next_row_streaming(
        &mut self,
    ) -> Result<Option<(MySqlRow, LastColumn<'_>)>, Error> {
        let Some(op) = self.op.as_mut().filter(|op| op.in_rows()) else {
            return Ok(None);
        };

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, engine.next_row_streaming()).await,
            Err(error) => Err(error),
        };

        let result = op.settle(result);
        self.finish_if_done()?;

        let Some((values, len)) = result? else {
            return Ok(None);
        };

        let row = MySqlRow::new(Arc::clone(&self.columns), values);

        Ok(Some((
            row,
            LastColumn {
                rs: self,
                len,
                remaining: len.unwrap_or(0),
            },
        )))
    }

    /// Read the remaining rows of the current resultset.
    pub async fn rows(&mut self) -> Result<Vec<MySqlRow>, Error> {
        let mut rows = Vec::new();

        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }

        Ok(rows)
    }

    /// The remaining rows of the current resultset, as a stream.
    pub fn into_rows(self) -> impl Stream<Item = Result<MySqlRow, Error>> + Send {
        stream::try_unfold(self, |mut rs| async move {
            Ok::<_, Error>(rs.next_row().await?.map(|row| (row, rs)))
        })
    }

    /// Skip the rest of the current resultset and move to the next one.
    ///
    /// Returns `false`, and reads nothing, when the response has no further resultset.
    pub async fn next_resultset(&mut self) -> Result<bool, Error> {
        let Some(op) = self.op.as_mut() else {
            return Ok(false);
        };

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, engine.next_result()).await,
            Err(error) => Err(error),
        };

        let result = op.settle(result);
        self.finish_if_done()?;

        match result? {
            Some(head) => {
                self.columns = head.columns;
                self.summary = head.summary;
                Ok(true)
            }

            None => Ok(false),
        }
    }

    /// Read and drop the rest of the response, releasing the connection.
    ///
    /// Safe to call at any point and more than once. Returns the first SQL error found in
    /// a later resultset.
    pub async fn discard(&mut self) -> Result<(), Error> {
        let Some(mut op) = self.op.take() else {
            return Ok(());
        };

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, engine.drain()).await,
            Err(error) => Err(error),
        };

        op.complete(result)
    }
}

impl LastColumn<'_> {
    /// Length of the value in bytes, or `None` if it is `NULL`.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_null(&self) -> bool {
        self.len.is_none()
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next chunk of the value, or `None` once it has been read completely.
    ///
    /// Chunks are at most one read buffer in size.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let Some(op) = self.rs.op.as_mut() else {
            return Ok(None);
        };

        let result = match op.engine().await {
            Ok((engine, cancel)) => cancelable(cancel, engine.read_lob(usize::MAX)).await,
            Err(error) => Err(error),
        };

        let chunk = op.settle(result)?;

        if let Some(chunk) = &chunk {
            self.remaining = self.remaining.saturating_sub(chunk.len() as u64);
        }

        Ok(chunk)
    }

    /// Read the rest of the value into memory.
    pub async fn read_to_end(mut self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();

        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }

        Ok(buf.freeze())
    }
}

impl Debug for MySqlResultSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlResultSet")
            .field("columns", &self.columns.len())
            .field("summary", &self.summary)
            .field("has_more", &self.has_more())
            .finish()
    }
}

impl Debug for LastColumn<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastColumn")
            .field("len", &self.len)
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use crate::connection::tests::connected;
    use crate::engine::mock::{column_def, column_def_with};
    use crate::type_id::{ColumnFlags, ColumnType};
    use crate::value::Value;

    #[tokio::test]
    async fn it_walks_a_resultset_chain() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;

            // DROP, CREATE, SELECT
            server.ok_with(0, 0, 0x000a, 0, "").await;
            server.ok_with(0, 0, 0x000a, 0, "").await;
            server.columns(&[column_def("n", ColumnType::Long)]).await;
            server.text_row(&[Some("1")]).await;
            server.text_row(&[Some("2")]).await;
            server.eof(0x0002).await;
        });

        let mut rs = conn
            .query("DROP TABLE IF EXISTS t; CREATE TABLE t (n INT); SELECT 1 UNION SELECT 2")
            .await
            .unwrap();

        assert!(rs.has_more());
        assert!(rs.columns().is_empty());

        assert!(rs.next_resultset().await.unwrap());
        assert!(rs.has_more());

        assert!(rs.next_resultset().await.unwrap());
        assert_eq!(rs.columns()[0].name(), "n");
        assert!(rs.has_more_rows());

        let first = rs.next_row().await.unwrap().unwrap();
        assert_eq!(first.get(0).unwrap(), &Value::Int(1));

        // skips the second row
        assert!(!rs.next_resultset().await.unwrap());
        assert!(!rs.has_more());

        assert!(!conn.is_busy());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_discards_twice() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;
            server.columns(&[column_def("n", ColumnType::Long)]).await;
            server.text_row(&[Some("1")]).await;
            server.eof(0x000a).await;
            server.ok_with(3, 0, 0x0002, 0, "").await;
        });

        let mut rs = conn.query("SELECT 1; DELETE FROM t").await.unwrap();

        rs.discard().await.unwrap();
        assert!(!rs.has_more());

        rs.discard().await.unwrap();
        assert!(!rs.has_more());
        assert!(rs.next_row().await.unwrap().is_none());
        assert!(!rs.next_resultset().await.unwrap());

        assert!(!conn.is_busy());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_streams_the_last_column() {
        let (conn, mut server) = connected().await;
        let blob = vec![0xab_u8; 100_000];

        let server = {
            let blob = blob.clone();

            tokio::spawn(async move {
                let _ = server.read_packet().await;
                server
                    .columns(&[
                        column_def("id", ColumnType::Long),
                        column_def_with("data", ColumnType::LongBlob, ColumnFlags::BLOB, 63),
                    ])
                    .await;

                let mut row = vec![1, b'7', 0xfd];
                row.extend_from_slice(&(blob.len() as u32).to_le_bytes()[..3]);
                row.extend_from_slice(&blob);
                server.write_packet(&row).await;

                server.text_row(&[Some("8"), None]).await;
                server.eof(0x0002).await;
            })
        };

        let mut rs = conn.query("SELECT id, data FROM files").await.unwrap();

        let (row, data) = rs.next_row_streaming().await.unwrap().unwrap();
        assert_eq!(row.get(0).unwrap(), &Value::Int(7));
        assert_eq!(row.get(1).unwrap(), &Value::Null);
        assert_eq!(data.len(), Some(100_000));

        let bytes = data.read_to_end().await.unwrap();
        assert_eq!(&bytes[..], &blob[..]);

        let (row, data) = rs.next_row_streaming().await.unwrap().unwrap();
        assert_eq!(row.get(0).unwrap(), &Value::Int(8));
        assert!(data.is_null());

        assert!(rs.next_row_streaming().await.unwrap().is_none());
        assert!(!rs.has_more());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn it_streams_rows() {
        let (conn, mut server) = connected().await;

        let server = tokio::spawn(async move {
            let _ = server.read_packet().await;
            server.columns(&[column_def("n", ColumnType::Long)]).await;

            for n in 0..5 {
                server.text_row(&[Some(&n.to_string())]).await;
            }

            server.eof(0x0002).await;
        });

        let rs = conn.query("SELECT n FROM t").await.unwrap();
        let rows: Vec<_> = rs.into_rows().try_collect().await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].get(0).unwrap(), &Value::Int(4));
        assert!(!conn.is_busy());

        server.await.unwrap();
    }
}
