use std::sync::Arc;

use crate::column::MySqlColumn;
use crate::engine::{Cursor, MySqlEngine, ResultHead, ResultSummary};
use crate::error::{Error, MySqlDatabaseError, ER_UNKNOWN_COM_ERROR};
use crate::io::MySqlBufExt;
use crate::protocol::response::{EofPacket, LocalInfilePacket};
use crate::protocol::text::{Ping, Query, ResetConnection};
use crate::protocol::{Capabilities, ColumnDefinition};

impl MySqlEngine {
    /// Send `COM_QUERY` and read the head of its first resultset.
    pub(crate) async fn query(&mut self, sql: &str) -> Result<ResultHead, Error> {
        self.begin_logging(sql);
        self.stream.send_packet(Query(sql.as_bytes())).await?;

        self.read_result_head(false).await
    }

    /// Read the head of the next resultset of the running command.
    ///
    /// This is the `OK` of a statement without rows, a `LOCAL INFILE` request (served here,
    /// then followed by its `OK`), or a column count and the column definitions.
    pub(crate) async fn read_result_head(&mut self, binary: bool) -> Result<ResultHead, Error> {
        // an ERR leaves nothing to read
        self.cursor = Cursor::Idle;

        loop {
            let packet = match self.stream.recv_packet().await {
                Ok(packet) => packet,
                Err(error) => {
                    self.logger = None;
                    return Err(error);
                }
            };

            match packet.first().copied() {
                Some(0x00) => {
                    let ok = packet.ok(self.stream.capabilities)?;

                    self.apply_ok(&ok);
                    self.end_of_result(ok.status, binary);

                    return Ok(ResultHead {
                        columns: Arc::from(Vec::new()),
                        summary: ResultSummary::from_ok(&ok),
                    });
                }

                Some(0xfb) => {
                    let request: LocalInfilePacket = packet.decode()?;

                    // the server answers with an OK or ERR, read on the next iteration
                    self.send_local_infile(&request.filename).await?;
                }

                _ => {
                    let mut buf = packet.0;
                    let count = buf
                        .get_uint_lenenc()?
                        .ok_or_else(|| err_protocol!("NULL column count"))?;

                    let columns = self.read_columns(count).await?;

                    self.cursor = Cursor::Rows {
                        columns: columns.clone(),
                        binary,
                    };

                    return Ok(ResultHead {
                        columns,
                        summary: ResultSummary::default(),
                    });
                }
            }
        }
    }

    /// Read `count` column definitions and the `EOF` that follows them without
    /// `DEPRECATE_EOF`.
    pub(crate) async fn read_columns(&mut self, count: u64) -> Result<Arc<[MySqlColumn]>, Error> {
        let count = usize::try_from(count)
            .map_err(|_| err_protocol!("column count {} out of range", count))?;

        let mut columns = Vec::with_capacity(count);

        for ordinal in 0..count {
            let def: ColumnDefinition = self.stream.recv().await?;
            columns.push(MySqlColumn::new(ordinal, def));
        }

        if count > 0 && !self.stream.capabilities.contains(Capabilities::DEPRECATE_EOF) {
            let _eof: EofPacket = self.stream.recv_packet().await?.eof(self.stream.capabilities)?;
        }

        Ok(columns.into())
    }

    /// Skip the rest of the current resultset and read the head of the next one, if the
    /// server announced another.
    pub(crate) async fn next_result(&mut self) -> Result<Option<ResultHead>, Error> {
        if matches!(self.cursor, Cursor::Rows { .. }) {
            self.skip_rows().await?;
        }

        match self.cursor {
            Cursor::MoreResults { binary } => self.read_result_head(binary).await.map(Some),
            _ => Ok(None),
        }
    }

    /// Read and discard everything left of the running command's response.
    ///
    /// A SQL error in a later resultset is returned after the response has been consumed.
    pub(crate) async fn drain(&mut self) -> Result<(), Error> {
        let mut first_error = None;

        while self.needs_drain() {
            let result = match self.cursor {
                Cursor::Rows { .. } => self.skip_rows().await,
                Cursor::MoreResults { binary } => self.read_result_head(binary).await.map(drop),
                Cursor::Idle => break,
            };

            if let Err(error) = result {
                if error.breaks_connection() {
                    return Err(error);
                }

                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// `COM_RESET_CONNECTION`. Returns `false` when the server does not know the command.
    pub(crate) async fn reset(&mut self) -> Result<bool, Error> {
        self.stream.send_packet(ResetConnection).await?;

        match self.stream.recv_packet().await {
            Ok(packet) => {
                let ok = packet.ok(self.stream.capabilities)?;
                self.apply_ok(&ok);

                self.schema = self.options.schema.clone();

                Ok(true)
            }

            Err(Error::Database(err))
                if err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|err| err.number() == ER_UNKNOWN_COM_ERROR) =>
            {
                Ok(false)
            }

            Err(error) => Err(error),
        }
    }

    pub(crate) async fn ping(&mut self) -> Result<(), Error> {
        self.stream.send_packet(Ping).await?;

        let ok = self.stream.recv_packet().await?.ok(self.stream.capabilities)?;
        self.apply_ok(&ok);

        Ok(())
    }

    /// Get the engine ready for a new command: finish the previous response and reset a
    /// reused pooled session.
    pub(crate) async fn prepare_for_command(&mut self) -> Result<(), Error> {
        if self.needs_drain() {
            if let Err(error) = self.drain().await {
                if error.breaks_connection() {
                    return Err(error);
                }

                tracing::debug!(target: "mywire::protocol", %error, "error while draining a previous response");
            }
        }

        if self.needs_reset {
            self.needs_reset = false;

            if !self.reset().await? {
                tracing::debug!(
                    target: "mywire::protocol",
                    server_version = %self.server_version,
                    "server does not support COM_RESET_CONNECTION; reusing session as is"
                );
            }

            self.run_init_sql().await?;
        }

        Ok(())
    }
}
