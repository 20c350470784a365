//! Prepared statements over the binary protocol.
//!
//! Values too large for the room left in the write buffer, and every stream parameter,
//! are sent ahead of `COM_STMT_EXECUTE` as `COM_STMT_SEND_LONG_DATA` chunks of at most one
//! buffer each. The server sends no response to those.

use std::borrow::Cow;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use crate::column::MySqlColumn;
use crate::engine::{MySqlEngine, ResultHead};
use crate::error::Error;
use crate::protocol::statement::{
    json_text, param_type, Execute, ExecuteParam, Prepare, PrepareOk, SendLongData, StmtClose,
    SEND_LONG_DATA_HEADER_LEN,
};
use crate::type_id::ColumnType;
use crate::value::{Param, Value};

/// Fixed part of a `COM_STMT_EXECUTE` with its packet header.
const EXECUTE_HEADER_LEN: usize = 4 + 10;

/// A statement prepared on the server.
#[derive(Debug, Clone)]
pub(crate) struct PreparedInfo {
    pub(crate) id: u32,
    pub(crate) params: Arc<[MySqlColumn]>,
    pub(crate) columns: Arc<[MySqlColumn]>,
}

impl MySqlEngine {
    pub(crate) async fn prepare(&mut self, sql: &str) -> Result<PreparedInfo, Error> {
        self.stream
            .send_packet(Prepare {
                query: sql.as_bytes(),
            })
            .await?;

        let ok: PrepareOk = self.stream.recv().await?;

        // parameter definitions carry no useful type information, but they have to be read
        let params = self.read_columns(u64::from(ok.params)).await?;
        let columns = self.read_columns(u64::from(ok.columns)).await?;

        tracing::trace!(
            target: "mywire::protocol",
            statement = ok.statement_id,
            params = ok.params,
            columns = ok.columns,
            "prepared statement"
        );

        Ok(PreparedInfo {
            id: ok.statement_id,
            params,
            columns,
        })
    }

    /// Bind `params` to a prepared statement, run it and read the head of its first
    /// resultset.
    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        statement: &PreparedInfo,
        mut params: Vec<Param>,
    ) -> Result<ResultHead, Error> {
        if params.len() != statement.params.len() {
            return Err(err_template!(
                "statement has {} placeholders but {} parameters were given",
                statement.params.len(),
                params.len()
            ));
        }

        self.begin_logging(sql);

        // room for inline values in the execute packet
        let count = params.len();
        let mut headroom = self
            .stream
            .capacity()
            .saturating_sub(EXECUTE_HEADER_LEN + (count + 7) / 8 + 1 + count * 2);

        let mut long_data = vec![None; count];

        for (index, param) in params.iter_mut().enumerate() {
            let param_index = u16::try_from(index)
                .map_err(|_| err_template!("too many parameters: {}", count))?;

            match param {
                Param::Stream(reader) => {
                    self.send_long_stream(statement.id, param_index, reader).await?;
                    long_data[index] = Some(ColumnType::LongBlob);
                }

                Param::Value(value) => {
                    let Some(data) = long_data_bytes(value)? else {
                        continue;
                    };

                    if data.len() + 9 <= headroom {
                        headroom -= data.len() + 9;
                        continue;
                    }

                    self.send_long_bytes(statement.id, param_index, &data).await?;
                    long_data[index] = Some(param_type(value).0);
                }
            }
        }

        let bound: Vec<ExecuteParam<'_>> = params
            .iter()
            .zip(&long_data)
            .map(|(param, long)| match (param, long) {
                (_, Some(ty)) => ExecuteParam::LongData(*ty),
                (Param::Value(value), None) => ExecuteParam::Inline(value),

                // streams are always sent as long data
                (Param::Stream(_), None) => ExecuteParam::LongData(ColumnType::LongBlob),
            })
            .collect();

        self.stream
            .send_packet(Execute {
                statement: statement.id,
                params: &bound,
            })
            .await?;

        self.read_result_head(true).await
    }

    async fn send_long_bytes(&mut self, statement: u32, param: u16, data: &[u8]) -> Result<(), Error> {
        let chunk_len = self.long_data_chunk_len();

        for chunk in data.chunks(chunk_len) {
            self.write_long_data(statement, param, chunk).await?;
        }

        Ok(())
    }

    async fn send_long_stream(
        &mut self,
        statement: u32,
        param: u16,
        reader: &mut (dyn tokio::io::AsyncRead + Send + Unpin),
    ) -> Result<(), Error> {
        let mut chunk = vec![0_u8; self.long_data_chunk_len()];
        let mut sent = false;

        loop {
            let n = reader.read(&mut chunk).await?;

            if n == 0 {
                break;
            }

            self.write_long_data(statement, param, &chunk[..n]).await?;
            sent = true;
        }

        // an empty stream still has to be marked as sent
        if !sent {
            self.write_long_data(statement, param, &[]).await?;
        }

        Ok(())
    }

    fn long_data_chunk_len(&self) -> usize {
        self.stream.upload_chunk_len(SEND_LONG_DATA_HEADER_LEN)
    }

    // each chunk is a command of its own, starting a new sequence
    async fn write_long_data(&mut self, statement: u32, param: u16, data: &[u8]) -> Result<(), Error> {
        self.stream
            .send_packet(SendLongData {
                statement,
                param,
                data,
            })
            .await
    }

    /// Queue `COM_STMT_CLOSE`; it goes out with the next command. There is no response.
    pub(crate) fn queue_close(&mut self, statement: u32) -> Result<(), Error> {
        self.stream.sequence_id = 0;
        self.stream.write_packet(StmtClose { statement })
    }
}

// The bytes a value would be sent as in a long data packet, if it can be sent that way.
fn long_data_bytes(value: &Value) -> Result<Option<Cow<'_, [u8]>>, Error> {
    Ok(match value {
        Value::String(s) | Value::Decimal(s) => Some(Cow::Borrowed(s.as_bytes())),
        Value::Bytes(b) => Some(Cow::Borrowed(&b[..])),
        Value::Json(_) | Value::List(_) | Value::Object(_) => {
            Some(Cow::Owned(json_text(value)?.into_bytes()))
        }
        _ => None,
    })
}
