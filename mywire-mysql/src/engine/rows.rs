//! Row decoding for both protocols.
//!
//! Rows are read field by field straight from the socket buffer, so a row is never
//! assembled in memory as one payload. With streaming enabled the last column is not
//! decoded at all: its length is returned and its bytes are left on the socket for
//! [`MySqlEngine::read_lob`] to hand out in chunks.
//!
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_query_response_text_resultset_row.html>
//! <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_binary_resultset.html>

use std::cmp::min;
use std::sync::Arc;

use bytes::Bytes;

use crate::column::MySqlColumn;
use crate::engine::{Cursor, MySqlEngine};
use crate::error::Error;
use crate::io::ProtocolDecode;
use crate::protocol::response::ErrPacket;
use crate::protocol::{Capabilities, Packet, MAX_PACKET_LEN};
use crate::type_id::ColumnType;
use crate::value::{binary, text, Value};

/// The row just read, and the length of its streamed last column (`None` for `NULL`).
pub(crate) type StreamedRow = (Vec<Value>, Option<u64>);

impl MySqlEngine {
    /// Read the next row of the current resultset, or `None` at its end.
    pub(crate) async fn next_row(&mut self) -> Result<Option<Vec<Value>>, Error> {
        Ok(self.read_row(false).await?.map(|(values, _)| values))
    }

    /// Read the next row, leaving its last column on the socket.
    ///
    /// The last value of the returned row is a `NULL` placeholder.
    pub(crate) async fn next_row_streaming(&mut self) -> Result<Option<StreamedRow>, Error> {
        self.read_row(true).await
    }

    /// Read up to `max` bytes of the streamed last column.
    pub(crate) async fn read_lob(&mut self, max: usize) -> Result<Option<Bytes>, Error> {
        if self.lob_remaining == 0 {
            return Ok(None);
        }

        let n = min(self.lob_remaining, max as u64);

        // `n` fits: it is no larger than `max`
        #[allow(clippy::cast_possible_truncation)]
        let n = min(n as usize, self.stream.capacity());

        let chunk = self.stream.read_bytes(n).await?;
        self.lob_remaining -= chunk.len() as u64;

        Ok(Some(chunk))
    }

    /// Skip every row left in the current resultset.
    pub(crate) async fn skip_rows(&mut self) -> Result<(), Error> {
        // each begin_row skips what is left of the previous row
        while self.begin_row().await?.is_some() {}

        Ok(())
    }

    fn is_end_of_rows(&self, len: usize) -> bool {
        if self.stream.capabilities.contains(Capabilities::DEPRECATE_EOF) {
            // an OK with a 0xfe header; a row starting with 0xfe (an 8 byte length) can
            // only come in a full packet
            len < MAX_PACKET_LEN
        } else {
            len < 9
        }
    }

    // Start the next row. Handles the end of the row stream and errors raised while
    // the server was producing rows.
    async fn begin_row(&mut self) -> Result<Option<(Arc<[MySqlColumn]>, bool)>, Error> {
        let (columns, binary) = match &self.cursor {
            Cursor::Rows { columns, binary } => (Arc::clone(columns), *binary),
            _ => return Ok(None),
        };

        self.lob_remaining = 0;

        let len = self.stream.begin_packet().await?;
        let header = self.stream.peek_u8().await?;

        if header == 0xfe && self.is_end_of_rows(len) {
            let packet = Packet(self.stream.read_rest().await?);
            let capabilities = self.stream.capabilities;

            let status = if capabilities.contains(Capabilities::DEPRECATE_EOF) {
                let ok = packet.ok(capabilities)?;
                self.apply_ok(&ok);
                ok.status
            } else {
                packet.eof(capabilities)?.status
            };

            self.end_of_result(status, binary);

            return Ok(None);
        }

        if header == 0xff {
            let err = ErrPacket::decode(self.stream.read_rest().await?)?;

            self.cursor = Cursor::Idle;
            self.logger = None;

            return Err(self.stream.error_from(err));
        }

        if let Some(logger) = &mut self.logger {
            logger.increment_rows_returned();
        }

        Ok(Some((columns, binary)))
    }

    async fn read_row(&mut self, stream_last: bool) -> Result<Option<StreamedRow>, Error> {
        let Some((columns, binary)) = self.begin_row().await? else {
            return Ok(None);
        };

        // a value that fails to decode leaves the stream in sync; the next row skips
        // whatever is left of this one
        let row = if binary {
            self.read_binary_row(&columns, stream_last).await?
        } else {
            self.read_text_row(&columns, stream_last).await?
        };

        Ok(Some(row))
    }

    async fn read_text_row(
        &mut self,
        columns: &[MySqlColumn],
        stream_last: bool,
    ) -> Result<StreamedRow, Error> {
        let mut values = Vec::with_capacity(columns.len());
        let mut lob = None;

        for (index, column) in columns.iter().enumerate() {
            let len = self.stream.read_lenenc().await?;

            if stream_last && index + 1 == columns.len() {
                self.lob_remaining = len.unwrap_or(0);
                lob = len;
                values.push(Value::Null);
                break;
            }

            values.push(match len {
                None => Value::Null,
                Some(len) => self.read_field(column, len).await?,
            });
        }

        Ok((values, lob))
    }

    // A length-prefixed field; values over the configured limit are skipped and read
    // as NULL.
    async fn read_field(&mut self, column: &MySqlColumn, len: u64) -> Result<Value, Error> {
        let max = self.options.max_column_len;

        match usize::try_from(len) {
            Ok(len) if len <= max => {
                let raw = self.stream.read_bytes(len).await?;
                text::decode(column, raw)
            }

            _ => {
                tracing::debug!(
                    target: "mywire::protocol",
                    column = column.name(),
                    len,
                    max,
                    "skipping value longer than max-column-len"
                );

                self.skip_long(len).await?;
                Ok(Value::Null)
            }
        }
    }

    async fn skip_long(&mut self, mut len: u64) -> Result<(), Error> {
        while len > 0 {
            let step = usize::try_from(len).unwrap_or(usize::MAX);
            self.stream.skip(step).await?;
            len -= step as u64;
        }

        Ok(())
    }

    async fn read_binary_row(
        &mut self,
        columns: &[MySqlColumn],
        stream_last: bool,
    ) -> Result<StreamedRow, Error> {
        let header = self.stream.read_u8().await?;
        if header != 0x00 {
            return Err(err_protocol!(
                "expected 0x00 (binary row) but found 0x{:02x}",
                header
            ));
        }

        // NULL bitmap; the first two bits are reserved
        let bitmap = self.stream.read_bytes((columns.len() + 9) / 8).await?;
        let is_null = |index: usize| {
            let bit = index + 2;
            bitmap[bit / 8] & (1 << (bit % 8)) != 0
        };

        let mut values = Vec::with_capacity(columns.len());
        let mut lob = None;

        for (index, column) in columns.iter().enumerate() {
            let last = stream_last && index + 1 == columns.len();

            if is_null(index) {
                values.push(Value::Null);
                continue;
            }

            if last {
                let len = self.binary_len(column.column_type()).await?;

                self.lob_remaining = len;
                lob = Some(len);
                values.push(Value::Null);
                break;
            }

            values.push(self.read_binary_value(column).await?);
        }

        Ok((values, lob))
    }

    // Length of a binary protocol field, consuming its length prefix if it has one.
    async fn binary_len(&mut self, ty: ColumnType) -> Result<u64, Error> {
        Ok(match ty {
            ColumnType::Null => 0,
            ColumnType::Tiny => 1,
            ColumnType::Short | ColumnType::Year => 2,
            ColumnType::Long | ColumnType::Int24 | ColumnType::Float => 4,
            ColumnType::LongLong | ColumnType::Double => 8,

            ColumnType::Date | ColumnType::Datetime | ColumnType::Timestamp | ColumnType::Time => {
                u64::from(self.stream.read_u8().await?)
            }

            _ => self.stream.read_lenenc().await?.unwrap_or(0),
        })
    }

    async fn read_binary_value(&mut self, column: &MySqlColumn) -> Result<Value, Error> {
        let unsigned = column.is_unsigned();

        Ok(match column.column_type() {
            ColumnType::Null => Value::Null,

            ColumnType::Tiny => {
                let raw = self.stream.read_array::<1>().await?;
                if unsigned {
                    Value::Int(i64::from(raw[0]))
                } else {
                    Value::Int(i64::from(i8::from_le_bytes(raw)))
                }
            }

            ColumnType::Short | ColumnType::Year => {
                let raw = self.stream.read_array::<2>().await?;
                if unsigned {
                    Value::Int(i64::from(u16::from_le_bytes(raw)))
                } else {
                    Value::Int(i64::from(i16::from_le_bytes(raw)))
                }
            }

            ColumnType::Long | ColumnType::Int24 => {
                let raw = self.stream.read_array::<4>().await?;
                if unsigned {
                    Value::Int(i64::from(u32::from_le_bytes(raw)))
                } else {
                    Value::Int(i64::from(i32::from_le_bytes(raw)))
                }
            }

            ColumnType::LongLong => {
                let raw = self.stream.read_array::<8>().await?;
                if unsigned {
                    let v = u64::from_le_bytes(raw);
                    i64::try_from(v).map_or(Value::UInt(v), Value::Int)
                } else {
                    Value::Int(i64::from_le_bytes(raw))
                }
            }

            ColumnType::Float => Value::Double(f64::from(self.stream.read_f32().await?)),
            ColumnType::Double => Value::Double(self.stream.read_f64().await?),

            ty @ (ColumnType::Date | ColumnType::Datetime | ColumnType::Timestamp) => {
                let len = self.stream.read_u8().await?;
                let raw = self.stream.read_bytes(usize::from(len)).await?;

                binary::decode_datetime(&raw, ty == ColumnType::Date)?
            }

            ColumnType::Time => {
                let len = self.stream.read_u8().await?;
                let raw = self.stream.read_bytes(usize::from(len)).await?;

                binary::decode_time(&raw)?
            }

            _ => match self.stream.read_lenenc().await? {
                None => Value::Null,
                Some(len) => self.read_field(column, len).await?,
            },
        })
    }
}
