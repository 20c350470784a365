//! The protocol engine: one authenticated socket and the command it is running.
//!
//! An engine runs at most one command at a time. After a command is sent, the engine's
//! [`Cursor`] tracks how far its response has been read: rows of the current resultset,
//! further resultsets, or nothing. Anything left unread is skipped by [`MySqlEngine::drain`]
//! before the next command.
//!
//! Engines are not shared. [`MySqlConnection`](crate::MySqlConnection) hands one to a single
//! operation at a time and takes it back when that operation completes or is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mywire_core::logger::QueryLogger;
use mywire_core::net::Buffers;

use crate::column::MySqlColumn;
use crate::options::MySqlConnectOptions;
use crate::pool::PoolLease;
use crate::protocol::response::{Info, OkPacket, SessionStateChange};
use crate::protocol::Status;
use crate::protocol::text::Quit;

mod establish;
mod execute;
mod infile;
mod query;
mod rows;
mod stream;

pub(crate) use execute::PreparedInfo;
pub use infile::InfileHandler;
pub(crate) use stream::MySqlStream;

#[cfg(test)]
pub(crate) mod mock;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Where the engine is in reading the response to its last command.
#[derive(Debug, Clone, Default)]
pub(crate) enum Cursor {
    /// Nothing left to read.
    #[default]
    Idle,

    /// Rows of a resultset are pending.
    Rows {
        columns: Arc<[MySqlColumn]>,
        binary: bool,
    },

    /// The last resultset was read completely and the server announced another one.
    MoreResults { binary: bool },
}

/// Counters of a completed statement, from its `OK` packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSummary {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub info: String,

    /// Matched rows of an `UPDATE`, from the info string.
    pub found_rows: Option<u64>,
}

impl ResultSummary {
    fn from_ok(ok: &OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            info: ok.info.clone(),
            found_rows: Info::parse(&ok.info).matched,
        }
    }
}

/// The head of one resultset: its columns, or the counters of a statement without rows.
#[derive(Debug)]
pub(crate) struct ResultHead {
    pub(crate) columns: Arc<[MySqlColumn]>,
    pub(crate) summary: ResultSummary,
}

pub(crate) struct MySqlEngine {
    pub(crate) stream: MySqlStream,
    pub(crate) options: Arc<MySqlConnectOptions>,

    pub(crate) server_version: String,
    pub(crate) connection_id: u32,
    pub(crate) status: Status,

    // the session's default schema, as tracked from OK packets
    pub(crate) schema: Option<String>,
    pub(crate) character_set: Option<String>,

    // identifies this socket; statements prepared on another one are not valid here
    pub(crate) generation: u64,

    pub(crate) cursor: Cursor,

    // bytes of a streamed last column still to be read
    pub(crate) lob_remaining: u64,

    // the socket can no longer be trusted and must be closed
    pub(crate) broken: bool,

    // a pooled engine handed out again; the session is reset before its next command
    pub(crate) needs_reset: bool,

    pub(crate) use_till: Instant,
    pub(crate) use_n_times: u32,
    pub(crate) lease: Option<PoolLease>,

    pub(crate) logger: Option<QueryLogger>,
}

impl MySqlEngine {
    pub(crate) fn next_generation() -> u64 {
        NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether a response is still being read.
    pub(crate) fn needs_drain(&self) -> bool {
        !matches!(self.cursor, Cursor::Idle)
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.use_n_times == 0 || now >= self.use_till
    }

    pub(crate) fn no_backslash_escapes(&self) -> bool {
        self.status.contains(Status::NO_BACKSLASH_ESCAPES)
    }

    pub(crate) fn begin_logging(&mut self, sql: &str) {
        self.logger = Some(QueryLogger::new(
            sql.as_bytes(),
            self.options.log_settings.clone(),
        ));
    }

    /// Apply an `OK` packet (or the `OK` ending a row stream) to the session.
    pub(crate) fn apply_ok(&mut self, ok: &OkPacket) {
        self.status = ok.status;

        if let Some(logger) = &mut self.logger {
            logger.increase_rows_affected(ok.affected_rows);
        }

        for change in &ok.session_state {
            match change {
                SessionStateChange::Schema(schema) => {
                    tracing::debug!(target: "mywire::protocol", schema = %schema, "session schema changed");
                    self.schema = (!schema.is_empty()).then(|| schema.clone());
                }

                SessionStateChange::SystemVariable { name, value }
                    if name == "character_set_client" =>
                {
                    self.character_set = Some(value.clone());
                }

                _ => {}
            }
        }
    }

    /// Update the cursor after the last packet of a resultset, given its status flags.
    pub(crate) fn end_of_result(&mut self, status: Status, binary: bool) {
        self.status = status;

        if status.contains(Status::MORE_RESULTS_EXISTS) {
            self.cursor = Cursor::MoreResults { binary };
        } else {
            self.cursor = Cursor::Idle;

            // the statement is over; report it
            self.logger = None;
        }
    }

    /// Close the socket gracefully and recover its buffers.
    pub(crate) async fn close(mut self) -> Buffers {
        if !self.broken {
            if let Err(error) = self.stream.send_packet(Quit).await {
                tracing::debug!(target: "mywire::protocol", %error, "failed to send COM_QUIT");
            }
        }

        if let Err(error) = self.stream.shutdown().await {
            tracing::trace!(target: "mywire::protocol", %error, "failed to shut down socket");
        }

        self.stream.into_buffers()
    }
}
