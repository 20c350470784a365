//! An async client for MySQL and MariaDB.
//!
//! * [`mysql::MySqlConnection`]: a connection that opens lazily and runs one operation at
//!   a time; [`end`](mysql::MySqlConnection::end) cancels whatever runs.
//! * [`mysql::MySqlPool`]: connections to any number of servers, kept idle per DSN.
//! * [`mysql::SqlTemplate`]: SQL text with values spliced in safely.
//!
//! ```rust,no_run
//! # async fn example() -> mywire::Result<()> {
//! use mywire::mysql::{MySqlPool, RowType, SqlTemplate};
//!
//! let pool = MySqlPool::new();
//! let conn = pool.connection("mysql://root@localhost/test".parse()?);
//!
//! let users = conn
//!     .query_all(
//!         SqlTemplate::new("SELECT id, name FROM users WHERE id > '").param(10).sql("'"),
//!         RowType::Map,
//!     )
//!     .await?;
//!
//! conn.end();
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]

pub use mywire_core::error::{self, Error, Result};

/// The MySQL / MariaDB driver.
pub mod mysql {
    pub use mywire_mysql::*;
}

pub use mywire_mysql::params;
