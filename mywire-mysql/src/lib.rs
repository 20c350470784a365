//! [MySQL] and [MariaDB] client: the wire protocol, connections, a DSN-keyed pool and the
//! SQL template compiler.
//!
//! [MySQL]: https://www.mysql.com/
//! [MariaDB]: https://mariadb.org/
#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(future_incompatible)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::string_lit_as_bytes)]
#![warn(clippy::use_self)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::len_without_is_empty)]

#[macro_use]
extern crate mywire_core;

mod column;
mod connection;
mod engine;
mod error;
mod io;
mod options;
mod pool;
mod protocol;
mod result_set;
mod row;
mod template;
mod type_id;
mod value;

pub use column::MySqlColumn;
pub use connection::{MySqlConnection, MySqlStatement};
pub use engine::{InfileHandler, ResultSummary};
pub use error::MySqlDatabaseError;
pub use options::MySqlConnectOptions;
pub use pool::{MySqlPool, MySqlPoolOptions};
pub use result_set::{LastColumn, MySqlResultSet};
pub use row::{MySqlRow, Row, RowType};
pub use template::{CompileOptions, DefaultSqlPolicy, SqlPolicy, SqlTemplate};
pub use type_id::{ColumnFlags, ColumnType};
pub use value::{Param, Value};

pub use mywire_core::error::{Error, Result};
