//! A pool of connections to any number of MySQL servers.
//!
//! Connections are kept per target, keyed by the normalized DSN
//! ([`MySqlConnectOptions::to_url`]), while the limit on busy connections is shared by all
//! targets. A connection handed out by [`MySqlPool::connection`] takes a slot when it first
//! talks to the server and keeps it until [`MySqlConnection::end`] or drop.
//!
//! Idle connections expire by time and by number of uses (see
//! [`MySqlPoolOptions::keepalive_timeout`] and [`MySqlPoolOptions::keepalive_max`]). A
//! background task closes expired ones while the pool holds any connection.
//!
//! ```rust,no_run
//! # async fn example() -> mywire::Result<()> {
//! use mywire::mysql::{MySqlConnectOptions, MySqlPoolOptions};
//!
//! let pool = MySqlPoolOptions::new().max_connections(5).build();
//! let options: MySqlConnectOptions = "mysql://root@localhost/test".parse()?;
//!
//! let conn = pool.connection(options);
//! let now = conn.query_col("SELECT NOW()").await?;
//! conn.end();
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::connection::MySqlConnection;
use crate::options::MySqlConnectOptions;

mod inner;
mod options;

pub(crate) use inner::{PoolInner, PoolLease};
pub use options::MySqlPoolOptions;

/// A DSN-keyed pool of MySQL connections. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct MySqlPool(pub(crate) Arc<PoolInner>);

impl MySqlPool {
    /// A pool with default options.
    pub fn new() -> Self {
        MySqlPoolOptions::new().build()
    }

    pub(crate) fn with_options(options: MySqlPoolOptions) -> Self {
        MySqlPool(PoolInner::new_arc(options))
    }

    /// A connection to `options`'s target, served by this pool.
    ///
    /// Nothing happens on the network until the first operation.
    pub fn connection(&self, mut options: MySqlConnectOptions) -> MySqlConnection {
        if options.infile.is_none() {
            options.infile = self.0.options.infile.clone();
        }

        MySqlConnection::pooled(self.clone(), options)
    }

    pub fn options(&self) -> &MySqlPoolOptions {
        &self.0.options
    }

    /// Idle and busy connections, over all targets.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn num_idle(&self) -> usize {
        self.0.num_idle()
    }

    pub fn num_busy(&self) -> usize {
        self.0.num_busy()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Close every idle connection now, whether expired or not.
    pub async fn close_idle(&self) {
        self.0.close_idle().await
    }

    /// Close the pool.
    ///
    /// Further operations on connections that do not hold a socket yet fail with
    /// [`Error::PoolClosed`](crate::error::Error::PoolClosed). Idle connections are closed
    /// right away, busy ones as they are released; this waits for the last of them.
    pub async fn shutdown(&self) {
        self.0.shutdown().await
    }
}

impl Default for MySqlPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MySqlPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlPool")
            .field("size", &self.size())
            .field("num_idle", &self.num_idle())
            .field("is_closed", &self.is_closed())
            .field("options", &self.0.options)
            .finish()
    }
}
