use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use super::MySqlPool;
use crate::engine::InfileHandler;
use crate::options::{DEFAULT_KEEPALIVE_MAX, DEFAULT_KEEPALIVE_TIMEOUT};

/// Builder for [`MySqlPool`].
#[derive(Clone)]
pub struct MySqlPoolOptions {
    pub(crate) max_connections: usize,
    pub(crate) keepalive_timeout: Duration,
    pub(crate) keepalive_max: u32,
    pub(crate) sweep_interval: Duration,
    pub(crate) infile: Option<InfileHandler>,
}

impl Default for MySqlPoolOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlPoolOptions {
    /// Get a new builder with default options.
    ///
    /// See the source of this method for current defaults.
    pub fn new() -> Self {
        Self {
            // busy connections, summed over every target
            max_connections: 10,
            // a connection may sit idle this long, and is never kept longer than its DSN asks
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            // and be handed out at most this many times
            keepalive_max: DEFAULT_KEEPALIVE_MAX,
            // how often idle connections are checked for expiry
            sweep_interval: Duration::from_secs(1),
            infile: None,
        }
    }

    /// Set the maximum number of busy connections. Acquirers beyond it wait in line.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Set how long a pooled connection may be kept, counted from when it was opened and
    /// shortened after each use. The smaller of this and the DSN's `keepalive-timeout` wins.
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Set how many times a pooled connection may be handed out. The smaller of this and the
    /// DSN's `keepalive-max` wins.
    pub fn keepalive_max(mut self, uses: u32) -> Self {
        self.keepalive_max = uses;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Serve `LOAD DATA LOCAL INFILE` for connections whose options set no handler.
    pub fn local_infile(mut self, handler: InfileHandler) -> Self {
        self.infile = Some(handler);
        self
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn get_keepalive_timeout(&self) -> Duration {
        self.keepalive_timeout
    }

    pub fn get_keepalive_max(&self) -> u32 {
        self.keepalive_max
    }

    pub fn build(self) -> MySqlPool {
        MySqlPool::with_options(self)
    }
}

impl Debug for MySqlPoolOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlPoolOptions")
            .field("max_connections", &self.max_connections)
            .field("keepalive_timeout", &self.keepalive_timeout)
            .field("keepalive_max", &self.keepalive_max)
            .field("sweep_interval", &self.sweep_interval)
            .field("infile", &self.infile.is_some())
            .finish()
    }
}
