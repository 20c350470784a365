//! Statement logging.
//!
//! Every statement is reported once it finishes, at [`LogSettings::statements_level`], or at
//! [`LogSettings::slow_statements_level`] if it ran longer than the slow threshold. Events go
//! to the `mywire::query` target through `tracing`, which forwards to `log` when no
//! subscriber is installed.

use std::time::{Duration, Instant};

use log::LevelFilter;

/// Target for per-statement events.
pub const QUERY_TARGET: &str = "mywire::query";

/// Log settings for statements run on a connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct LogSettings {
    pub statements_level: LevelFilter,
    pub slow_statements_level: LevelFilter,
    pub slow_statements_duration: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            statements_level: LevelFilter::Debug,
            slow_statements_level: LevelFilter::Warn,
            slow_statements_duration: Duration::from_secs(1),
        }
    }
}

impl LogSettings {
    pub fn log_statements(&mut self, level: LevelFilter) {
        self.statements_level = level;
    }

    pub fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_statements_level = level;
        self.slow_statements_duration = duration;
    }
}

// `tracing` has no dynamic levels, so dispatch over the five of them by hand.
#[doc(hidden)]
#[macro_export]
macro_rules! private_tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! private_tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

#[doc(hidden)]
pub fn private_level_filter_to_levels(filter: LevelFilter) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        LevelFilter::Error => Some(tracing::Level::ERROR),
        LevelFilter::Warn => Some(tracing::Level::WARN),
        LevelFilter::Info => Some(tracing::Level::INFO),
        LevelFilter::Debug => Some(tracing::Level::DEBUG),
        LevelFilter::Trace => Some(tracing::Level::TRACE),
        LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Reports one statement when dropped.
pub struct QueryLogger {
    sql: String,
    rows_returned: u64,
    rows_affected: u64,
    start: Instant,
    settings: LogSettings,
    finished: bool,
}

impl QueryLogger {
    pub fn new(sql: &[u8], settings: LogSettings) -> Self {
        Self {
            sql: String::from_utf8_lossy(sql).into_owned(),
            rows_returned: 0,
            rows_affected: 0,
            start: Instant::now(),
            settings,
            finished: false,
        }
    }

    pub fn increment_rows_returned(&mut self) {
        self.rows_returned += 1;
    }

    pub fn increase_rows_affected(&mut self, n: u64) {
        self.rows_affected += n;
    }

    pub fn finish(&mut self) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }

        let elapsed = self.start.elapsed();
        let was_slow = elapsed >= self.settings.slow_statements_duration;

        let level = if was_slow {
            self.settings.slow_statements_level
        } else {
            self.settings.statements_level
        };

        let Some((tracing_level, log_level)) = private_level_filter_to_levels(level) else {
            return;
        };

        // The enabled level could be set from either the tracing or the log side
        let enabled = log::log_enabled!(target: QUERY_TARGET, log_level)
            || private_tracing_dynamic_enabled!(target: QUERY_TARGET, tracing_level);

        if !enabled {
            return;
        }

        let mut summary = parse_query_summary(&self.sql);

        let sql = if summary != self.sql {
            summary.push_str(" …");
            format!("\n\n{}\n", self.sql)
        } else {
            String::new()
        };

        if was_slow {
            private_tracing_dynamic_event!(
                target: QUERY_TARGET,
                tracing_level,
                summary,
                db.statement = sql,
                rows_affected = self.rows_affected,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
                slow_threshold = ?self.settings.slow_statements_duration,
                "slow statement: execution time exceeded alert threshold"
            );
        } else {
            private_tracing_dynamic_event!(
                target: QUERY_TARGET,
                tracing_level,
                summary,
                db.statement = sql,
                rows_affected = self.rows_affected,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
            );
        }
    }
}

impl Drop for QueryLogger {
    fn drop(&mut self) {
        self.finish();
    }
}

pub fn parse_query_summary(sql: &str) -> String {
    // For now, just take the first 4 words
    sql.split_whitespace()
        .take(4)
        .collect::<Vec<&str>>()
        .join(" ")
}

#[test]
fn test_parse_query_summary() {
    assert_eq!(
        parse_query_summary("SELECT id, name\n  FROM users WHERE id = 1"),
        "SELECT id, name FROM"
    );
    assert_eq!(parse_query_summary("DO 1"), "DO 1");
}
