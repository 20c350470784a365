//! Runtime shims. mywire runs on tokio only.

use std::future::Future;
use std::time::Duration;

pub use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
#[error("operation timed out")]
pub struct TimeoutError;

/// Whether a tokio runtime is available on the current thread.
pub fn available() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

pub async fn timeout<F: Future>(duration: Duration, f: F) -> Result<F::Output, TimeoutError> {
    tokio::time::timeout(duration, f)
        .await
        .map_err(|_| TimeoutError)
}

pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

/// An interval whose missed ticks are delayed rather than bursted.
pub fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

#[track_caller]
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut)
}

/// Spawn `fut` if a runtime is available, for cleanup scheduled from `Drop`.
///
/// Returns `false` (dropping the future) when called outside of a runtime.
pub fn try_spawn<F>(fut: F) -> bool
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
            true
        }

        Err(_) => false,
    }
}
