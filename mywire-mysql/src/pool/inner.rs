use std::collections::{HashMap, VecDeque};
use std::mem;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use event_listener::Event;
use futures_intrusive::sync::Semaphore;
use futures_util::future::{self, Either};
use mywire_core::net::Buffers;
use mywire_core::rt;

use super::MySqlPoolOptions;
use crate::engine::MySqlEngine;
use crate::error::Error;
use crate::options::MySqlConnectOptions;

/// Read buffers of closed connections kept for new ones.
const MAX_FREE_BUFFERS: usize = 4;

pub(crate) struct PoolInner {
    pub(super) options: MySqlPoolOptions,

    // one permit per busy connection; fair, so blocked acquirers are served in order
    semaphore: Semaphore,
    state: Mutex<PoolState>,

    // fired when the last busy connection is released
    all_done: Event,
    on_closed: Event,
    is_closed: AtomicBool,
}

#[derive(Default)]
struct PoolState {
    // keyed by the normalized DSN
    buckets: HashMap<String, Bucket>,
    free_buffers: Vec<Buffers>,
    busy: usize,
    sweeping: bool,
}

#[derive(Default)]
struct Bucket {
    idle: VecDeque<Box<MySqlEngine>>,
    busy: usize,
}

impl PoolState {
    fn num_idle(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.idle.len()).sum()
    }
}

/// A pool slot held by one busy engine. Dropping it frees the slot.
pub(crate) struct PoolLease {
    pool: Arc<PoolInner>,
    key: String,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        let all_done = {
            let mut state = self.pool.lock();

            if let Some(bucket) = state.buckets.get_mut(&self.key) {
                bucket.busy = bucket.busy.saturating_sub(1);
            }

            state.busy = state.busy.saturating_sub(1);
            state.busy == 0
        };

        self.pool.semaphore.release(1);

        if all_done {
            self.pool.all_done.notify(usize::MAX);
        }
    }
}

impl PoolInner {
    pub(super) fn new_arc(options: MySqlPoolOptions) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Semaphore::new(true, options.max_connections),
            state: Mutex::new(PoolState::default()),
            all_done: Event::new(),
            on_closed: Event::new(),
            is_closed: AtomicBool::new(false),
            options,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn size(&self) -> usize {
        let state = self.lock();
        state.busy + state.num_idle()
    }

    pub(super) fn num_idle(&self) -> usize {
        self.lock().num_idle()
    }

    pub(super) fn num_busy(&self) -> usize {
        self.lock().busy
    }

    pub(super) fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.is_closed.store(true, Ordering::Release);
        self.on_closed.notify(usize::MAX);
    }

    /// Wait for a free slot and take it for `key`.
    pub(crate) async fn lease(self: &Arc<Self>, key: &str) -> Result<PoolLease, Error> {
        let closed = self.on_closed.listen();

        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let acquire = pin!(self.semaphore.acquire(1));

        let mut permit = match future::select(acquire, closed).await {
            Either::Left((permit, _)) => permit,
            Either::Right(_) => return Err(Error::PoolClosed),
        };

        // the lease gives the permit back
        permit.disarm();

        let mut state = self.lock();
        state.busy += 1;
        state.buckets.entry(key.to_owned()).or_default().busy += 1;

        Ok(PoolLease {
            pool: Arc::clone(self),
            key: key.to_owned(),
        })
    }

    /// Hand out an engine for `options`: a live idle one when `reuse` allows it, otherwise a
    /// new one. Also returns whether the engine was reused.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        options: &Arc<MySqlConnectOptions>,
        reuse: bool,
    ) -> Result<(Box<MySqlEngine>, bool), Error> {
        let key = options.to_url();
        let lease = self.lease(&key).await?;
        let now = Instant::now();

        if reuse {
            if let Some(mut engine) = self.pop_idle(&key, now) {
                engine.needs_reset = true;
                engine.use_n_times = engine.use_n_times.saturating_sub(1);
                engine.options = Arc::clone(options);
                engine.lease = Some(lease);

                tracing::debug!(
                    target: "mywire::pool",
                    host = %options.host,
                    connection_id = engine.connection_id,
                    uses_left = engine.use_n_times,
                    "reusing idle connection"
                );

                return Ok((engine, true));
            }
        }

        let buffers = self.make_room(&key);

        let mut engine = Box::new(MySqlEngine::establish(Arc::clone(options), buffers).await?);

        engine.use_till = engine.use_till.min(now + self.options.keepalive_timeout);
        engine.use_n_times = engine
            .use_n_times
            .min(self.options.keepalive_max)
            .saturating_sub(1);
        engine.lease = Some(lease);

        tracing::debug!(
            target: "mywire::pool",
            host = %options.host,
            connection_id = engine.connection_id,
            "opened connection"
        );

        Ok((engine, false))
    }

    // Pop the most recently used live engine for `key`; expired ones found on the way are closed.
    fn pop_idle(self: &Arc<Self>, key: &str, now: Instant) -> Option<Box<MySqlEngine>> {
        let mut expired = Vec::new();

        let engine = {
            let mut state = self.lock();
            let bucket = state.buckets.get_mut(key)?;

            loop {
                match bucket.idle.pop_back() {
                    Some(engine) if engine.is_expired(now) => expired.push(engine),
                    other => break other,
                }
            }
        };

        for engine in expired {
            self.close_engine(engine, "expired");
        }

        engine
    }

    // A new connection is about to be opened for `key`. Close idle connections past the
    // limit, this target's first, and pick a recycled buffer for the new one.
    fn make_room(self: &Arc<Self>, key: &str) -> Buffers {
        let mut evicted = Vec::new();

        let buffers = {
            let mut state = self.lock();

            // `busy` already counts the new connection
            let mut excess =
                (state.busy + state.num_idle()).saturating_sub(self.options.max_connections);

            if let Some(bucket) = state.buckets.get_mut(key) {
                while excess > 0 {
                    let Some(engine) = bucket.idle.pop_front() else {
                        break;
                    };

                    evicted.push(engine);
                    excess -= 1;
                }
            }

            for bucket in state.buckets.values_mut() {
                while excess > 0 {
                    let Some(engine) = bucket.idle.pop_front() else {
                        break;
                    };

                    evicted.push(engine);
                    excess -= 1;
                }
            }

            state.free_buffers.pop().unwrap_or_default()
        };

        for engine in evicted {
            self.close_engine(engine, "making room");
        }

        buffers
    }

    /// Take back a busy engine: keep it idle, or close it when it is broken, expired,
    /// mid-response or the pool is closed.
    pub(crate) fn release(self: &Arc<Self>, mut engine: Box<MySqlEngine>) {
        let lease = engine.lease.take();
        let now = Instant::now();

        let timeout = self
            .options
            .keepalive_timeout
            .min(engine.options.keepalive_timeout);
        engine.use_till = engine.use_till.min(now + timeout);

        let reason = if engine.broken {
            Some("broken")
        } else if engine.needs_drain() {
            Some("unread response")
        } else if self.is_closed() {
            Some("pool closed")
        } else if engine.is_expired(now) {
            Some("expired")
        } else {
            None
        };

        if let Some(reason) = reason {
            self.close_engine(engine, reason);
        } else {
            let key = match &lease {
                Some(lease) => lease.key.clone(),
                None => engine.options.to_url(),
            };

            let start_sweep = {
                let mut state = self.lock();
                state.buckets.entry(key).or_default().idle.push_back(engine);
                !mem::replace(&mut state.sweeping, true)
            };

            if start_sweep {
                self.spawn_sweep();
            }
        }

        // idle first, then the slot: a waiting acquirer finds the engine
        drop(lease);
    }

    fn close_engine(self: &Arc<Self>, mut engine: Box<MySqlEngine>, reason: &'static str) {
        tracing::debug!(
            target: "mywire::pool",
            connection_id = engine.connection_id,
            reason,
            "closing connection"
        );

        let lease = engine.lease.take();
        let pool = Arc::downgrade(self);

        rt::try_spawn(async move {
            let buffers = (*engine).close().await;

            if let Some(pool) = pool.upgrade() {
                pool.recycle(buffers);
            }
        });

        drop(lease);
    }

    fn recycle(&self, buffers: Buffers) {
        let mut state = self.lock();

        if state.free_buffers.len() < MAX_FREE_BUFFERS {
            state.free_buffers.push(buffers);
        }
    }

    fn spawn_sweep(self: &Arc<Self>) {
        let pool = Arc::downgrade(self);
        let period = self.options.sweep_interval;

        let spawned = rt::try_spawn(async move {
            let mut interval = rt::interval(period);

            loop {
                interval.tick().await;

                let Some(pool) = pool.upgrade() else {
                    break;
                };

                if !pool.sweep(Instant::now()) {
                    break;
                }
            }
        });

        if !spawned {
            self.lock().sweeping = false;
        }
    }

    /// Close expired idle connections and drop empty buckets. Returns `false` when nothing
    /// is left and sweeping stops.
    pub(super) fn sweep(self: &Arc<Self>, now: Instant) -> bool {
        let mut expired = Vec::new();

        let live = {
            let mut state = self.lock();

            for bucket in state.buckets.values_mut() {
                let (gone, kept): (VecDeque<_>, VecDeque<_>) = bucket
                    .idle
                    .drain(..)
                    .partition(|engine| engine.is_expired(now));

                bucket.idle = kept;
                expired.extend(gone);
            }

            state
                .buckets
                .retain(|_, bucket| !bucket.idle.is_empty() || bucket.busy > 0);

            let live = state.busy + state.num_idle() > 0;

            if !live {
                state.sweeping = false;
            }

            live
        };

        if !expired.is_empty() {
            tracing::trace!(target: "mywire::pool", expired = expired.len(), "sweeping idle connections");
        }

        for engine in expired {
            self.close_engine(engine, "expired");
        }

        live
    }

    /// Close every idle connection, expired or not.
    pub(super) async fn close_idle(self: &Arc<Self>) {
        let engines: Vec<Box<MySqlEngine>> = {
            let mut state = self.lock();

            let engines = state
                .buckets
                .values_mut()
                .flat_map(|bucket| bucket.idle.drain(..))
                .collect();

            state.buckets.retain(|_, bucket| bucket.busy > 0);

            engines
        };

        let closing = engines.into_iter().map(|engine| (*engine).close());

        for buffers in future::join_all(closing).await {
            self.recycle(buffers);
        }
    }

    /// Close the pool, then wait until every busy connection has come back.
    pub(super) async fn shutdown(self: &Arc<Self>) {
        self.mark_closed();
        self.close_idle().await;

        loop {
            let listener = self.all_done.listen();

            if self.lock().busy == 0 {
                break;
            }

            listener.await;
        }
    }
}
