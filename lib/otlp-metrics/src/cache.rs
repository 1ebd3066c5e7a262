//! Delta computation for cumulative series.

use std::{
    hash::BuildHasher as _,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use quanta::{Clock, Instant};
use tokio::{
    runtime::Handle,
    select,
    sync::oneshot,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, debug_span, warn, Instrument as _};

use crate::config::TranslatorConfig;
use crate::dimensions::SeriesIdentity;

const SHARD_COUNT: usize = 32;

type FastBuildHasher = foldhash::quality::RandomState;
type Shard = hashbrown::HashMap<SeriesIdentity, DeltaState, FastBuildHasher>;

/// The state we store for each cumulative series.
#[derive(Clone, Copy, Debug)]
struct DeltaState {
    last_value: f64,
    last_timestamp: u64,
    last_access: Instant,
}

/// The result of observing a cumulative value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Observation {
    /// First value seen for the series. It becomes the baseline.
    Baseline,

    /// The timestamp was not newer than the last one seen. The value was ignored.
    Stale,

    /// The difference from the previous value, and the time elapsed since it.
    Delta { delta: f64, elapsed: Duration },
}

impl Observation {
    pub(crate) fn delta(self) -> Option<f64> {
        match self {
            Self::Delta { delta, .. } => Some(delta),
            _ => None,
        }
    }

    pub(crate) fn rate(self) -> Option<f64> {
        match self {
            Self::Delta { delta, elapsed } => Some(delta / elapsed.as_secs_f64()),
            _ => None,
        }
    }

    pub(crate) fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

struct Inner {
    shards: Box<[Mutex<Shard>]>,
    hash_builder: FastBuildHasher,
    clock: Clock,
    ttl: Duration,
    sweep_interval: Duration,
}

/// A cache of the last value seen for each cumulative series, used to turn cumulative values into deltas.
///
/// Entries are spread over independently locked shards, so observations for different series rarely contend. Entries
/// that have not been accessed for longer than the TTL are removed by [`sweep`][Self::sweep], which can be run
/// periodically with [`spawn_sweeper`][Self::spawn_sweeper].
///
/// Cloning the cache is cheap and clones share the same entries.
#[derive(Clone)]
pub struct DeltaCache {
    inner: Arc<Inner>,
}

impl DeltaCache {
    /// Creates a new `DeltaCache` with the given TTL and sweep interval.
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self::with_clock(ttl, sweep_interval, Clock::new())
    }

    /// Creates a new `DeltaCache` using the TTL and sweep interval from the configuration.
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::new(config.delta_ttl(), config.sweep_interval())
    }

    /// Creates a new `DeltaCache` that reads time from the given clock.
    pub fn with_clock(ttl: Duration, sweep_interval: Duration, clock: Clock) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(Shard::with_hasher(FastBuildHasher::default())))
            .collect();

        Self {
            inner: Arc::new(Inner {
                shards,
                hash_builder: FastBuildHasher::default(),
                clock,
                ttl,
                sweep_interval,
            }),
        }
    }

    fn shard(&self, identity: &SeriesIdentity) -> MutexGuard<'_, Shard> {
        let idx = (self.inner.hash_builder.hash_one(identity) as usize) % self.inner.shards.len();
        self.inner.shards[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submits a cumulative value for a series and returns the delta since the previous value.
    ///
    /// Returns `None` for the first value of a series, and for values whose timestamp is not newer than the last one
    /// seen. A value lower than the previous one is treated as a counter reset: the delta is the value itself.
    pub fn compute(&self, identity: &SeriesIdentity, timestamp_ns: u64, value: f64) -> Option<f64> {
        self.observe(identity, timestamp_ns, value).delta()
    }

    /// Submits a cumulative value for a series and returns the per-second rate since the previous value.
    ///
    /// Follows the same rules as [`compute`][Self::compute], dividing the delta by the seconds elapsed between the two
    /// timestamps.
    pub fn compute_rate(&self, identity: &SeriesIdentity, timestamp_ns: u64, value: f64) -> Option<f64> {
        self.observe(identity, timestamp_ns, value).rate()
    }

    pub(crate) fn observe(&self, identity: &SeriesIdentity, timestamp_ns: u64, value: f64) -> Observation {
        let now = self.inner.clock.now();
        let mut shard = self.shard(identity);

        let Some(state) = shard.get_mut(identity) else {
            shard.insert(
                identity.clone(),
                DeltaState {
                    last_value: value,
                    last_timestamp: timestamp_ns,
                    last_access: now,
                },
            );
            return Observation::Baseline;
        };

        state.last_access = now;
        if timestamp_ns <= state.last_timestamp {
            return Observation::Stale;
        }

        let delta = if value < state.last_value {
            value
        } else {
            value - state.last_value
        };
        let elapsed = Duration::from_nanos(timestamp_ns - state.last_timestamp);

        state.last_value = value;
        state.last_timestamp = timestamp_ns;

        Observation::Delta { delta, elapsed }
    }

    /// Submits the current extremum (minimum or maximum) of a cumulative series.
    ///
    /// Returns `true` when the extremum moved since the previous point, meaning it was reached during the last
    /// window. The first value of a series and points whose timestamp is not newer than the last one return `false`.
    /// Extrema share the shards and expiry of delta entries.
    pub(crate) fn observe_extremum(&self, identity: &SeriesIdentity, timestamp_ns: u64, value: f64) -> bool {
        let now = self.inner.clock.now();
        let mut shard = self.shard(identity);

        let Some(state) = shard.get_mut(identity) else {
            shard.insert(
                identity.clone(),
                DeltaState {
                    last_value: value,
                    last_timestamp: timestamp_ns,
                    last_access: now,
                },
            );
            return false;
        };

        state.last_access = now;
        if timestamp_ns <= state.last_timestamp {
            return false;
        }

        let moved = value != state.last_value;
        state.last_value = value;
        state.last_timestamp = timestamp_ns;
        moved
    }

    /// Removes every entry that has not been accessed for longer than the TTL.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.inner.clock.now();
        let ttl = self.inner.ttl;

        let mut removed = 0;
        for shard in self.inner.shards.iter() {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|_, state| now.saturating_duration_since(state.last_access) <= ttl);
            removed += before - shard.len();
        }
        removed
    }

    /// Returns the number of series in the cache.
    pub fn len(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Returns `true` if the cache holds no series.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the cache holds state for the given series.
    pub fn contains(&self, identity: &SeriesIdentity) -> bool {
        self.shard(identity).contains_key(identity)
    }

    /// Returns the TTL of idle entries.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Returns the interval at which the sweeper runs.
    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Spawns a task on the given runtime that sweeps the cache every sweep interval.
    ///
    /// The task runs until the returned handle is shut down or dropped.
    pub fn spawn_sweeper(&self, runtime: &Handle) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(
            run_sweeper(self.clone(), shutdown_rx).instrument(debug_span!("delta_cache_sweeper")),
        );

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn run_sweeper(cache: DeltaCache, mut shutdown_rx: oneshot::Receiver<()>) {
    let period = cache.sweep_interval();
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(?period, ttl = ?cache.ttl(), "Delta cache sweeper started.");

    loop {
        select! {
            _ = ticker.tick() => {
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Removed expired series from delta cache.");
                }
            },
            _ = &mut shutdown_rx => {
                debug!("Delta cache sweeper stopped.");
                break;
            },
        }
    }
}

/// A handle to a running delta cache sweeper.
///
/// Dropping the handle stops the sweeper.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop, without waiting for it.
    pub fn trigger(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }

    /// Stops the sweeper and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.trigger();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Delta cache sweeper panicked.");
                }
            }
        }
    }

    /// Returns `true` if the sweeper task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.trigger();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use super::*;

    fn identity(name: &str) -> SeriesIdentity {
        SeriesIdentity::new(name, ["env:test"], None, None)
    }

    fn secs(s: u64) -> u64 {
        s * 1_000_000_000
    }

    fn test_cache(ttl_secs: u64) -> (DeltaCache, Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let ttl = Duration::from_secs(ttl_secs);
        let cache = DeltaCache::with_clock(ttl, Duration::from_secs(std::cmp::max(1, ttl_secs / 2)), clock);
        (cache, mock)
    }

    #[test]
    fn baseline_delta_and_reset() {
        let (cache, _) = test_cache(60);
        let id = identity("requests");

        assert_eq!(cache.compute(&id, secs(1), 5.0), None, "first point is the baseline");
        assert_eq!(cache.compute(&id, secs(2), 8.0), Some(3.0));
        assert_eq!(cache.compute(&id, secs(3), 8.0), Some(0.0));
        assert_eq!(cache.compute(&id, secs(4), 2.0), Some(2.0), "reset reports the new value");
        assert_eq!(cache.compute(&id, secs(5), 6.0), Some(4.0));
    }

    #[test]
    fn stale_points_leave_state_untouched() {
        let (cache, _) = test_cache(60);
        let id = identity("requests");

        assert_eq!(cache.observe(&id, secs(10), 5.0), Observation::Baseline);
        assert_eq!(cache.observe(&id, secs(10), 6.0), Observation::Stale);
        assert_eq!(cache.observe(&id, secs(5), 100.0), Observation::Stale);

        // The delta is still computed against the baseline.
        assert_eq!(cache.compute(&id, secs(20), 9.0), Some(4.0));
    }

    #[test]
    fn rates_use_elapsed_seconds() {
        let (cache, _) = test_cache(60);
        let id = identity("kafka.net.bytes_out.rate");

        assert_eq!(cache.compute_rate(&id, secs(0), 0.0), None);
        assert_eq!(cache.compute_rate(&id, secs(10), 50.0), Some(5.0));
        assert_eq!(cache.compute_rate(&id, secs(20), 50.0), Some(0.0));
    }

    #[test]
    fn series_are_independent() {
        let (cache, _) = test_cache(60);
        let a = identity("a");
        let b = SeriesIdentity::new("a", ["env:other"], None, None);

        cache.compute(&a, secs(1), 1.0);
        cache.compute(&b, secs(1), 100.0);
        assert_eq!(cache.compute(&a, secs(2), 2.0), Some(1.0));
        assert_eq!(cache.compute(&b, secs(2), 150.0), Some(50.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweep_removes_only_idle_entries() {
        let (cache, mock) = test_cache(10);
        let idle = identity("idle");
        let active = identity("active");

        cache.compute(&idle, secs(1), 1.0);
        cache.compute(&active, secs(1), 1.0);

        mock.increment(Duration::from_secs(6));
        cache.compute(&active, secs(2), 2.0);

        mock.increment(Duration::from_secs(5));
        assert_eq!(cache.sweep(), 1);
        assert!(!cache.contains(&idle));
        assert!(cache.contains(&active));

        // A stale observation still counts as an access.
        mock.increment(Duration::from_secs(8));
        assert_eq!(cache.compute(&active, secs(1), 0.0), None);
        mock.increment(Duration::from_secs(8));
        assert_eq!(cache.sweep(), 0);
        assert!(cache.contains(&active));

        // Once evicted, the series starts over from a new baseline.
        mock.increment(Duration::from_secs(11));
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.compute(&active, secs(3), 10.0), None);
    }

    #[test]
    fn concurrent_observations() {
        let (cache, _) = test_cache(60);

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for series in 0..64 {
                        let id = identity(&format!("series.{}.{}", worker, series));
                        assert_eq!(cache.compute(&id, secs(1), 1.0), None);
                        assert_eq!(cache.compute(&id, secs(2), 3.0), Some(2.0));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 4 * 64);
    }

    #[test]
    fn concurrent_observations_of_one_series() {
        const POINTS: u64 = 4096;

        let (cache, _) = test_cache(60);
        let id = identity("shared");
        let next = AtomicU64::new(1);
        assert_eq!(cache.compute(&id, 0, 0.0), None);

        // Points may arrive out of order across threads. Late ones are stale, and the accepted deltas still add up to
        // the difference between the last and first values.
        let total: f64 = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let mut total = 0.0;
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            if i > POINTS {
                                return total;
                            }
                            total += cache.compute(&id, i, i as f64).unwrap_or(0.0);
                        }
                    })
                })
                .collect();
            workers.into_iter().map(|worker| worker.join().unwrap()).sum()
        });

        assert_eq!(total, POINTS as f64);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweeping_never_evicts_a_live_series() {
        let (cache, mock) = test_cache(10);
        let idle = identity("idle");
        let live = identity("live");
        cache.compute(&idle, secs(0), 1.0);
        cache.compute(&live, secs(0), 0.0);

        let done = AtomicBool::new(false);
        let (deltas, removed) = std::thread::scope(|scope| {
            let sweeper = scope.spawn(|| {
                let mut removed = 0;
                while !done.load(Ordering::Acquire) {
                    removed += cache.sweep();
                }
                removed
            });

            let deltas: Vec<_> = (1..=200)
                .map(|i| {
                    mock.increment(Duration::from_secs(1));
                    cache.compute(&live, secs(i), i as f64)
                })
                .collect();
            done.store(true, Ordering::Release);

            (deltas, sweeper.join().unwrap())
        });

        assert!(deltas.iter().all(|delta| *delta == Some(1.0)), "{:?}", deltas);
        let removed = removed + cache.sweep();
        assert_eq!(removed, 1);
        assert!(!cache.contains(&idle));
        assert!(cache.contains(&live));
    }

    #[test]
    fn extrema_report_movement_within_the_window() {
        let (cache, mock) = test_cache(10);
        let min = identity("latency.min");

        assert!(!cache.observe_extremum(&min, secs(1), 1.0), "first point is the baseline");
        assert!(cache.observe_extremum(&min, secs(2), 0.5));
        assert!(!cache.observe_extremum(&min, secs(3), 0.5), "unchanged extremum");
        assert!(!cache.observe_extremum(&min, secs(3), 0.1), "stale point");
        assert!(cache.observe_extremum(&min, secs(4), 0.1));

        // Extrema expire with the rest of the cache.
        mock.increment(Duration::from_secs(11));
        assert_eq!(cache.sweep(), 1);
        assert!(!cache.observe_extremum(&min, secs(5), 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_periodically() {
        let (cache, mock) = test_cache(10);
        let id = identity("requests");
        cache.compute(&id, secs(1), 1.0);

        let handle = cache.spawn_sweeper(&Handle::current());

        // Nothing is idle yet when the first sweep happens.
        time::sleep(Duration::from_secs(6)).await;
        assert!(cache.contains(&id));

        mock.increment(Duration::from_secs(11));
        time::sleep(Duration::from_secs(5)).await;
        assert!(cache.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_sweeper() {
        let (cache, _) = test_cache(10);
        let handle = cache.spawn_sweeper(&Handle::current());
        assert_eq!(Arc::strong_count(&cache.inner), 2);

        drop(handle);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(Arc::strong_count(&cache.inner), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_task() {
        let (cache, _) = test_cache(10);
        let mut handle = cache.spawn_sweeper(&Handle::current());
        assert!(!handle.is_finished());

        handle.trigger();
        handle.shutdown().await;
        assert_eq!(Arc::strong_count(&cache.inner), 1);
    }
}
