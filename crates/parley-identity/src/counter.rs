// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide message ordering counter with debounced checkpoints.
//!
//! `next()` is a single atomic increment. Persisting the high-water mark is
//! left to a background task: each increment wakes it, it waits for a quiet
//! period (bounded by a maximum wait during sustained bursts), then writes the
//! current value to the checkpoint once. `flush()` writes synchronously and
//! is what shutdown relies on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parley_config::model::CounterConfig;
use parley_core::{Clock, CounterCheckpoint, ParleyError, StorageAdapter};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared between the counter and its checkpoint task.
struct Shared {
    value: AtomicU64,
    dirty: Notify,
    checkpoint: Arc<dyn CounterCheckpoint>,
    /// Highest value handed to the checkpoint. Writes at or below it are skipped.
    last_written: Mutex<u64>,
}

impl Shared {
    async fn write_checkpoint(&self) -> Result<(), ParleyError> {
        let mut last = self.last_written.lock().await;
        let value = self.value.load(Ordering::SeqCst);
        if value <= *last {
            return Ok(());
        }
        self.checkpoint.store(value).await?;
        *last = value;
        debug!(value, "counter checkpoint stored");
        Ok(())
    }
}

/// The ordering counter.
///
/// Construct one per process, call [`initialize`](Self::initialize) once,
/// then share it. Tests build a fresh instance per case.
pub struct CounterStore {
    shared: Arc<Shared>,
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    quiet_period: Duration,
    max_wait: Duration,
    started: AtomicBool,
    ready: AtomicBool,
    cancel: CancellationToken,
    writer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CounterStore {
    pub fn new(
        config: &CounterConfig,
        checkpoint: Arc<dyn CounterCheckpoint>,
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: AtomicU64::new(0),
                dirty: Notify::new(),
                checkpoint,
                last_written: Mutex::new(0),
            }),
            storage,
            clock,
            quiet_period: Duration::from_millis(config.quiet_period_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            writer: std::sync::Mutex::new(None),
        }
    }

    /// Seed the counter and start the checkpoint task.
    ///
    /// The seed is the largest of the stored checkpoint, the highest counter
    /// on any durable arrival, and the wall clock in milliseconds. It is
    /// written back when it differs from the stored checkpoint.
    pub async fn initialize(&self) -> Result<u64, ParleyError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ParleyError::AlreadyInitialized);
        }
        match self.seed().await {
            Ok(seed) => {
                self.spawn_writer();
                self.ready.store(true, Ordering::SeqCst);
                info!(seed, "ordering counter initialized");
                Ok(seed)
            }
            Err(e) => {
                // A failed seed leaves the store uninitialized so the caller may retry.
                self.started.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn seed(&self) -> Result<u64, ParleyError> {
        let checkpoint = self.shared.checkpoint.load().await?;
        let durable = self.storage.max_counter_value().await?;
        let now = self.clock.now_millis();
        let seed = checkpoint.unwrap_or(0).max(durable.unwrap_or(0)).max(now);
        debug!(?checkpoint, ?durable, now, seed, "seeding ordering counter");

        self.shared.value.store(seed, Ordering::SeqCst);
        let mut last = self.shared.last_written.lock().await;
        if checkpoint != Some(seed) {
            self.shared.checkpoint.store(seed).await?;
        }
        *last = seed;
        Ok(seed)
    }

    fn spawn_writer(&self) {
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let quiet = self.quiet_period;
        let max_wait = self.max_wait;
        let handle = tokio::spawn(run_writer(shared, cancel, quiet, max_wait));
        if let Ok(mut slot) = self.writer.lock() {
            *slot = Some(handle);
        }
    }

    fn ensure_ready(&self) -> Result<(), ParleyError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ParleyError::NotInitialized)
        }
    }

    /// Issue the next ordering value.
    ///
    /// Strictly greater than every value previously returned by this store.
    pub fn next(&self) -> Result<u64, ParleyError> {
        self.ensure_ready()?;
        let previous = self
            .shared
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1))
            .map_err(|_| ParleyError::Internal("ordering counter exhausted".into()))?;
        self.shared.dirty.notify_one();
        Ok(previous + 1)
    }

    /// The last issued (or seeded) value, without incrementing.
    pub fn current(&self) -> Result<u64, ParleyError> {
        self.ensure_ready()?;
        Ok(self.shared.value.load(Ordering::SeqCst))
    }

    /// Write the current value to the checkpoint now.
    pub async fn flush(&self) -> Result<(), ParleyError> {
        self.ensure_ready()?;
        self.shared.write_checkpoint().await
    }

    /// Flush, then stop the checkpoint task.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.flush().await?;
        self.cancel.cancel();
        let handle = self.writer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "counter checkpoint task ended abnormally");
        }
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for CounterStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Debounce loop: one write per burst, never later than `max_wait` after the
/// burst started.
async fn run_writer(
    shared: Arc<Shared>,
    cancel: CancellationToken,
    quiet: Duration,
    max_wait: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = shared.dirty.notified() => {}
        }

        let deadline = Instant::now() + max_wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake = (now + quiet).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = shared.dirty.notified() => continue,
                _ = tokio::time::sleep_until(wake) => break,
            }
        }

        if let Err(e) = shared.write_checkpoint().await {
            warn!(error = %e, "debounced counter checkpoint failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_core::types::{Arrival, LocalId};
    use parley_test_utils::{ManualClock, MemoryCheckpoint, MemoryStorage};

    const NOW_MS: i64 = 1_700_000_000_000;

    fn config() -> CounterConfig {
        CounterConfig {
            quiet_period_ms: 25,
            max_wait_ms: 250,
        }
    }

    fn arrival(counter: u64) -> Arrival {
        Arrival {
            id: format!("arrival-{counter}"),
            local_id: LocalId("sender".into()),
            counter,
            received_at: Utc::now(),
        }
    }

    fn store_with(
        checkpoint: Arc<MemoryCheckpoint>,
        storage: MemoryStorage,
    ) -> CounterStore {
        CounterStore::new(
            &config(),
            checkpoint,
            Arc::new(storage),
            Arc::new(ManualClock::at_millis(NOW_MS)),
        )
    }

    #[tokio::test]
    async fn next_before_initialize_fails() {
        let store = store_with(Arc::new(MemoryCheckpoint::new()), MemoryStorage::new());
        assert!(matches!(store.next(), Err(ParleyError::NotInitialized)));
        assert!(matches!(store.flush().await, Err(ParleyError::NotInitialized)));
    }

    #[tokio::test]
    async fn second_initialize_fails() {
        let store = store_with(Arc::new(MemoryCheckpoint::new()), MemoryStorage::new());
        store.initialize().await.unwrap();
        assert!(matches!(store.initialize().await, Err(ParleyError::AlreadyInitialized)));
    }

    #[tokio::test]
    async fn seed_uses_checkpoint_when_it_is_largest() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64 + 5_000));
        let storage = MemoryStorage::new().with_arrivals([arrival(NOW_MS as u64 + 10)]);
        let store = store_with(checkpoint.clone(), storage);

        assert_eq!(store.initialize().await.unwrap(), NOW_MS as u64 + 5_000);
        // Seed equals the stored checkpoint, so nothing is written.
        assert!(checkpoint.writes().await.is_empty());
    }

    #[tokio::test]
    async fn seed_uses_durable_max_when_it_is_largest() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64 + 10));
        let storage = MemoryStorage::new().with_arrivals([
            arrival(NOW_MS as u64 + 9_000),
            arrival(NOW_MS as u64 + 20),
        ]);
        let store = store_with(checkpoint.clone(), storage);

        assert_eq!(store.initialize().await.unwrap(), NOW_MS as u64 + 9_000);
        assert_eq!(checkpoint.writes().await, vec![NOW_MS as u64 + 9_000]);
    }

    #[tokio::test]
    async fn seed_falls_back_to_wall_clock() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(10));
        let storage = MemoryStorage::new().with_arrivals([arrival(20)]);
        let store = store_with(checkpoint.clone(), storage);

        assert_eq!(store.initialize().await.unwrap(), NOW_MS as u64);
        assert_eq!(checkpoint.value().await, Some(NOW_MS as u64));
    }

    #[tokio::test]
    async fn next_is_strictly_increasing() {
        let store = store_with(Arc::new(MemoryCheckpoint::new()), MemoryStorage::new());
        let seed = store.initialize().await.unwrap();

        let mut previous = seed;
        for _ in 0..1_000 {
            let value = store.next().unwrap();
            assert!(value > previous);
            previous = value;
        }
        assert_eq!(store.current().unwrap(), seed + 1_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_next_never_repeats() {
        let store = Arc::new(store_with(Arc::new(MemoryCheckpoint::new()), MemoryStorage::new()));
        store.initialize().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                (0..500).map(|_| store.next().unwrap()).collect::<Vec<_>>()
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            let values = handle.await.unwrap();
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            all.extend(values);
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 500);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_into_one_write() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64));
        let store = store_with(checkpoint.clone(), MemoryStorage::new());
        store.initialize().await.unwrap();

        let mut last = 0;
        for _ in 0..10 {
            last = store.next().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(checkpoint.writes().await.is_empty(), "wrote before the quiet period");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(checkpoint.writes().await, vec![last]);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_burst_still_checkpoints_within_max_wait() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64));
        let store = store_with(checkpoint.clone(), MemoryStorage::new());
        store.initialize().await.unwrap();

        // One increment every 10ms never leaves a 25ms quiet gap.
        for _ in 0..30 {
            store.next().unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let writes = checkpoint.writes().await;
        assert!(!writes.is_empty(), "max wait bound never triggered a write");
        assert!(writes.len() <= 2, "expected periodic writes, got {writes:?}");
        assert!(writes.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn flush_writes_latest_value_and_skips_regressions() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64));
        let store = store_with(checkpoint.clone(), MemoryStorage::new());
        store.initialize().await.unwrap();

        let value = store.next().unwrap();
        store.flush().await.unwrap();
        store.flush().await.unwrap();
        assert_eq!(checkpoint.writes().await, vec![value]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_and_stops_task() {
        let checkpoint = Arc::new(MemoryCheckpoint::with_value(NOW_MS as u64));
        let store = store_with(checkpoint.clone(), MemoryStorage::new());
        store.initialize().await.unwrap();

        let value = store.next().unwrap();
        store.shutdown().await.unwrap();
        assert_eq!(checkpoint.value().await, Some(value));
        assert!(matches!(store.next(), Err(ParleyError::NotInitialized)));

        // The cancelled task must not write again.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(checkpoint.writes().await, vec![value]);
    }
}
