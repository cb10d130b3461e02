//! MetricStore — bounded per-server time series with buffered ingestion.
//!
//! Producers call [`MetricStore::ingest`], which enqueues into a bounded
//! channel and fails fast with [`StoreError::BufferFull`] when saturated.
//! The [`IntakeWorker`] is the single consumer: it drains the channel in
//! batches and appends to the per-server series, so every mutation of a
//! series flows through one path. A separate eviction loop drops samples
//! older than the retention window on a fixed tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::types::{epoch_secs, Sample, ServerId};

/// Tunables for the metric store.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long samples are retained, in seconds.
    pub retention_secs: u64,
    /// Eviction sweep interval, in seconds.
    pub eviction_interval_secs: u64,
    /// Capacity of the ingestion buffer (in batches).
    pub buffer_capacity: usize,
    /// Maximum batches incorporated per consumer wakeup.
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_secs: 168 * 3600,
            eviction_interval_secs: 60,
            buffer_capacity: 1000,
            batch_size: 100,
        }
    }
}

/// Per-server retained series. Owned by the store; mutated only by the
/// intake worker and the eviction sweep.
#[derive(Debug, Default)]
struct ServerSeries {
    samples: Vec<Sample>,
    last_update: u64,
}

/// One enqueued unit of ingestion.
#[derive(Debug)]
struct Batch {
    server_id: ServerId,
    samples: Vec<Sample>,
}

type SharedSeries = Arc<RwLock<HashMap<ServerId, ServerSeries>>>;

/// Cloneable handle to the metric store.
#[derive(Clone)]
pub struct MetricStore {
    series: SharedSeries,
    tx: mpsc::Sender<Batch>,
    config: StoreConfig,
}

impl MetricStore {
    /// Create a store and its intake worker. The worker must be driven
    /// (via [`IntakeWorker::run`]) for ingested samples to become visible.
    pub fn new(config: StoreConfig) -> (Self, IntakeWorker) {
        let (tx, rx) = mpsc::channel(config.buffer_capacity);
        let series: SharedSeries = Arc::new(RwLock::new(HashMap::new()));
        let store = Self {
            series: series.clone(),
            tx,
            config: config.clone(),
        };
        let worker = IntakeWorker {
            series,
            rx,
            batch_size: config.batch_size,
        };
        (store, worker)
    }

    /// Enqueue one sample for asynchronous incorporation.
    ///
    /// Non-blocking: a full buffer returns [`StoreError::BufferFull`]
    /// immediately so the producer sees the drop.
    pub fn ingest(&self, sample: Sample) -> StoreResult<()> {
        self.ingest_batch(sample.server_id.clone(), vec![sample])
    }

    /// Enqueue several samples for one server as a single unit.
    pub fn ingest_batch(&self, server_id: ServerId, samples: Vec<Sample>) -> StoreResult<()> {
        self.tx
            .try_send(Batch { server_id, samples })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => StoreError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => StoreError::Closed,
            })
    }

    /// Snapshot the retained samples for a server.
    ///
    /// Returns [`StoreError::NotFound`] if nothing has ever been
    /// incorporated for this server.
    pub async fn query(&self, server_id: &str) -> StoreResult<Vec<Sample>> {
        let series = self.series.read().await;
        series
            .get(server_id)
            .map(|s| s.samples.clone())
            .ok_or_else(|| StoreError::NotFound(server_id.to_string()))
    }

    /// Unix timestamp of the last incorporation for a server.
    pub async fn last_update(&self, server_id: &str) -> StoreResult<u64> {
        let series = self.series.read().await;
        series
            .get(server_id)
            .map(|s| s.last_update)
            .ok_or_else(|| StoreError::NotFound(server_id.to_string()))
    }

    /// IDs of all servers with at least one incorporated sample.
    pub async fn tracked_servers(&self) -> Vec<ServerId> {
        let series = self.series.read().await;
        series.keys().cloned().collect()
    }

    /// Drop every sample older than `now − retention` across all servers.
    ///
    /// Full rebuild per server, O(samples); retention windows are bounded
    /// and the tick is coarse, so this stays cheap. Returns the number of
    /// samples evicted.
    pub async fn sweep(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.config.retention_secs);
        let mut evicted = 0;
        let mut series = self.series.write().await;
        for entry in series.values_mut() {
            let before = entry.samples.len();
            entry.samples.retain(|s| s.timestamp >= cutoff);
            evicted += before - entry.samples.len();
        }
        if evicted > 0 {
            debug!(evicted, cutoff, "eviction sweep completed");
        }
        evicted
    }

    /// Run the eviction loop until the shutdown signal flips.
    pub async fn run_eviction(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.eviction_interval_secs,
            retention_secs = self.config.retention_secs,
            "metric eviction loop started"
        );
        let interval = Duration::from_secs(self.config.eviction_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.sweep(epoch_secs()).await;
                }
                _ = shutdown.changed() => {
                    info!("metric eviction loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Single consumer of the ingestion buffer.
pub struct IntakeWorker {
    series: SharedSeries,
    rx: mpsc::Receiver<Batch>,
    batch_size: usize,
}

impl IntakeWorker {
    /// Run the intake loop until the shutdown signal flips or every
    /// producer handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("metric intake worker started");
        loop {
            tokio::select! {
                maybe = self.rx.recv() => {
                    match maybe {
                        Some(batch) => {
                            self.incorporate(batch).await;
                            // Opportunistically drain whatever else is queued,
                            // bounded so one wakeup cannot hold the write lock
                            // indefinitely.
                            self.drain_queued().await;
                        }
                        None => {
                            info!("ingestion channel closed, intake worker exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    // Flush what is already queued before exiting.
                    self.drain_queued().await;
                    info!("metric intake worker shutting down");
                    break;
                }
            }
        }
    }

    /// Incorporate everything currently queued, up to `batch_size` batches.
    pub async fn drain_queued(&mut self) {
        for _ in 0..self.batch_size {
            match self.rx.try_recv() {
                Ok(batch) => self.incorporate(batch).await,
                Err(_) => break,
            }
        }
    }

    async fn incorporate(&self, batch: Batch) {
        let mut series = self.series.write().await;
        let entry = series.entry(batch.server_id).or_default();
        entry.samples.extend(batch.samples);
        entry.last_update = epoch_secs();
    }
}
