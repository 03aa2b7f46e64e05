//! The aggregator task: sole owner of the metric store.
//!
//! Ingress readers never touch the store; they hand parsed payloads over
//! one bounded channel and this task applies them between flush ticks, so
//! sample handling and flushing never interleave and no lock exists.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bucket::BucketMapper;
use crate::metric::calculate::calculate;
use crate::metric::store::{MetricStore, ResetPolicy};
use crate::metric::{Percentile, Sample};
use crate::parse;
use crate::sink::Emitter;

/// Capacity of the reader-to-aggregator channel. Readers block when the
/// aggregator falls behind, which throttles TCP senders; UDP overflow is
/// shed by the kernel socket buffer instead.
pub const INGEST_QUEUE_CAPACITY: usize = 1000;

/// One parsed payload on its way to the store: the mapped samples plus the
/// count of lines that failed to parse.
#[derive(Debug, Default)]
pub struct Batch {
    pub samples: Vec<Sample>,
    pub bad_lines: usize,
}

impl Batch {
    /// Parses one received payload and applies the bucket transform.
    pub fn from_payload(payload: &[u8], mapper: &BucketMapper) -> Self {
        let text = String::from_utf8_lossy(payload);
        let (mut samples, errors) = parse::parse(&text);

        for sample in &mut samples {
            sample.bucket = mapper.map(&sample.bucket);
        }

        Self {
            samples,
            bad_lines: errors.len(),
        }
    }
}

pub struct Aggregator {
    store: MetricStore,
    flush_interval_ms: u64,
    percentiles: Vec<Percentile>,
    reset: ResetPolicy,
    emitters: Vec<Emitter>,
}

impl Aggregator {
    pub fn new(
        store: MetricStore,
        flush_interval_ms: u64,
        percentiles: Vec<Percentile>,
        reset: ResetPolicy,
        emitters: Vec<Emitter>,
    ) -> Self {
        Self {
            store,
            flush_interval_ms,
            percentiles,
            reset,
            emitters,
        }
    }

    /// Runs until cancelled. Cancellation exits immediately, without a
    /// final flush.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Batch>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.flush_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The interval's first tick completes immediately; consume it so
        // the first flush lands one full window after startup.
        ticker.tick().await;

        info!(flush_interval_ms = self.flush_interval_ms, "aggregator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("aggregator stopped");
                    return;
                }

                Some(batch) = rx.recv() => {
                    self.ingest(batch);
                }

                _ = ticker.tick() => {
                    // Everything queued ahead of the tick belongs to the
                    // closing window; apply it before flushing.
                    while let Ok(batch) = rx.try_recv() {
                        self.ingest(batch);
                    }
                    self.flush().await;
                }
            }
        }
    }

    fn ingest(&mut self, batch: Batch) {
        self.store.record_packet();
        self.store.record_bad_lines(batch.bad_lines);
        for sample in &batch.samples {
            self.store.apply(sample);
        }
    }

    async fn flush(&mut self) {
        let summary = calculate(&self.store, self.flush_interval_ms, &self.percentiles);

        debug!(
            counters = summary.counters.len(),
            timers = summary.timers.len(),
            gauges = summary.gauges.len(),
            sets = summary.sets.len(),
            "flush computed"
        );

        for emitter in &self.emitters {
            if let Err(e) = emitter.emit(&summary).await {
                error!(emitter = emitter.name(), error = %e, "flush emit failed");
            }
        }

        self.store.reset(&self.reset);
    }
}
