//! The in-memory aggregation store.
//!
//! Exactly one task (the aggregator) owns a [`MetricStore`] and applies
//! samples to it, so no synchronization is needed anywhere in here.

use std::collections::{HashMap, HashSet};

use crate::bucket::BucketMapper;
use crate::config::Config;
use crate::metric::{MetricKind, Sample};

/// Telemetry bucket counting received datagrams.
pub const STAT_PACKETS_RECEIVED: &str = "packets_received";
/// Telemetry bucket counting applied samples.
pub const STAT_METRICS_RECEIVED: &str = "metrics_received";
/// Telemetry bucket counting lines that failed to parse.
pub const STAT_BAD_LINES_SEEN: &str = "bad_lines_seen";

/// Per-family choice between zeroing buckets in place and discarding them
/// entirely at flush time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetPolicy {
    pub delete_counters: bool,
    pub delete_timers: bool,
    pub delete_gauges: bool,
    pub delete_sets: bool,
}

impl ResetPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            delete_counters: cfg.delete_counters,
            delete_timers: cfg.delete_timers,
            delete_gauges: cfg.delete_gauges,
            delete_sets: cfg.delete_sets,
        }
    }
}

/// Aggregation state for all four metric families.
///
/// Buckets are created lazily on first sample. Every bucket present in
/// `timers` is also present in `timers_count`, which tracks the
/// sampling-adjusted observation count while `timers` keeps raw points.
#[derive(Debug)]
pub struct MetricStore {
    pub counters: HashMap<String, f64>,
    pub timers: HashMap<String, Vec<f64>>,
    pub timers_count: HashMap<String, f64>,
    pub gauges: HashMap<String, f64>,
    pub sets: HashMap<String, HashSet<String>>,

    stat_packets: String,
    stat_metrics: String,
    stat_bad_lines: String,
}

impl MetricStore {
    /// Creates an empty store with the telemetry counters seeded at zero.
    /// The mapper fixes their final names once, at startup.
    pub fn new(mapper: &BucketMapper) -> Self {
        let mut store = Self {
            counters: HashMap::new(),
            timers: HashMap::new(),
            timers_count: HashMap::new(),
            gauges: HashMap::new(),
            sets: HashMap::new(),
            stat_packets: mapper.stat(STAT_PACKETS_RECEIVED),
            stat_metrics: mapper.stat(STAT_METRICS_RECEIVED),
            stat_bad_lines: mapper.stat(STAT_BAD_LINES_SEEN),
        };
        store.seed_stats();
        store
    }

    /// Applies one sample. Counter values and timer counts are scaled by
    /// the 1/sampling multiplier; timer points are stored raw.
    pub fn apply(&mut self, sample: &Sample) {
        let multiplier = 1.0 / sample.sampling;

        match sample.kind {
            MetricKind::Counter => {
                *self.counters.entry(sample.bucket.clone()).or_insert(0.0) +=
                    sample.value * multiplier;
            }

            MetricKind::Timer => {
                self.timers
                    .entry(sample.bucket.clone())
                    .or_default()
                    .push(sample.value);
                *self
                    .timers_count
                    .entry(sample.bucket.clone())
                    .or_insert(0.0) += multiplier;
            }

            MetricKind::Gauge => {
                let slot = self.gauges.entry(sample.bucket.clone()).or_insert(0.0);
                if sample.gauge_has_sign {
                    *slot += sample.value;
                } else {
                    *slot = sample.value;
                }
            }

            MetricKind::Set => {
                let member = sample.set_member.clone().unwrap_or_default();
                self.sets
                    .entry(sample.bucket.clone())
                    .or_default()
                    .insert(member);
            }
        }

        Self::bump(&mut self.counters, &self.stat_metrics, 1.0);
    }

    /// Counts one received datagram or stream chunk.
    pub fn record_packet(&mut self) {
        Self::bump(&mut self.counters, &self.stat_packets, 1.0);
    }

    /// Counts lines that failed to parse.
    pub fn record_bad_lines(&mut self, count: usize) {
        if count > 0 {
            Self::bump(&mut self.counters, &self.stat_bad_lines, count as f64);
        }
    }

    /// Applies the post-flush reset. Zeroed families keep their keys so
    /// downstream dashboards see explicit zeros; deleted families drop
    /// them entirely.
    pub fn reset(&mut self, policy: &ResetPolicy) {
        if policy.delete_counters {
            self.counters.clear();
            self.seed_stats();
        } else {
            for value in self.counters.values_mut() {
                *value = 0.0;
            }
        }

        if policy.delete_timers {
            self.timers.clear();
            self.timers_count.clear();
        } else {
            for points in self.timers.values_mut() {
                points.clear();
            }
            for count in self.timers_count.values_mut() {
                *count = 0.0;
            }
        }

        if policy.delete_gauges {
            self.gauges.clear();
        }

        if policy.delete_sets {
            self.sets.clear();
        } else {
            for members in self.sets.values_mut() {
                members.clear();
            }
        }
    }

    fn seed_stats(&mut self) {
        self.counters.insert(self.stat_packets.clone(), 0.0);
        self.counters.insert(self.stat_metrics.clone(), 0.0);
        self.counters.insert(self.stat_bad_lines.clone(), 0.0);
    }

    fn bump(counters: &mut HashMap<String, f64>, bucket: &str, delta: f64) {
        match counters.get_mut(bucket) {
            Some(value) => *value += delta,
            None => {
                counters.insert(bucket.to_string(), delta);
            }
        }
    }
}
