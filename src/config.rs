use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::metric::Percentile;

/// Top-level configuration for the bucketd daemon.
///
/// Field names on the wire are camelCase; every key is optional and falls
/// back to its default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// UDP listen address. Default: ":8125".
    #[serde(default = "default_udp_server_address")]
    pub udp_server_address: String,

    /// TCP listen address. Empty disables the TCP listener.
    #[serde(default)]
    pub tcp_server_address: String,

    /// Flush interval in milliseconds. Default: 10000.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u64,

    /// Graphite server address. Empty disables the Graphite emitter.
    #[serde(default)]
    pub graphite_address: String,

    /// Prefer an IPv6 address when connecting to Graphite.
    #[serde(default, rename = "graphiteIPV6")]
    pub graphite_ipv6: bool,

    /// Prefix for the daemon's own telemetry buckets. Default: "statsd".
    #[serde(default = "default_prefix_stats")]
    pub prefix_stats: String,

    /// Sanitize incoming bucket names. Default: true.
    #[serde(default = "default_true")]
    pub sanitize_bucket_names: bool,

    /// Apply `prefixStats` to every bucket, not only telemetry.
    #[serde(default)]
    pub prefix_all_buckets: bool,

    /// Signed percentile thresholds for timer summaries. Default: [90].
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,

    /// Discard counter buckets on flush instead of zeroing them.
    #[serde(default)]
    pub delete_counters: bool,

    /// Discard timer buckets on flush instead of emptying them.
    #[serde(default)]
    pub delete_timers: bool,

    /// Discard gauge buckets on flush instead of keeping their values.
    #[serde(default)]
    pub delete_gauges: bool,

    /// Discard set buckets on flush instead of emptying them.
    #[serde(default)]
    pub delete_sets: bool,

    /// Log a human-readable dump of every flush.
    #[serde(default)]
    pub debug: bool,
}

// --- Default value functions ---

fn default_udp_server_address() -> String {
    ":8125".to_string()
}

fn default_flush_interval() -> u64 {
    10_000
}

fn default_prefix_stats() -> String {
    "statsd".to_string()
}

fn default_true() -> bool {
    true
}

fn default_percentiles() -> Vec<f64> {
    vec![90.0]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            udp_server_address: default_udp_server_address(),
            tcp_server_address: String::new(),
            flush_interval: default_flush_interval(),
            graphite_address: String::new(),
            graphite_ipv6: false,
            prefix_stats: default_prefix_stats(),
            sanitize_bucket_names: true,
            prefix_all_buckets: false,
            percentiles: default_percentiles(),
            delete_counters: false,
            delete_timers: false,
            delete_gauges: false,
            delete_sets: false,
            debug: false,
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.udp_server_address.is_empty() {
            bail!("udpServerAddress is required");
        }

        if self.flush_interval == 0 {
            bail!("flushInterval must be positive");
        }

        self.percentile_thresholds()
            .context("invalid percentiles")?;

        Ok(())
    }

    /// The configured percentile thresholds in declaration order.
    pub fn percentile_thresholds(&self) -> Result<Vec<Percentile>> {
        self.percentiles
            .iter()
            .map(|p| Percentile::from_signed(*p))
            .collect()
    }

    /// The flush interval as a [`Duration`].
    pub fn flush_duration(&self) -> Duration {
        Duration::from_millis(self.flush_interval)
    }
}
