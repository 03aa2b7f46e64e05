//! Graphite plaintext emitter.
//!
//! Serializes a flush summary into `path value unixSeconds` lines and
//! writes them over one short-lived TCP connection per flush. A deadline
//! equal to the flush interval bounds resolution, connect and write
//! together; on any failure the batch is dropped and the next flush starts
//! clean.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::metric::calculate::FlushSummary;
use crate::metric::{format_float, Tail};

pub struct GraphiteEmitter {
    address: String,
    prefer_ipv6: bool,
    deadline: Duration,
}

impl GraphiteEmitter {
    pub fn new(address: String, prefer_ipv6: bool, deadline: Duration) -> Self {
        Self {
            address,
            prefer_ipv6,
            deadline,
        }
    }

    pub fn name(&self) -> &str {
        "graphite"
    }

    /// Serialize and ship one flush summary.
    pub async fn emit(&self, summary: &FlushSummary) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let payload = render(summary, timestamp);

        tokio::time::timeout(self.deadline, self.send(payload.as_bytes()))
            .await
            .map_err(|_| anyhow!("deadline of {:?} exceeded", self.deadline))??;

        debug!(
            addr = %self.address,
            bytes = payload.len(),
            "flush summary written"
        );

        Ok(())
    }

    async fn send(&self, payload: &[u8]) -> Result<()> {
        let addr = self.resolve().await?;

        let mut stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to graphite at {addr}"))?;

        stream
            .write_all(payload)
            .await
            .with_context(|| format!("writing to graphite at {addr}"))?;

        let _ = stream.shutdown().await;

        Ok(())
    }

    /// Resolves the configured address, preferring the configured address
    /// family but falling back to whatever resolution produced.
    async fn resolve(&self) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = lookup_host(self.address.as_str())
            .await
            .with_context(|| format!("resolving graphite address {}", self.address))?
            .collect();

        addrs
            .iter()
            .copied()
            .find(|addr| addr.is_ipv6() == self.prefer_ipv6)
            .or_else(|| addrs.first().copied())
            .ok_or_else(|| anyhow!("no addresses resolved for {}", self.address))
    }
}

/// Renders the summary into Graphite plaintext. Pure; bucket order follows
/// the summary's sorted maps.
pub fn render(summary: &FlushSummary, timestamp: u64) -> String {
    let mut out = String::new();

    for (bucket, counter) in &summary.counters {
        push_line(&mut out, bucket, ".count", &format_float(counter.value), timestamp);
        push_line(&mut out, bucket, ".rate", &format_float(counter.rate), timestamp);
    }

    for (bucket, timer) in &summary.timers {
        push_line(&mut out, bucket, ".lower", &format_float(timer.lower), timestamp);
        push_line(&mut out, bucket, ".upper", &format_float(timer.upper), timestamp);
        push_line(&mut out, bucket, ".count", &format_float(timer.count), timestamp);
        push_line(
            &mut out,
            bucket,
            ".count_ps",
            &format_float(timer.count_per_second),
            timestamp,
        );
        push_line(&mut out, bucket, ".sum", &format_float(timer.sum), timestamp);
        push_line(&mut out, bucket, ".mean", &format_float(timer.mean), timestamp);
        push_line(&mut out, bucket, ".median", &format_float(timer.median), timestamp);
        push_line(&mut out, bucket, ".std", &format_float(timer.std_dev), timestamp);

        for slice in &timer.percentiles {
            let label = slice.threshold.label();
            let boundary_suffix = match slice.threshold.tail() {
                Tail::Upper => format!(".upper_{label}"),
                Tail::Lower => format!(".lower_{label}"),
            };

            push_line(
                &mut out,
                bucket,
                &format!(".count_{label}"),
                &slice.count.to_string(),
                timestamp,
            );
            push_line(
                &mut out,
                bucket,
                &boundary_suffix,
                &format_float(slice.boundary),
                timestamp,
            );
            push_line(
                &mut out,
                bucket,
                &format!(".sum_{label}"),
                &format_float(slice.sum),
                timestamp,
            );
            push_line(
                &mut out,
                bucket,
                &format!(".mean_{label}"),
                &format_float(slice.mean),
                timestamp,
            );
        }
    }

    for (bucket, value) in &summary.gauges {
        push_line(&mut out, bucket, "", &format_float(*value), timestamp);
    }

    for (bucket, cardinality) in &summary.sets {
        push_line(&mut out, bucket, "", &cardinality.to_string(), timestamp);
    }

    out
}

fn push_line(out: &mut String, bucket: &str, suffix: &str, value: &str, timestamp: u64) {
    out.push_str(bucket);
    out.push_str(suffix);
    out.push(' ');
    out.push_str(value);
    out.push(' ');
    out.push_str(&timestamp.to_string());
    out.push('\n');
}
