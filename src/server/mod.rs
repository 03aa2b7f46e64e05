pub mod aggregator;
pub mod tcp;
pub mod udp;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bucket::BucketMapper;
use crate::config::Config;
use crate::metric::store::{MetricStore, ResetPolicy};
use crate::sink::debug::DebugEmitter;
use crate::sink::graphite::GraphiteEmitter;
use crate::sink::Emitter;

use self::aggregator::{Aggregator, INGEST_QUEUE_CAPACITY};

/// Server wires the ingress readers, the aggregator and the emitters
/// together and owns their shutdown.
pub struct Server {
    cfg: Config,
    cancel: CancellationToken,
    aggregator_task: Option<tokio::task::JoinHandle<()>>,
}

impl Server {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            cancel: CancellationToken::new(),
            aggregator_task: None,
        }
    }

    /// The token that trips on shutdown, whether from a signal handler
    /// calling [`Server::stop`] or from a fatal accept failure inside.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind the sockets and spawn all tasks. Any bind failure aborts
    /// startup.
    pub async fn start(&mut self) -> Result<()> {
        let mapper = Arc::new(BucketMapper::from_config(&self.cfg));
        let store = MetricStore::new(&mapper);
        let percentiles = self
            .cfg
            .percentile_thresholds()
            .context("invalid percentiles")?;
        let reset = ResetPolicy::from_config(&self.cfg);

        let mut emitters = Vec::new();
        if !self.cfg.graphite_address.is_empty() {
            emitters.push(Emitter::Graphite(GraphiteEmitter::new(
                self.cfg.graphite_address.clone(),
                self.cfg.graphite_ipv6,
                self.cfg.flush_duration(),
            )));
            info!(
                addr = %self.cfg.graphite_address,
                ipv6 = self.cfg.graphite_ipv6,
                "graphite emitter configured"
            );
        }
        if self.cfg.debug {
            emitters.push(Emitter::Debug(DebugEmitter));
            info!("debug emitter configured");
        }

        let (tx, rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);

        let udp_addr = normalize_listen_addr(&self.cfg.udp_server_address);
        let socket = UdpSocket::bind(&udp_addr)
            .await
            .with_context(|| format!("binding udp listener on {udp_addr}"))?;
        info!(addr = %udp_addr, "listening for udp datagrams");
        tokio::spawn(udp::run(
            socket,
            Arc::clone(&mapper),
            tx.clone(),
            self.cancel.child_token(),
        ));

        if !self.cfg.tcp_server_address.is_empty() {
            let tcp_addr = normalize_listen_addr(&self.cfg.tcp_server_address);
            let listener = TcpListener::bind(&tcp_addr)
                .await
                .with_context(|| format!("binding tcp listener on {tcp_addr}"))?;
            info!(addr = %tcp_addr, "listening for tcp connections");
            // The accept loop gets the root token so an accept failure can
            // take the whole process down.
            tokio::spawn(tcp::run(
                listener,
                Arc::clone(&mapper),
                tx.clone(),
                self.cancel.clone(),
            ));
        }

        let aggregator = Aggregator::new(
            store,
            self.cfg.flush_interval,
            percentiles,
            reset,
            emitters,
        );
        self.aggregator_task = Some(tokio::spawn(
            aggregator.run(rx, self.cancel.child_token()),
        ));

        info!("server started");

        Ok(())
    }

    /// Cancel everything and wait for the aggregator to finish. There is
    /// no final flush; the window in progress is discarded.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.aggregator_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "aggregator task join failed");
            }
        }

        info!("server stopped");
    }
}

/// Expands the `:port` listen shorthand to an address all interfaces can
/// bind.
fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
