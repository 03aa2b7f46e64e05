//! UDP ingress: one datagram is one parser input.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bucket::BucketMapper;

use super::aggregator::Batch;

/// Largest datagram or stream chunk handed to the parser.
pub const MAX_READ_SIZE: usize = 65_535;

/// Reads datagrams until cancelled. Read errors are logged and the loop
/// moves on to the next datagram.
pub async fn run(
    socket: UdpSocket,
    mapper: Arc<BucketMapper>,
    tx: mpsc::Sender<Batch>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_READ_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, _peer)) => {
                        let batch = Batch::from_payload(&buf[..len], &mapper);
                        if tx.send(batch).await.is_err() {
                            // Aggregator is gone; nothing left to feed.
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "udp read failed"),
                }
            }
        }
    }
}
