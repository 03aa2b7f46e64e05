//! TCP ingress: an accept loop plus one reader task per connection.
//!
//! Reads are not line-buffered. Each chunk goes to the parser as-is, so a
//! metric line straddling two reads is counted as malformed. StatsD
//! clients are UDP-centric and the TCP path keeps the same stateless
//! per-chunk contract.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bucket::BucketMapper;

use super::aggregator::Batch;
use super::udp::MAX_READ_SIZE;

/// Accepts connections until cancelled. An accept failure is fatal: it
/// cancels the token it was handed, which takes the whole process down.
pub async fn run(
    listener: TcpListener,
    mapper: Arc<BucketMapper>,
    tx: mpsc::Sender<Batch>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "tcp connection accepted");
                        tokio::spawn(read_connection(
                            stream,
                            Arc::clone(&mapper),
                            tx.clone(),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "tcp accept failed, shutting down");
                        cancel.cancel();
                        return;
                    }
                }
            }
        }
    }
}

/// Drains one connection. EOF or a read error terminates this reader only.
async fn read_connection(
    mut stream: TcpStream,
    mapper: Arc<BucketMapper>,
    tx: mpsc::Sender<Batch>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_READ_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            read = stream.read(&mut buf) => {
                match read {
                    Ok(0) => return,
                    Ok(len) => {
                        let batch = Batch::from_payload(&buf[..len], &mapper);
                        if tx.send(batch).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "tcp read failed");
                        return;
                    }
                }
            }
        }
    }
}
