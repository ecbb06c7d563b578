//! Reader task: the producer side of a connector.
//!
//! One reader task is spawned per socket. It owns the socket's input half,
//! decodes newline-terminated lines and pushes them onto the connector's line
//! queue. Any read failure, including a clean close by the remote host or a
//! local close of the socket, ends the task and is reported to the connector
//! through its lifecycle handler.
//! A reader is never restarted; after a reconnect a fresh one is spawned
//! against the new socket.

use std::sync::Arc;

use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::connector::Shared;
use crate::queue::QueueProducer;

/// Line-decoding input half of a connector socket.
pub(crate) type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;

/// Spawn a reader task for the socket identified by `generation`.
///
/// Cancelling `closed` closes the socket from our side.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    generation: u64,
    lines: LineReader,
    queue: QueueProducer,
    closed: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(shared, generation, lines, queue, closed))
}

async fn run(
    shared: Arc<Shared>,
    generation: u64,
    mut lines: LineReader,
    queue: QueueProducer,
    closed: CancellationToken,
) {
    debug!(generation, "reader started");

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => {
                debug!(generation, "socket closed locally");
                break;
            }
            frame = lines.next() => frame,
        };

        match frame {
            Some(Ok(line)) => {
                trace!(generation, %line, "line received");

                if let Err(line) = queue.push(line) {
                    debug!(generation, %line, "line queue closed, stopping reader");
                    return;
                }
            }
            Some(Err(e)) => {
                error!(generation, error = %e, "socket read error");
                break;
            }
            None => {
                warn!(generation, "socket read error, remote host closed the socket");
                break;
            }
        }
    }

    // Release the input half before the lifecycle handler closes the rest.
    drop(lines);
    shared.connection_lost(generation, closed).await;
}
