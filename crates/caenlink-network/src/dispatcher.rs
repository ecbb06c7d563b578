//! Dispatcher task: the consumer side of a connector.
//!
//! The dispatcher waits on the line queue and hands every line to the bound
//! owner. It never touches the socket or the connection state, so reconnects
//! do not affect it: lines queued before a disconnect are still delivered
//! afterwards, in order and exactly once. It stops only on the connector's
//! shutdown signal.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connector::OwnerSlot;
use crate::queue::QueueConsumer;

/// Spawn the dispatcher task for a connector.
pub(crate) fn spawn(
    owner: Arc<OwnerSlot>,
    queue: QueueConsumer,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(owner, queue, shutdown))
}

async fn run(owner: Arc<OwnerSlot>, mut queue: QueueConsumer, shutdown: CancellationToken) {
    debug!("dispatcher started");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("dispatcher stopped by shutdown");
                break;
            }
            line = queue.pop() => line,
        };

        let Some(line) = line else {
            debug!("line queue closed, stopping dispatcher");
            break;
        };

        match owner.get() {
            Some(owner) => {
                trace!(%line, "dispatching line");
                owner.message_received(&line);
            }
            None => warn!(%line, "no owner bound, dropping line"),
        }
    }
}
