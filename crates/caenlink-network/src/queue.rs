//! Line queue shared by the reader and dispatcher tasks.
//!
//! The queue is an unbounded FIFO: pushing never waits, popping waits until a
//! line is available. Each connector creates exactly one queue; its producer
//! side is cloned into every reader task spawned over the connector's
//! lifetime, while the consumer side is handed to the single dispatcher task.

use tokio::sync::mpsc;

/// Create a new line queue and return its producer and consumer halves.
pub(crate) fn line_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Producer half, held by the connector and cloned into each reader task.
#[derive(Debug, Clone)]
pub(crate) struct QueueProducer {
    tx: mpsc::UnboundedSender<String>,
}

impl QueueProducer {
    /// Append a line to the queue without waiting.
    ///
    /// Fails only when the consumer half has been dropped, which happens after
    /// the dispatcher task has been shut down. The line is returned so the
    /// caller can log it.
    pub(crate) fn push(&self, line: String) -> Result<(), String> {
        self.tx.send(line).map_err(|e| e.0)
    }
}

/// Consumer half, owned by the dispatcher task.
#[derive(Debug)]
pub(crate) struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<String>,
}

impl QueueConsumer {
    /// Wait for the next line.
    ///
    /// Returns `None` once every producer has been dropped and the queue is
    /// drained.
    pub(crate) async fn pop(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
