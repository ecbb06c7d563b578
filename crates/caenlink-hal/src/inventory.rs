//! Inventory collection from the reader's line stream.
//!
//! The reader reports one tag identifier per line. [`InventoryCollector`] is
//! bound to the connector as its owner and accumulates those identifiers until
//! the controller drains them in `identify`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use caenlink_network::ConnectorOwner;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Collected {
    ids: Vec<String>,
    seen: HashSet<String>,
}

/// Connector owner that collects tag identifiers.
///
/// Identifiers are deduplicated and kept in first-seen order. A connection
/// loss discards everything collected on the lost session.
#[derive(Debug, Default)]
pub struct InventoryCollector {
    collected: Mutex<Collected>,
    losses: AtomicU64,
}

impl InventoryCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take every identifier collected so far, leaving the collector empty.
    pub fn drain(&self) -> Vec<String> {
        let mut collected = self.lock();
        collected.seen.clear();
        std::mem::take(&mut collected.ids)
    }

    /// Number of distinct identifiers currently held.
    pub fn len(&self) -> usize {
        self.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of connection losses observed.
    pub fn losses(&self) -> u64 {
        self.losses.load(Ordering::Relaxed)
    }
}

impl ConnectorOwner for InventoryCollector {
    fn message_received(&self, line: &str) {
        let id = line.trim();
        if id.is_empty() {
            return;
        }

        let mut collected = self.lock();
        if collected.seen.insert(id.to_string()) {
            trace!(id, "Tag collected");
            collected.ids.push(id.to_string());
        }
    }

    fn connection_lost(&self) {
        self.losses.fetch_add(1, Ordering::Relaxed);

        let mut collected = self.lock();
        debug!(
            discarded = collected.ids.len(),
            "Connection lost, discarding collected inventory"
        );
        collected.ids.clear();
        collected.seen.clear();
    }
}
