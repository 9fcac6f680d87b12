//! Delivery counters

use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Snapshot of what a registry has done since it was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Subscriptions currently registered
    pub subscriptions: usize,
    /// Calls to `fire`, delivered or not
    pub fires: u64,
    /// Individual handler invocations
    pub deliveries: u64,
    /// Fires absorbed into the pending payload of a buffered section
    pub coalesced: u64,
    /// Fires dropped because nobody was subscribed
    pub discarded: u64,
    /// Pending payloads delivered to at least one subscriber when a buffered
    /// section closed
    pub flushes: u64,
}

/// Live counters kept by the registry
#[derive(Debug)]
pub(crate) struct Counters {
    enabled: bool,
    fires: Cell<u64>,
    deliveries: Cell<u64>,
    coalesced: Cell<u64>,
    discarded: Cell<u64>,
    flushes: Cell<u64>,
}

impl Counters {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fires: Cell::new(0),
            deliveries: Cell::new(0),
            coalesced: Cell::new(0),
            discarded: Cell::new(0),
            flushes: Cell::new(0),
        }
    }

    pub(crate) fn fire(&self) {
        self.bump(&self.fires);
    }

    pub(crate) fn delivery(&self) {
        self.bump(&self.deliveries);
    }

    pub(crate) fn coalesce(&self) {
        self.bump(&self.coalesced);
    }

    pub(crate) fn discard(&self) {
        self.bump(&self.discarded);
    }

    pub(crate) fn flush(&self) {
        self.bump(&self.flushes);
    }

    pub(crate) fn snapshot(&self, subscriptions: usize) -> RegistryStats {
        RegistryStats {
            subscriptions,
            fires: self.fires.get(),
            deliveries: self.deliveries.get(),
            coalesced: self.coalesced.get(),
            discarded: self.discarded.get(),
            flushes: self.flushes.get(),
        }
    }

    fn bump(&self, counter: &Cell<u64>) {
        if self.enabled {
            counter.set(counter.get().saturating_add(1));
        }
    }
}
