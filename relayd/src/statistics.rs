use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single counter update.
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedPkts(u64),
    ResponsePkts(u64),
    RelayedPkts(u64),
    DroppedPkts(u64),
    ErrorPkts(u64),
}

#[derive(Debug, Default)]
struct Counts {
    received_pkts: AtomicU64,
    response_pkts: AtomicU64,
    relayed_pkts: AtomicU64,
    dropped_pkts: AtomicU64,
    error_pkts: AtomicU64,
}

/// Relay traffic counters.
///
/// cheap to clone; all clones share the same counters.
#[derive(Debug, Default, Clone)]
pub struct Statistics(Arc<Counts>);

impl Statistics {
    pub fn send(&self, payload: &[Stats]) {
        for stats in payload {
            match stats {
                Stats::ReceivedPkts(v) => self.0.received_pkts.fetch_add(*v, Ordering::Relaxed),
                Stats::ResponsePkts(v) => self.0.response_pkts.fetch_add(*v, Ordering::Relaxed),
                Stats::RelayedPkts(v) => self.0.relayed_pkts.fetch_add(*v, Ordering::Relaxed),
                Stats::DroppedPkts(v) => self.0.dropped_pkts.fetch_add(*v, Ordering::Relaxed),
                Stats::ErrorPkts(v) => self.0.error_pkts.fetch_add(*v, Ordering::Relaxed),
            };
        }
    }

    pub fn received_pkts(&self) -> u64 {
        self.0.received_pkts.load(Ordering::Relaxed)
    }

    pub fn response_pkts(&self) -> u64 {
        self.0.response_pkts.load(Ordering::Relaxed)
    }

    pub fn relayed_pkts(&self) -> u64 {
        self.0.relayed_pkts.load(Ordering::Relaxed)
    }

    pub fn dropped_pkts(&self) -> u64 {
        self.0.dropped_pkts.load(Ordering::Relaxed)
    }

    pub fn error_pkts(&self) -> u64 {
        self.0.error_pkts.load(Ordering::Relaxed)
    }
}
