//! Per-metric run leases
//!
//! At most one run may analyze a metric at a time. A lease is taken before
//! the metric's work is scheduled and released when its guard drops, which
//! also covers panics and timeouts inside the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::MetricId;

#[derive(Debug, Clone, Copy)]
struct LeaseHolder {
    token: u64,
    acquired_at: Instant,
}

/// Registry of metrics currently being analyzed
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    held: Arc<DashMap<MetricId, LeaseHolder>>,
    next_token: Arc<AtomicU64>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `metric_id`, or `None` if another run holds it
    pub fn try_acquire(&self, metric_id: MetricId) -> Option<LeaseGuard> {
        match self.held.entry(metric_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(LeaseHolder {
                    token,
                    acquired_at: Instant::now(),
                });
                Some(LeaseGuard {
                    held: Arc::clone(&self.held),
                    metric_id,
                    token,
                })
            }
        }
    }

    pub fn is_held(&self, metric_id: MetricId) -> bool {
        self.held.contains_key(&metric_id)
    }

    /// How long the current holder has had the lease
    pub fn held_for(&self, metric_id: MetricId) -> Option<std::time::Duration> {
        self.held
            .get(&metric_id)
            .map(|holder| holder.acquired_at.elapsed())
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

/// Releases the lease on drop
#[derive(Debug)]
pub struct LeaseGuard {
    held: Arc<DashMap<MetricId, LeaseHolder>>,
    metric_id: MetricId,
    token: u64,
}

impl LeaseGuard {
    pub fn metric_id(&self) -> MetricId {
        self.metric_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let token = self.token;
        self.held
            .remove_if(&self.metric_id, |_, holder| holder.token == token);
    }
}
