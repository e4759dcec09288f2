//! # Time-Bounded Verdict Cache
//!
//! Redelivered requests must receive the verdict already sent for them, so
//! validation is idempotent per transaction id.
//!
//! - Entries are valid for a fixed window after the first verdict
//! - Expired entries are garbage-collected on a fixed interval
//! - This bounds memory while covering any realistic redelivery

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Time-bounded cache of verdicts keyed by transaction id.
pub struct VerdictCache {
    /// transaction id -> (verdict, when it was recorded)
    entries: HashMap<String, (bool, Instant)>,
    ttl: Duration,
    last_gc: Instant,
    gc_interval: Duration,
}

impl VerdictCache {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_config(ttl, Self::DEFAULT_GC_INTERVAL)
    }

    #[must_use]
    pub fn with_config(ttl: Duration, gc_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            last_gc: Instant::now(),
            gc_interval,
        }
    }

    /// The cached verdict for `transaction_id`, if still fresh.
    pub fn get(&mut self, transaction_id: &str) -> Option<bool> {
        self.maybe_gc();
        let ttl = self.ttl;
        self.entries
            .get(transaction_id)
            .filter(|(_, at)| at.elapsed() < ttl)
            .map(|(verdict, _)| *verdict)
    }

    /// Remember `verdict`. The first verdict recorded for an id wins until it
    /// expires.
    pub fn insert(&mut self, transaction_id: &str, verdict: bool) -> bool {
        self.maybe_gc();
        let now = Instant::now();
        let ttl = self.ttl;
        let entry = self
            .entries
            .entry(transaction_id.to_string())
            .or_insert((verdict, now));
        if now.duration_since(entry.1) >= ttl {
            *entry = (verdict, now);
        }
        entry.0
    }

    fn maybe_gc(&mut self) {
        if self.last_gc.elapsed() >= self.gc_interval {
            self.garbage_collect();
        }
    }

    /// Drop expired entries.
    pub fn garbage_collect(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, at)| at.elapsed() < ttl);
        self.last_gc = Instant::now();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
