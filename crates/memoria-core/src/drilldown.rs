//! DrilldownRegistry — ephemeral numeric ids issued for camera-roll search results.
//!
//! A single instance is owned by the server and threaded through to whatever needs it (the
//! "global-singletons-keyed-by-project" redesign note forbids a bare `static`). Ids never
//! survive a process restart.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;

use crate::memory::{DrilldownEntry, DrilldownKind};

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_MAX_AGE_SECS: i64 = 3_600;

#[derive(Debug, Clone, Copy, Default)]
pub struct DrilldownStats {
    pub len: usize,
    pub capacity: usize,
    pub next_id: u64,
}

struct Inner {
    entries: LruCache<u64, DrilldownEntry>,
    next_id: u64,
    max_age: Duration,
}

pub struct DrilldownRegistry {
    inner: Mutex<Inner>,
}

impl DrilldownRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_MAX_AGE_SECS)
    }

    pub fn with_capacity(capacity: usize, max_age_secs: i64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                next_id: 1,
                max_age: Duration::seconds(max_age_secs),
            }),
        }
    }

    /// Register a memory for drilldown and return its freshly issued id.
    pub fn register(&self, memory_id: impl Into<String>, kind: DrilldownKind) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.put(
            id,
            DrilldownEntry {
                memory_id: memory_id.into(),
                kind,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Resolve a drilldown id, purging it (and any other now-stale entries) if it has aged out.
    pub fn resolve(&self, id: u64) -> Option<DrilldownEntry> {
        let mut inner = self.inner.lock().unwrap();
        purge_expired(&mut inner);
        inner.entries.get(&id).cloned()
    }

    pub fn stats(&self) -> DrilldownStats {
        let inner = self.inner.lock().unwrap();
        DrilldownStats {
            len: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            next_id: inner.next_id,
        }
    }
}

impl Default for DrilldownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn purge_expired(inner: &mut Inner) {
    let cutoff: DateTime<Utc> = Utc::now() - inner.max_age;
    let expired: Vec<u64> = inner
        .entries
        .iter()
        .filter(|(_, entry)| entry.created_at < cutoff)
        .map(|(id, _)| *id)
        .collect();
    for id in expired {
        inner.entries.pop(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_round_trips() {
        let registry = DrilldownRegistry::new();
        let id = registry.register("mem-1", DrilldownKind::Memory);
        let entry = registry.resolve(id).unwrap();
        assert_eq!(entry.memory_id, "mem-1");
        assert_eq!(entry.kind, DrilldownKind::Memory);
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let registry = DrilldownRegistry::new();
        assert!(registry.resolve(999).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let registry = DrilldownRegistry::with_capacity(2, DEFAULT_MAX_AGE_SECS);
        let a = registry.register("a", DrilldownKind::Memory);
        let _b = registry.register("b", DrilldownKind::Memory);
        let _c = registry.register("c", DrilldownKind::Memory);
        assert!(registry.resolve(a).is_none());
    }

    #[test]
    fn age_based_purge_removes_stale_entries() {
        let registry = DrilldownRegistry::with_capacity(100, -1);
        let id = registry.register("old", DrilldownKind::Memory);
        assert!(registry.resolve(id).is_none());
    }
}
