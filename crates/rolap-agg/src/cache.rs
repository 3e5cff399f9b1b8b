//! The two cache tiers and query pinning.
//!
//! - [`LocalSegmentCache`] belongs to one statement and is used without locking.
//! - [`SharedSegmentCache`] is the tier shared by all statements; [`MemorySegmentCache`] is
//!   the in-process implementation, an LRU bounded by segment and cell counts.
//! - [`PinSet`] keeps the segments one query has read alive and unevictable until the query
//!   ends.
use crate::config::SegmentCacheConfig;
use crate::request::CellRequest;
use crate::segment::{Aggregation, AggregationKey, Segment, SegmentId};
use lru::LruCache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The cache tier shared across statements. Implementations must be safe to call from many
/// threads at once.
pub trait SharedSegmentCache: Send + Sync {
    /// A segment containing the requested cell, if one is cached.
    fn peek(&self, request: &CellRequest) -> Option<Arc<Segment>>;

    fn put(&self, segment: Arc<Segment>);
}

/// Per-statement aggregations, keyed by [`AggregationKey`].
#[derive(Debug, Default)]
pub struct LocalSegmentCache {
    aggregations: HashMap<AggregationKey, Aggregation>,
}

impl LocalSegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_or_create_aggregation(&mut self, key: AggregationKey) -> &mut Aggregation {
        self.aggregations
            .entry(key.clone())
            .or_insert_with(|| Aggregation::new(key))
    }

    pub fn find(&mut self, key: &AggregationKey, request: &CellRequest) -> Option<Arc<Segment>> {
        self.aggregations.get_mut(key)?.find(request)
    }

    pub fn aggregation_count(&self) -> usize {
        self.aggregations.len()
    }

    pub fn clear(&mut self) {
        self.aggregations.clear();
    }
}

/// Segments pinned for the duration of one query. Dropping the set unpins them.
#[derive(Debug, Default)]
pub struct PinSet {
    segments: HashMap<SegmentId, Arc<Segment>>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `segment`; returns `false` if it was already in the set.
    pub fn add(&mut self, segment: &Arc<Segment>) -> bool {
        if self.segments.contains_key(&segment.id()) {
            return false;
        }
        segment.pin();
        self.segments.insert(segment.id(), segment.clone());
        true
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, segment) in self.segments.drain() {
            segment.unpin();
        }
    }
}

impl Drop for PinSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub segments_registered: u64,
    pub segments_evicted: u64,
}

type SegmentSlot = (AggregationKey, usize);

struct Inner {
    lru: LruCache<SegmentId, Arc<Segment>>,
    by_key: HashMap<SegmentSlot, Vec<SegmentId>>,
    cells: usize,
    stats: SegmentCacheStats,
}

impl Inner {
    fn remove(&mut self, id: SegmentId) -> bool {
        let Some(segment) = self.lru.pop(&id) else {
            return false;
        };
        self.cells = self.cells.saturating_sub(segment.cell_count());
        let slot = (segment.key().clone(), segment.measure());
        if let Some(ids) = self.by_key.get_mut(&slot) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_key.remove(&slot);
            }
        }
        self.stats.segments_evicted += 1;
        log::debug!("evicted segment {id} ({} cells)", segment.cell_count());
        true
    }
}

/// In-process shared tier.
///
/// Eviction walks from the least recently used segment and skips pinned ones, so a full cache
/// of pinned segments may temporarily exceed its budget.
pub struct MemorySegmentCache {
    config: SegmentCacheConfig,
    inner: Mutex<Inner>,
}

impl MemorySegmentCache {
    pub fn new(mut config: SegmentCacheConfig) -> Self {
        config.max_segments = config.max_segments.max(1);
        config.max_cells = config.max_cells.max(1);
        Self {
            config,
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                by_key: HashMap::new(),
                cells: 0,
                stats: SegmentCacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &SegmentCacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("segment cache mutex poisoned")
            .lru
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_count(&self) -> usize {
        self.inner
            .lock()
            .expect("segment cache mutex poisoned")
            .cells
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.inner
            .lock()
            .expect("segment cache mutex poisoned")
            .lru
            .contains(&id)
    }

    pub fn stats(&self) -> SegmentCacheStats {
        self.inner
            .lock()
            .expect("segment cache mutex poisoned")
            .stats
    }

    /// Drop every unpinned segment, as a reclaimer under memory pressure would. Returns the
    /// number of segments dropped.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().expect("segment cache mutex poisoned");
        let victims: Vec<SegmentId> = inner
            .lru
            .iter()
            .filter(|(_, segment)| !segment.is_pinned())
            .map(|(id, _)| *id)
            .collect();
        let mut evicted = 0;
        for id in victims {
            if inner.remove(id) {
                evicted += 1;
            }
        }
        evicted
    }

    fn evict_over_budget(&self, inner: &mut Inner, keep: SegmentId) {
        while inner.lru.len() > self.config.max_segments || inner.cells > self.config.max_cells {
            let victim = inner
                .lru
                .iter()
                .rev()
                .find(|(id, segment)| **id != keep && !segment.is_pinned())
                .map(|(id, _)| *id);
            let Some(victim) = victim else {
                break;
            };
            inner.remove(victim);
        }
    }
}

impl SharedSegmentCache for MemorySegmentCache {
    fn peek(&self, request: &CellRequest) -> Option<Arc<Segment>> {
        let mut guard = self.inner.lock().expect("segment cache mutex poisoned");
        let inner = &mut *guard;
        let slot = (request.aggregation_key(), request.measure().bit_position());

        let mut found = None;
        if let Some(ids) = inner.by_key.get(&slot) {
            for id in ids {
                if let Some(segment) = inner.lru.get(id) {
                    if segment.contains(request) {
                        found = Some(segment.clone());
                        break;
                    }
                }
            }
        }

        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
            log::trace!("shared segment cache miss for {}", request.star_name());
        }
        found
    }

    fn put(&self, segment: Arc<Segment>) {
        let mut guard = self.inner.lock().expect("segment cache mutex poisoned");
        let inner = &mut *guard;
        let id = segment.id();
        if inner.lru.get(&id).is_some() {
            return;
        }
        inner.cells += segment.cell_count();
        inner
            .by_key
            .entry((segment.key().clone(), segment.measure()))
            .or_default()
            .push(id);
        inner.lru.put(id, segment);
        inner.stats.segments_registered += 1;
        self.evict_over_budget(inner, id);
    }
}
