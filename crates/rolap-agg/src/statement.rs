use crate::cache::{LocalSegmentCache, PinSet};
use crate::request::CellRequest;
use crate::segment::Segment;
use crate::star::RolapStar;
use crate::value::Value;
use std::sync::Arc;

/// Cache access for one statement (one query) against one star.
///
/// Every segment the statement reads or registers stays pinned until the reader is dropped,
/// so the statement sees a consistent set of segments from start to end.
#[derive(Debug)]
pub struct CellReader {
    star: Arc<RolapStar>,
    local: LocalSegmentCache,
    pins: PinSet,
    hits: u64,
    misses: u64,
}

impl CellReader {
    pub fn new(star: Arc<RolapStar>) -> Self {
        Self {
            star,
            local: LocalSegmentCache::new(),
            pins: PinSet::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn star(&self) -> &Arc<RolapStar> {
        &self.star
    }

    /// Look a cell up and pin the segment that answers it.
    pub fn get(&mut self, request: &CellRequest) -> Option<Value> {
        let value = self
            .star
            .get_cell_from_cache(request, &mut self.local, Some(&mut self.pins));
        self.count(value.is_some());
        value
    }

    /// Look a cell up without pinning.
    pub fn peek(&mut self, request: &CellRequest) -> Option<Value> {
        let value = self.star.get_cell_from_cache(request, &mut self.local, None);
        self.count(value.is_some());
        value
    }

    /// Register a segment this statement computed; it is pinned like one that was read.
    pub fn register(&mut self, segment: Arc<Segment>) {
        self.pins.add(&segment);
        self.star.register(segment, &mut self.local);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits
    }

    pub fn miss_count(&self) -> u64 {
        self.misses
    }

    pub fn pins(&self) -> &PinSet {
        &self.pins
    }

    fn count(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}
