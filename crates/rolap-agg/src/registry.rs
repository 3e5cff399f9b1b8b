use crate::cache::{MemorySegmentCache, SharedSegmentCache};
use crate::config::AggConfig;
use crate::error::AggResult;
use crate::star::RolapStar;
use dashmap::DashMap;
use rolap_schema::{NoStatistics, PhysSchemaGraph, RelationId, StatisticsProvider};
use std::sync::Arc;

/// One [`RolapStar`] per fact relation of a schema, created on first use.
///
/// All stars share the registry's configuration, statistics and shared segment cache.
pub struct StarRegistry {
    graph: Arc<PhysSchemaGraph>,
    config: Arc<AggConfig>,
    stats: Arc<dyn StatisticsProvider>,
    shared_cache: Arc<dyn SharedSegmentCache>,
    stars: DashMap<RelationId, Arc<RolapStar>>,
}

impl StarRegistry {
    pub fn new(graph: Arc<PhysSchemaGraph>, config: AggConfig) -> Self {
        let config = Arc::new(config.normalized());
        let shared_cache: Arc<dyn SharedSegmentCache> =
            Arc::new(MemorySegmentCache::new(config.segment_cache.clone()));
        Self {
            graph,
            config,
            stats: Arc::new(NoStatistics),
            shared_cache,
            stars: DashMap::new(),
        }
    }

    pub fn with_statistics(mut self, stats: Arc<dyn StatisticsProvider>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_shared_cache(mut self, cache: Arc<dyn SharedSegmentCache>) -> Self {
        self.shared_cache = cache;
        self
    }

    pub fn graph(&self) -> &Arc<PhysSchemaGraph> {
        &self.graph
    }

    pub fn config(&self) -> &Arc<AggConfig> {
        &self.config
    }

    pub fn shared_cache(&self) -> &Arc<dyn SharedSegmentCache> {
        &self.shared_cache
    }

    /// The star rooted at the relation aliased `fact`. Concurrent callers get the same star.
    pub fn get_or_create(&self, fact: &str) -> AggResult<Arc<RolapStar>> {
        let id = self.graph.schema().lookup(fact)?;
        let star = self
            .stars
            .entry(id)
            .or_insert_with(|| {
                log::debug!("creating star for fact table {fact}");
                Arc::new(
                    RolapStar::new(self.graph.clone(), id, self.config.clone())
                        .with_statistics(self.stats.clone())
                        .with_shared_cache(self.shared_cache.clone()),
                )
            })
            .value()
            .clone();
        Ok(star)
    }

    pub fn get(&self, fact: &str) -> Option<Arc<RolapStar>> {
        let id = self.graph.schema().relation_id(fact)?;
        self.stars.get(&id).map(|star| Arc::clone(star.value()))
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }
}
