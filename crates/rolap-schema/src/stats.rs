use crate::relation::PhysRelation;
use std::collections::HashMap;

/// Row-count and cardinality estimates, typically backed by database statistics.
///
/// Implementations should be cheap to call repeatedly or cache internally; callers treat them
/// as pure functions.
pub trait StatisticsProvider: Send + Sync {
    fn relation_row_count(&self, relation: &PhysRelation) -> Option<u64>;

    fn column_cardinality(&self, relation: &PhysRelation, column: &str) -> Option<u64>;
}

/// A provider that knows nothing; costs fall back to declared row counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStatistics;

impl StatisticsProvider for NoStatistics {
    fn relation_row_count(&self, _relation: &PhysRelation) -> Option<u64> {
        None
    }

    fn column_cardinality(&self, _relation: &PhysRelation, _column: &str) -> Option<u64> {
        None
    }
}

/// Fixed estimates keyed by relation alias.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStatistics {
    row_counts: HashMap<String, u64>,
    cardinalities: HashMap<(String, String), u64>,
}

impl InMemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_count(mut self, relation: impl Into<String>, rows: u64) -> Self {
        self.row_counts.insert(relation.into(), rows);
        self
    }

    pub fn with_cardinality(
        mut self,
        relation: impl Into<String>,
        column: impl Into<String>,
        cardinality: u64,
    ) -> Self {
        self.cardinalities
            .insert((relation.into(), column.into()), cardinality);
        self
    }
}

impl StatisticsProvider for InMemoryStatistics {
    fn relation_row_count(&self, relation: &PhysRelation) -> Option<u64> {
        self.row_counts.get(relation.alias()).copied()
    }

    fn column_cardinality(&self, relation: &PhysRelation, column: &str) -> Option<u64> {
        self.cardinalities
            .get(&(relation.alias().to_string(), column.to_string()))
            .copied()
    }
}
