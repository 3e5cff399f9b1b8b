use crate::star::StarColumn;
use rolap_schema::BitKey;

/// A pre-aggregated summary table, described by the star columns it can answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggStar {
    name: String,
    row_count: u64,
    row_width: u64,
    level_bitkey: BitKey,
    measure_bitkey: BitKey,
    distinct_measure_bitkey: BitKey,
}

impl AggStar {
    pub fn new(name: impl Into<String>, row_count: u64, row_width: u64) -> Self {
        Self {
            name: name.into(),
            row_count,
            row_width,
            level_bitkey: BitKey::new(),
            measure_bitkey: BitKey::new(),
            distinct_measure_bitkey: BitKey::new(),
        }
    }

    /// The table carries the level column `column` (at the same or finer grain).
    pub fn with_level(mut self, column: &StarColumn) -> Self {
        self.level_bitkey.set(column.bit_position());
        self
    }

    pub fn with_measure(mut self, column: &StarColumn) -> Self {
        self.measure_bitkey.set(column.bit_position());
        if column.aggregator().is_some_and(|a| a.is_distinct()) {
            self.distinct_measure_bitkey.set(column.bit_position());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn level_bitkey(&self) -> &BitKey {
        &self.level_bitkey
    }

    pub fn measure_bitkey(&self) -> &BitKey {
        &self.measure_bitkey
    }

    pub fn cost(&self, by_volume: bool) -> u64 {
        if by_volume {
            self.row_count.saturating_mul(self.row_width)
        } else {
            self.row_count
        }
    }

    /// Whether a query grouping by `levels` and reading `measures` can be answered from this
    /// table. Distinct-count measures cannot be rolled up, so they need the exact level set.
    pub fn covers(&self, levels: &BitKey, measures: &BitKey) -> bool {
        if !self.level_bitkey.is_superset_of(levels) || !self.measure_bitkey.is_superset_of(measures)
        {
            return false;
        }
        if measures.intersects(&self.distinct_measure_bitkey) {
            return &self.level_bitkey == levels;
        }
        true
    }
}
