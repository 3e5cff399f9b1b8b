use crate::error::AggResult;
use serde::{Deserialize, Serialize};

/// What to do with a coordinate member whose dimension does not link to the measure's fact
/// table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrelatedDimensionPolicy {
    /// The whole request is unsatisfiable and yields no data.
    #[default]
    Unsatisfiable,
    /// The member's constraint is dropped.
    Ignore,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentCacheConfig {
    /// Max number of segments kept by the shared tier (default: 4096).
    pub max_segments: usize,
    /// Max number of cells summed over all segments (default: 4 million).
    pub max_cells: usize,
}

impl Default for SegmentCacheConfig {
    fn default() -> Self {
        Self {
            max_segments: 4096,
            max_cells: 4_000_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggConfig {
    /// Allow aggregate tables to answer requests instead of the fact table.
    pub use_aggregates: bool,
    /// Rank tables by rows x row width instead of rows alone.
    pub choose_aggregate_by_volume: bool,
    pub unrelated_dimensions: UnrelatedDimensionPolicy,
    pub segment_cache: SegmentCacheConfig,
}

impl AggConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> AggResult<Self> {
        let config: AggConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Clamp limits that would make the cache unusable.
    pub fn normalized(mut self) -> Self {
        self.segment_cache.max_segments = self.segment_cache.max_segments.max(1);
        self.segment_cache.max_cells = self.segment_cache.max_cells.max(1);
        self
    }
}
