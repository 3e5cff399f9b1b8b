use rolap_schema::PhysSchemaError;

pub type AggResult<T> = Result<T, AggError>;

/// Errors raised while building stars, cubes and cell requests.
///
/// Unsatisfiable coordinates and cache misses are not errors; they are reported as `None`.
#[derive(Debug, thiserror::Error)]
pub enum AggError {
    #[error(transparent)]
    Schema(#[from] PhysSchemaError),

    #[error("unknown measure {cube}.{measure}")]
    UnknownMeasure { cube: String, measure: String },

    #[error("duplicate measure {cube}.{measure}")]
    DuplicateMeasure { cube: String, measure: String },

    #[error("unknown level: {0}")]
    UnknownLevel(String),

    #[error("duplicate hierarchy: {0}")]
    DuplicateHierarchy(String),

    #[error("duplicate level: {0}")]
    DuplicateLevel(String),

    /// A drill-through projection named something the cube does not have.
    #[error("drill-through projection references unknown level {name}")]
    UnknownProjection { name: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// An inconsistent member/level/measure combination; indicates a bug in the caller.
    #[error("internal error: {0}")]
    Internal(String),
}
