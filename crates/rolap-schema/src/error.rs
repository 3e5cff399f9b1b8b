pub type SchemaResult<T> = Result<T, PhysSchemaError>;

/// Structural errors in a physical schema.
///
/// These are configuration errors: they are raised while the schema is loaded or while a
/// join path is resolved, and are never retried.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PhysSchemaError {
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    #[error("duplicate relation alias: {alias}")]
    DuplicateAlias { alias: String },

    #[error("unknown column {relation}.{column}")]
    UnknownColumn { relation: String, column: String },

    #[error("duplicate column {relation}.{column}")]
    DuplicateColumn { relation: String, column: String },

    #[error("unknown key {relation}.{key}")]
    UnknownKey { relation: String, key: String },

    #[error("duplicate key {relation}.{key}")]
    DuplicateKey { relation: String, key: String },

    #[error(
        "link from {from} to key {relation}.{key} has {actual} columns, but the key has {expected}"
    )]
    LinkArityMismatch {
        from: String,
        relation: String,
        key: String,
        expected: usize,
        actual: usize,
    },

    /// `count` is the number of paths seen before the search gave up, not a full census.
    #[error("ambiguous schema: at least {count} join paths from {from} to {to}")]
    AmbiguousPath {
        from: String,
        to: String,
        count: usize,
    },

    #[error("no join path from {from} to any of [{targets}]")]
    NoPath { from: String, targets: String },

    #[error("join path search from {from} needs at least one target")]
    EmptyTargets { from: String },

    #[error("malformed join path: {0}")]
    InvalidPath(String),
}
