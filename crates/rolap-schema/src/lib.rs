//! Physical schema model for the ROLAP aggregation core.
//!
//! This crate focuses on:
//! - [`BitKey`]: a value-semantics bitset with one bit per star column.
//! - The physical schema: relations, their keys and the foreign-key links between them
//!   ([`PhysSchema`]).
//! - Join-path resolution over that schema ([`PhysSchemaGraph::find_path`]), which must be
//!   unique for directed (hierarchy-to-fact) searches.
//! - The statistics seam ([`StatisticsProvider`]) used for cost ranking.

#![forbid(unsafe_code)]

mod bitkey;
mod error;
mod graph;
mod path;
mod relation;
mod schema;
mod stats;

pub use crate::bitkey::{BitKey, BitKeyIter};
pub use crate::error::{PhysSchemaError, SchemaResult};
pub use crate::graph::PhysSchemaGraph;
pub use crate::path::{PhysHop, PhysPath};
pub use crate::relation::{
    DataType, KeyId, LinkId, PhysColumn, PhysColumnKind, PhysKey, PhysRelation, RelationId,
    RelationKind,
};
pub use crate::schema::{PhysLink, PhysSchema};
pub use crate::stats::{InMemoryStatistics, NoStatistics, StatisticsProvider};
