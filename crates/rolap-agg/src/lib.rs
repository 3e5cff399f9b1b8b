//! Relational aggregation core of an OLAP engine.
//!
//! A coordinate (a measure followed by one member per hierarchy) is translated into a
//! [`CellRequest`] against a [`RolapStar`]: the star's join tree grows the tables the
//! coordinate needs, and each constrained column gets a stable bit position so that the set
//! of constrained columns is a [`rolap_schema::BitKey`]. Requests are answered from a
//! statement-local cache, then from a shared cache; a miss tells the caller to run SQL and
//! [`RolapStar::register`] the resulting [`Segment`].
//!
//! Sets of tuples (aggregation lists) become [`CompoundPredicate`]s, grouped by the columns
//! each tuple constrains.

#![forbid(unsafe_code)]

mod agg_star;
mod cache;
mod compound;
mod config;
mod error;
mod measure_group;
mod olap;
mod predicate;
mod registry;
mod request;
mod segment;
mod star;
mod statement;
mod value;

pub use crate::agg_star::AggStar;
pub use crate::cache::{
    LocalSegmentCache, MemorySegmentCache, PinSet, SegmentCacheStats, SharedSegmentCache,
};
pub use crate::compound::{CompoundGroup, CompoundPredicate, InListPredicate};
pub use crate::config::{AggConfig, SegmentCacheConfig, UnrelatedDimensionPolicy};
pub use crate::error::{AggError, AggResult};
pub use crate::measure_group::{DimensionLink, MeasureGroup};
pub use crate::olap::{
    ColumnRef, Cube, Dimension, Hierarchy, Level, LevelSpec, Member, MemberKind,
};
pub use crate::predicate::{PredicateColumn, StarPredicate};
pub use crate::registry::StarRegistry;
pub use crate::request::{CellRequest, CellRequestBuilder, CompoundConstraint};
pub use crate::segment::{Aggregation, AggregationKey, Segment, SegmentAxis, SegmentBuilder, SegmentId};
pub use crate::star::{
    Aggregator, ColumnExpr, ColumnRole, RolapStar, StarColumn, StarTable, TableId,
};
pub use crate::statement::CellReader;
pub use crate::value::Value;
