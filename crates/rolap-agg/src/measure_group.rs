use crate::error::{AggError, AggResult};
use crate::olap::{ColumnRef, Level};
use crate::star::{Aggregator, ColumnExpr, RolapStar, StarColumn};
use dashmap::DashMap;
use rolap_schema::PhysPath;
use std::collections::HashMap;
use std::sync::Arc;

/// How a dimension joins to the fact table of a measure group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DimensionLink {
    /// Join along this path, which starts at the fact table. Needed when the dimension table
    /// is reachable more than once (e.g. order date and ship date).
    Explicit(PhysPath),
    /// Join along the unique foreign-key path from the fact table.
    Inferred,
}

/// The measures a cube reads from one star, and the dimensions that link to it.
#[derive(Debug)]
pub struct MeasureGroup {
    name: String,
    cube: String,
    star: Arc<RolapStar>,
    measures: HashMap<String, Arc<StarColumn>>,
    dimension_links: HashMap<usize, DimensionLink>,
    resolved: DashMap<(usize, ColumnRef), Arc<StarColumn>>,
}

impl MeasureGroup {
    pub fn new(name: impl Into<String>, cube: impl Into<String>, star: Arc<RolapStar>) -> Self {
        Self {
            name: name.into(),
            cube: cube.into(),
            star,
            measures: HashMap::new(),
            dimension_links: HashMap::new(),
            resolved: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cube(&self) -> &str {
        &self.cube
    }

    pub fn star(&self) -> &Arc<RolapStar> {
        &self.star
    }

    /// Add a measure over a fact column; `None` counts rows.
    pub fn add_measure(
        &mut self,
        name: impl Into<String>,
        aggregator: Aggregator,
        column: Option<&str>,
    ) -> AggResult<Arc<StarColumn>> {
        let name = name.into();
        if self.measures.contains_key(&name) {
            return Err(AggError::DuplicateMeasure {
                cube: self.cube.clone(),
                measure: name,
            });
        }
        let expr = match column {
            Some(column) => ColumnExpr::Column(column.to_string()),
            None => ColumnExpr::Star,
        };
        let column = self
            .star
            .register_measure(&self.cube, &name, aggregator, expr)?;
        self.measures.insert(name, column.clone());
        Ok(column)
    }

    pub fn measure(&self, name: &str) -> Option<&Arc<StarColumn>> {
        self.measures.get(name)
    }

    pub fn link_dimension(&mut self, dimension: usize, link: DimensionLink) -> AggResult<()> {
        if let DimensionLink::Explicit(path) = &link {
            path.validate(self.star.graph().schema())?;
            if path.first() != self.star.fact() {
                return Err(AggError::Internal(format!(
                    "dimension link {} does not start at fact table {}",
                    path.describe(self.star.graph().schema()),
                    self.star.name()
                )));
            }
        }
        self.dimension_links.insert(dimension, link);
        Ok(())
    }

    pub fn is_linked(&self, dimension: usize) -> bool {
        self.dimension_links.contains_key(&dimension)
    }

    /// The star column holding `column` of `level`, joining tables into the star as needed.
    ///
    /// Returns `Ok(None)` when the level's dimension does not link to this group. A linked
    /// dimension whose column cannot be reached, or is reachable along several paths, is a
    /// schema error.
    pub fn resolve_column(
        &self,
        level: &Level,
        column: &ColumnRef,
    ) -> AggResult<Option<Arc<StarColumn>>> {
        let Some(link) = self.dimension_links.get(&level.dimension()) else {
            return Ok(None);
        };
        let cache_key = (level.dimension(), column.clone());
        if let Some(found) = self.resolved.get(&cache_key) {
            return Ok(Some(Arc::clone(found.value())));
        }

        let graph = self.star.graph();
        let target = graph.schema().lookup(&column.relation)?;
        let path = match link {
            DimensionLink::Explicit(head) => {
                let tail = graph.find_path(head.last(), &[target], true)?;
                head.concat(&tail)?
            }
            DimensionLink::Inferred => graph.find_path(self.star.fact(), &[target], true)?,
        };
        let table = self.star.get_table(&path)?;
        let expr = ColumnExpr::Column(column.column.clone());
        let Some(star_column) = self.star.lookup_column_by_expression(table.id(), &expr, true)?
        else {
            return Err(AggError::Internal(format!("column {column} was not created")));
        };
        let star_column = self
            .resolved
            .entry(cache_key)
            .or_insert(star_column)
            .value()
            .clone();
        Ok(Some(star_column))
    }

    /// The star columns of `level`'s key, or `None` when the dimension is unrelated.
    pub fn resolve_key(&self, level: &Level) -> AggResult<Option<Vec<Arc<StarColumn>>>> {
        let mut columns = Vec::with_capacity(level.key().len());
        for column in level.key() {
            match self.resolve_column(level, column)? {
                Some(c) => columns.push(c),
                None => return Ok(None),
            }
        }
        Ok(Some(columns))
    }
}
