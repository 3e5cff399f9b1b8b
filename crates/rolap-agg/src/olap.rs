//! The multidimensional side of a request: cubes, dimensions, hierarchies, levels and the
//! members that make up a coordinate.
//!
//! Only what request building needs is modelled here. Member storage and expression
//! evaluation live elsewhere; a [`Member`] is just a reference to a level plus its key.
use crate::error::{AggError, AggResult};
use crate::measure_group::MeasureGroup;
use crate::star::StarColumn;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A column of a physical relation, named by relation alias.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub relation: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(relation: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.relation, self.column)
    }
}

/// Declaration of one level of a hierarchy, used with [`Cube::add_hierarchy`].
#[derive(Clone, Debug)]
pub struct LevelSpec {
    name: String,
    key: Vec<ColumnRef>,
    name_column: Option<ColumnRef>,
}

impl LevelSpec {
    pub fn new(name: impl Into<String>, key: Vec<ColumnRef>) -> Self {
        Self {
            name: name.into(),
            key,
            name_column: None,
        }
    }

    pub fn with_name_column(mut self, column: ColumnRef) -> Self {
        self.name_column = Some(column);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    unique_name: String,
    name: String,
    dimension: usize,
    hierarchy: String,
    hierarchy_ordinal: usize,
    depth: usize,
    key: Vec<ColumnRef>,
    name_column: Option<ColumnRef>,
}

impl Level {
    /// `[Hierarchy].[Level]`.
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordinal of the owning dimension within its cube.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn hierarchy(&self) -> &str {
        &self.hierarchy
    }

    /// Position of the owning hierarchy within its dimension, in declaration order.
    pub fn hierarchy_ordinal(&self) -> usize {
        self.hierarchy_ordinal
    }

    /// 0 for the `(All)` level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn key(&self) -> &[ColumnRef] {
        &self.key
    }

    pub fn name_column(&self) -> Option<&ColumnRef> {
        self.name_column.as_ref()
    }

    pub fn is_all(&self) -> bool {
        self.key.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Hierarchy {
    name: String,
    dimension: usize,
    levels: Vec<Arc<Level>>,
}

impl Hierarchy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Levels ordered by depth, starting with `(All)`.
    pub fn levels(&self) -> &[Arc<Level>] {
        &self.levels
    }

    pub fn all_level(&self) -> &Arc<Level> {
        &self.levels[0]
    }

    pub fn level(&self, name: &str) -> Option<&Arc<Level>> {
        self.levels.iter().find(|l| l.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct Dimension {
    name: String,
    ordinal: usize,
    hierarchies: Vec<Arc<Hierarchy>>,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn hierarchies(&self) -> &[Arc<Hierarchy>] {
        &self.hierarchies
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Regular,
    All,
    Null,
    /// A calculated member of a regular hierarchy.
    Calculated,
    StoredMeasure { measure: String },
    CalculatedMeasure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    unique_name: String,
    kind: MemberKind,
    level: Option<Arc<Level>>,
    key: Vec<Value>,
}

impl Member {
    /// A member of `level`; `key` holds one value per key column of the level.
    pub fn regular(level: &Arc<Level>, key: Vec<Value>) -> Self {
        let rendered: Vec<String> = key
            .iter()
            .map(|v| match v {
                Value::Text(s) => s.to_string(),
                other => other.to_string(),
            })
            .collect();
        Self {
            unique_name: format!("{}.&[{}]", level.unique_name, rendered.join("]&[")),
            kind: MemberKind::Regular,
            level: Some(level.clone()),
            key,
        }
    }

    pub fn all(hierarchy: &Hierarchy) -> Self {
        Self {
            unique_name: format!("[{}].[All]", hierarchy.name),
            kind: MemberKind::All,
            level: Some(hierarchy.all_level().clone()),
            key: Vec::new(),
        }
    }

    pub fn null() -> Self {
        Self {
            unique_name: "#null".to_string(),
            kind: MemberKind::Null,
            level: None,
            key: Vec::new(),
        }
    }

    pub fn calculated(unique_name: impl Into<String>, level: Option<&Arc<Level>>) -> Self {
        Self {
            unique_name: unique_name.into(),
            kind: MemberKind::Calculated,
            level: level.cloned(),
            key: Vec::new(),
        }
    }

    pub fn stored_measure(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            unique_name: format!("[Measures].[{name}]"),
            kind: MemberKind::StoredMeasure { measure: name },
            level: None,
            key: Vec::new(),
        }
    }

    pub fn calculated_measure(name: impl Into<String>) -> Self {
        Self {
            unique_name: format!("[Measures].[{}]", name.into()),
            kind: MemberKind::CalculatedMeasure,
            level: None,
            key: Vec::new(),
        }
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    pub fn level(&self) -> Option<&Arc<Level>> {
        self.level.as_ref()
    }

    pub fn key(&self) -> &[Value] {
        &self.key
    }

    pub fn is_measure(&self) -> bool {
        matches!(
            self.kind,
            MemberKind::StoredMeasure { .. } | MemberKind::CalculatedMeasure
        )
    }

    /// Ordinal of the member's dimension, if it belongs to a regular hierarchy.
    pub fn dimension(&self) -> Option<usize> {
        self.level.as_ref().map(|l| l.dimension)
    }
}

/// A cube: its dimensions (ordered; the order fixes drill-through column order) and the
/// measure groups binding its measures to stars.
#[derive(Debug)]
pub struct Cube {
    name: String,
    dimensions: Vec<Dimension>,
    measure_groups: Vec<Arc<MeasureGroup>>,
}

impl Cube {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimensions: Vec::new(),
            measure_groups: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a dimension and return its ordinal.
    pub fn add_dimension(&mut self, name: impl Into<String>) -> usize {
        let ordinal = self.dimensions.len();
        self.dimensions.push(Dimension {
            name: name.into(),
            ordinal,
            hierarchies: Vec::new(),
        });
        ordinal
    }

    /// Add a hierarchy to dimension `dimension`. An `(All)` level is created at depth 0 and
    /// `levels` follow from the top down.
    pub fn add_hierarchy(
        &mut self,
        dimension: usize,
        name: impl Into<String>,
        levels: Vec<LevelSpec>,
    ) -> AggResult<Arc<Hierarchy>> {
        let name = name.into();
        if self.hierarchy(&name).is_some() {
            return Err(AggError::DuplicateHierarchy(name));
        }
        let Some(dim) = self.dimensions.get_mut(dimension) else {
            return Err(AggError::Internal(format!(
                "cube {} has no dimension #{dimension}",
                self.name
            )));
        };

        let hierarchy_ordinal = dim.hierarchies.len();
        let mut built = vec![Arc::new(Level {
            unique_name: format!("[{name}].[(All)]"),
            name: "(All)".to_string(),
            dimension,
            hierarchy: name.clone(),
            hierarchy_ordinal,
            depth: 0,
            key: Vec::new(),
            name_column: None,
        })];
        for (i, spec) in levels.into_iter().enumerate() {
            if spec.key.is_empty() {
                return Err(AggError::Internal(format!(
                    "level [{name}].[{}] has no key columns",
                    spec.name
                )));
            }
            let unique_name = format!("[{name}].[{}]", spec.name);
            if built.iter().any(|level| level.name == spec.name) {
                return Err(AggError::DuplicateLevel(unique_name));
            }
            built.push(Arc::new(Level {
                unique_name,
                name: spec.name,
                dimension,
                hierarchy: name.clone(),
                hierarchy_ordinal,
                depth: i + 1,
                key: spec.key,
                name_column: spec.name_column,
            }));
        }

        let hierarchy = Arc::new(Hierarchy {
            name,
            dimension,
            levels: built,
        });
        dim.hierarchies.push(hierarchy.clone());
        Ok(hierarchy)
    }

    pub fn add_measure_group(&mut self, group: MeasureGroup) -> Arc<MeasureGroup> {
        let group = Arc::new(group);
        self.measure_groups.push(group.clone());
        group
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn measure_groups(&self) -> &[Arc<MeasureGroup>] {
        &self.measure_groups
    }

    pub fn hierarchy(&self, name: &str) -> Option<&Arc<Hierarchy>> {
        self.dimensions
            .iter()
            .flat_map(|d| d.hierarchies.iter())
            .find(|h| h.name == name)
    }

    /// Look a level up by its unique name (`[Hierarchy].[Level]`).
    pub fn level(&self, unique_name: &str) -> Option<&Arc<Level>> {
        self.dimensions
            .iter()
            .flat_map(|d| d.hierarchies.iter())
            .flat_map(|h| h.levels.iter())
            .find(|l| l.unique_name == unique_name)
    }

    /// Levels of `level`'s hierarchy that are strictly deeper than `level`.
    pub fn levels_below(&self, level: &Level) -> Vec<Arc<Level>> {
        self.hierarchy(&level.hierarchy)
            .map(|h| {
                h.levels
                    .iter()
                    .filter(|l| l.depth > level.depth)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The measure group defining `measure`, and the measure's star column.
    pub fn find_measure(&self, measure: &str) -> Option<(Arc<MeasureGroup>, Arc<StarColumn>)> {
        self.measure_groups.iter().find_map(|group| {
            group
                .measure(measure)
                .map(|column| (group.clone(), column.clone()))
        })
    }
}
