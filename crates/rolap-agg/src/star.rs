//! A star: one fact relation, the tree of relations joined to it, and the bit-positioned
//! columns and measures read from those relations.
//!
//! The join tree is an arena. Tables refer to their parent by [`TableId`] and children are
//! found through a `(parent, relation, link, direction)` map, so structural identity never
//! depends on pointer identity. Tables and columns are created lazily, possibly from several
//! threads at once; creation happens under the layout write lock after a re-check, so two
//! threads asking for the same table or column always get the same one. Nothing is ever
//! removed, which keeps bit positions stable for the life of the star.
use crate::agg_star::AggStar;
use crate::cache::{LocalSegmentCache, MemorySegmentCache, PinSet, SharedSegmentCache};
use crate::config::AggConfig;
use crate::error::{AggError, AggResult};
use crate::request::CellRequest;
use crate::segment::Segment;
use crate::value::Value;
use rolap_schema::{
    BitKey, DataType, LinkId, NoStatistics, PhysHop, PhysPath, PhysSchemaError, PhysSchemaGraph,
    RelationId, StatisticsProvider,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Index of a table in its star's join tree. The fact table is always `TableId(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(usize);

impl TableId {
    pub const FACT: TableId = TableId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregator {
    Sum,
    Count,
    DistinctCount,
    Min,
    Max,
    Avg,
}

impl Aggregator {
    /// The aggregator that combines partial results of `self`, or `None` when partial
    /// results cannot be combined.
    pub fn rollup(self) -> Option<Aggregator> {
        match self {
            Aggregator::Sum | Aggregator::Count => Some(Aggregator::Sum),
            Aggregator::Min => Some(Aggregator::Min),
            Aggregator::Max => Some(Aggregator::Max),
            Aggregator::DistinctCount | Aggregator::Avg => None,
        }
    }

    pub fn is_distinct(self) -> bool {
        matches!(self, Aggregator::DistinctCount)
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Sum => "sum",
            Aggregator::Count => "count",
            Aggregator::DistinctCount => "distinct-count",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::Avg => "avg",
        }
    }
}

/// What a star column reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColumnExpr {
    Column(String),
    /// `*`, the argument of a row count.
    Star,
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnExpr::Column(name) => f.write_str(name),
            ColumnExpr::Star => f.write_str("*"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnRole {
    Level,
    Measure {
        cube: String,
        name: String,
        aggregator: Aggregator,
    },
}

#[derive(Debug)]
pub struct StarColumn {
    bit_position: usize,
    table: TableId,
    relation: RelationId,
    table_alias: String,
    expr: ColumnExpr,
    datatype: DataType,
    calculated: bool,
    role: ColumnRole,
    cardinality: OnceLock<Option<u64>>,
}

impl StarColumn {
    pub fn bit_position(&self) -> usize {
        self.bit_position
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn expr(&self) -> &ColumnExpr {
        &self.expr
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn is_calculated(&self) -> bool {
        self.calculated
    }

    pub fn role(&self) -> &ColumnRole {
        &self.role
    }

    pub fn aggregator(&self) -> Option<Aggregator> {
        match &self.role {
            ColumnRole::Measure { aggregator, .. } => Some(*aggregator),
            ColumnRole::Level => None,
        }
    }

    pub fn is_measure(&self) -> bool {
        matches!(self.role, ColumnRole::Measure { .. })
    }

    /// `alias.column`, the name predicates and logs refer to the column by.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table_alias, self.expr)
    }
}

impl fmt::Display for StarColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            ColumnRole::Level => f.write_str(&self.qualified_name()),
            ColumnRole::Measure {
                name, aggregator, ..
            } => write!(
                f,
                "{}({}.{}) as {}",
                aggregator.name(),
                self.table_alias,
                self.expr,
                name
            ),
        }
    }
}

/// One node of the join tree.
#[derive(Debug)]
pub struct StarTable {
    id: TableId,
    relation: RelationId,
    alias: String,
    parent: Option<TableId>,
    path: PhysPath,
}

impl StarTable {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn relation(&self) -> RelationId {
        self.relation
    }

    /// Unique within the star; differs from the relation alias when the same relation is
    /// joined more than once.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn parent(&self) -> Option<TableId> {
        self.parent
    }

    /// The join path from the fact table to this table.
    pub fn path(&self) -> &PhysPath {
        &self.path
    }
}

type ChildKey = (TableId, RelationId, Option<LinkId>, bool);

#[derive(Debug, Default)]
struct Layout {
    tables: Vec<Arc<StarTable>>,
    children: HashMap<ChildKey, TableId>,
    aliases: HashSet<String>,
    columns: Vec<Arc<StarColumn>>,
    column_index: HashMap<(TableId, ColumnExpr), usize>,
    measures: HashMap<(String, String), usize>,
}

pub struct RolapStar {
    graph: Arc<PhysSchemaGraph>,
    fact: RelationId,
    name: Arc<str>,
    config: Arc<AggConfig>,
    stats: Arc<dyn StatisticsProvider>,
    layout: RwLock<Layout>,
    agg_stars: RwLock<Vec<Arc<AggStar>>>,
    shared_cache: Arc<dyn SharedSegmentCache>,
}

impl fmt::Debug for RolapStar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RolapStar")
            .field("name", &self.name)
            .field("fact", &self.fact)
            .finish_non_exhaustive()
    }
}

impl RolapStar {
    /// A star over `fact` with no statistics and a private shared cache sized from `config`.
    pub fn new(graph: Arc<PhysSchemaGraph>, fact: RelationId, config: Arc<AggConfig>) -> Self {
        let shared_cache: Arc<dyn SharedSegmentCache> =
            Arc::new(MemorySegmentCache::new(config.segment_cache.clone()));
        let fact_alias = graph.schema().relation(fact).alias().to_string();
        let fact_table = Arc::new(StarTable {
            id: TableId::FACT,
            relation: fact,
            alias: fact_alias.clone(),
            parent: None,
            path: PhysPath::new(fact),
        });
        let layout = Layout {
            tables: vec![fact_table],
            aliases: HashSet::from([fact_alias.clone()]),
            ..Layout::default()
        };
        Self {
            graph,
            fact,
            name: Arc::from(fact_alias),
            config,
            stats: Arc::new(NoStatistics),
            layout: RwLock::new(layout),
            agg_stars: RwLock::new(Vec::new()),
            shared_cache,
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

    /// The fact relation's alias.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn fact(&self) -> RelationId {
        self.fact
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

    pub fn fact_table(&self) -> Arc<StarTable> {
        self.read_layout().tables[TableId::FACT.0].clone()
    }

    pub fn table(&self, id: TableId) -> Option<Arc<StarTable>> {
        self.read_layout().tables.get(id.0).cloned()
    }

    pub fn tables(&self) -> Vec<Arc<StarTable>> {
        self.read_layout().tables.clone()
    }

    /// Walk the join tree along `path`, adding the tables it is missing.
    pub fn get_table(&self, path: &PhysPath) -> AggResult<Arc<StarTable>> {
        if path.first() != self.fact {
            return Err(AggError::Internal(format!(
                "join path {} does not start at fact table {}",
                path.describe(self.graph.schema()),
                self.name
            )));
        }
        let mut current = TableId::FACT;
        for hop in &path.hops()[1..] {
            let child = self.find_child(current, *hop, true)?.ok_or_else(|| {
                AggError::Internal("find_child did not add a missing table".into())
            })?;
            current = child.id;
        }
        self.table(current)
            .ok_or_else(|| AggError::Internal(format!("unknown star table #{}", current.0)))
    }

    /// The child of `parent` reached through `hop`, created when `add` is set and it does not
    /// exist yet.
    pub fn find_child(
        &self,
        parent: TableId,
        hop: PhysHop,
        add: bool,
    ) -> AggResult<Option<Arc<StarTable>>> {
        let key: ChildKey = (parent, hop.relation, hop.link, hop.forward);
        {
            let layout = self.read_layout();
            if let Some(&id) = layout.children.get(&key) {
                return Ok(Some(layout.tables[id.0].clone()));
            }
        }
        if !add {
            return Ok(None);
        }

        let mut layout = self.write_layout();
        if let Some(&id) = layout.children.get(&key) {
            return Ok(Some(layout.tables[id.0].clone()));
        }
        let Some(parent_table) = layout.tables.get(parent.0).cloned() else {
            return Err(AggError::Internal(format!("unknown star table #{}", parent.0)));
        };
        let step = PhysPath::from_hops(
            vec![PhysHop::start(parent_table.relation), hop],
            self.graph.schema(),
        )?;
        let path = parent_table.path.concat(&step)?;

        let base = self.graph.schema().relation(hop.relation).alias().to_string();
        let alias = unique_alias(&layout.aliases, &base);
        let id = TableId(layout.tables.len());
        log::debug!(
            "star {}: joining {} as {} via {}",
            self.name,
            base,
            alias,
            path.describe(self.graph.schema())
        );
        let table = Arc::new(StarTable {
            id,
            relation: hop.relation,
            alias: alias.clone(),
            parent: Some(parent),
            path,
        });
        layout.aliases.insert(alias);
        layout.tables.push(table.clone());
        layout.children.insert(key, id);
        Ok(Some(table))
    }

    /// The level column reading `expr` from `table`, created with the next free bit position
    /// when `create` is set.
    pub fn lookup_column_by_expression(
        &self,
        table: TableId,
        expr: &ColumnExpr,
        create: bool,
    ) -> AggResult<Option<Arc<StarColumn>>> {
        let key = (table, expr.clone());
        {
            let layout = self.read_layout();
            if let Some(&bit) = layout.column_index.get(&key) {
                return Ok(Some(layout.columns[bit].clone()));
            }
        }
        if !create {
            return Ok(None);
        }

        let mut layout = self.write_layout();
        if let Some(&bit) = layout.column_index.get(&key) {
            return Ok(Some(layout.columns[bit].clone()));
        }
        let column = self.new_column(&layout, table, expr.clone(), ColumnRole::Level)?;
        log::debug!(
            "star {}: column {} at bit {}",
            self.name,
            column,
            column.bit_position
        );
        layout.column_index.insert(key, column.bit_position);
        layout.columns.push(column.clone());
        Ok(Some(column))
    }

    /// Register a measure of `cube` on the fact table. Registering the same measure twice
    /// returns the existing column.
    pub fn register_measure(
        &self,
        cube: &str,
        name: &str,
        aggregator: Aggregator,
        expr: ColumnExpr,
    ) -> AggResult<Arc<StarColumn>> {
        let key = (cube.to_string(), name.to_string());
        let mut layout = self.write_layout();
        if let Some(&bit) = layout.measures.get(&key) {
            return Ok(layout.columns[bit].clone());
        }
        let role = ColumnRole::Measure {
            cube: cube.to_string(),
            name: name.to_string(),
            aggregator,
        };
        let column = self.new_column(&layout, TableId::FACT, expr, role)?;
        log::debug!(
            "star {}: measure {} at bit {}",
            self.name,
            column,
            column.bit_position
        );
        layout.measures.insert(key, column.bit_position);
        layout.columns.push(column.clone());
        Ok(column)
    }

    pub fn find_measure(&self, cube: &str, name: &str) -> Option<Arc<StarColumn>> {
        let layout = self.read_layout();
        layout
            .measures
            .get(&(cube.to_string(), name.to_string()))
            .map(|&bit| layout.columns[bit].clone())
    }

    pub fn column(&self, bit_position: usize) -> Option<Arc<StarColumn>> {
        self.read_layout().columns.get(bit_position).cloned()
    }

    /// All columns, indexed by bit position.
    pub fn columns(&self) -> Vec<Arc<StarColumn>> {
        self.read_layout().columns.clone()
    }

    pub fn column_count(&self) -> usize {
        self.read_layout().columns.len()
    }

    /// Whether every fact row is distinct, i.e. the fact relation declares a key.
    pub fn are_rows_unique(&self) -> bool {
        !self.graph.schema().relation(self.fact).keys().is_empty()
    }

    /// Fact row count, or rows x row width when ranking by volume. Unknown row counts cost
    /// `u64::MAX`.
    pub fn get_cost(&self) -> u64 {
        let relation = self.graph.schema().relation(self.fact);
        let Some(rows) = relation
            .row_count()
            .or_else(|| self.stats.relation_row_count(relation))
        else {
            return u64::MAX;
        };
        if self.config.choose_aggregate_by_volume {
            rows.saturating_mul(relation.row_width())
        } else {
            rows
        }
    }

    /// Estimated distinct values of a level column, computed once.
    pub fn column_cardinality(&self, column: &StarColumn) -> Option<u64> {
        *column.cardinality.get_or_init(|| {
            let ColumnExpr::Column(name) = &column.expr else {
                return None;
            };
            let relation = self.graph.schema().relation(column.relation);
            self.stats.column_cardinality(relation, name)
        })
    }

    /// Register an aggregate table, keeping the list in ascending cost order. Tables of equal
    /// cost keep their registration order.
    pub fn add_agg_star(&self, agg: AggStar) -> Arc<AggStar> {
        let agg = Arc::new(agg);
        let by_volume = self.config.choose_aggregate_by_volume;
        let cost = agg.cost(by_volume);
        let mut aggs = self.agg_stars.write().expect("star aggregates lock poisoned");
        let pos = aggs
            .iter()
            .position(|existing| existing.cost(by_volume) > cost)
            .unwrap_or(aggs.len());
        aggs.insert(pos, agg.clone());
        log::debug!(
            "star {}: aggregate table {} (cost {cost}) ranked {} of {}",
            self.name,
            agg.name(),
            pos + 1,
            aggs.len()
        );
        agg
    }

    /// Aggregate tables, cheapest first.
    pub fn agg_stars(&self) -> Vec<Arc<AggStar>> {
        self.agg_stars
            .read()
            .expect("star aggregates lock poisoned")
            .clone()
    }

    /// The cheapest aggregate table able to answer a query on `levels` for `measures`, if
    /// aggregates are enabled and one is cheaper than the fact table.
    pub fn select_agg_star(&self, levels: &BitKey, measures: &BitKey) -> Option<Arc<AggStar>> {
        if !self.config.use_aggregates {
            return None;
        }
        let by_volume = self.config.choose_aggregate_by_volume;
        let fact_cost = self.get_cost();
        self.agg_stars
            .read()
            .expect("star aggregates lock poisoned")
            .iter()
            .find(|agg| agg.covers(levels, measures) && agg.cost(by_volume) < fact_cost)
            .cloned()
    }

    /// Look the requested cell up in the local tier, then in the shared tier.
    ///
    /// `Some(Value::Null)` means the cell is known to be empty; `None` is a miss and the
    /// caller has to compute the value. Segments that answer are added to `pins`.
    pub fn get_cell_from_cache(
        &self,
        request: &CellRequest,
        local: &mut LocalSegmentCache,
        pins: Option<&mut PinSet>,
    ) -> Option<Value> {
        let key = request.aggregation_key();
        if let Some(segment) = local.find(&key, request) {
            log::trace!("star {}: local hit in segment {}", self.name, segment.id());
            if let Some(pins) = pins {
                pins.add(&segment);
            }
            return segment.cell_value(request);
        }

        let segment = self.shared_cache.peek(request)?;
        log::trace!("star {}: shared hit in segment {}", self.name, segment.id());
        if let Some(pins) = pins {
            pins.add(&segment);
        }
        local.lookup_or_create_aggregation(key).add(&segment);
        segment.cell_value(request)
    }

    /// Make a computed segment visible to both cache tiers.
    pub fn register(&self, segment: Arc<Segment>, local: &mut LocalSegmentCache) {
        log::debug!(
            "star {}: registering segment {} ({} cells)",
            self.name,
            segment.id(),
            segment.cell_count()
        );
        local
            .lookup_or_create_aggregation(segment.key().clone())
            .add(&segment);
        self.shared_cache.put(segment);
    }

    fn new_column(
        &self,
        layout: &Layout,
        table: TableId,
        expr: ColumnExpr,
        role: ColumnRole,
    ) -> AggResult<Arc<StarColumn>> {
        let Some(star_table) = layout.tables.get(table.0) else {
            return Err(AggError::Internal(format!("unknown star table #{}", table.0)));
        };
        let relation = self.graph.schema().relation(star_table.relation);
        let (datatype, calculated) = match &expr {
            ColumnExpr::Column(name) => {
                let column = relation.column(name).ok_or_else(|| {
                    PhysSchemaError::UnknownColumn {
                        relation: relation.alias().to_string(),
                        column: name.clone(),
                    }
                })?;
                (column.datatype(), column.is_calculated())
            }
            ColumnExpr::Star => (DataType::Integer, false),
        };
        Ok(Arc::new(StarColumn {
            bit_position: layout.columns.len(),
            table,
            relation: star_table.relation,
            table_alias: star_table.alias.clone(),
            expr,
            datatype,
            calculated,
            role,
            cardinality: OnceLock::new(),
        }))
    }

    fn read_layout(&self) -> std::sync::RwLockReadGuard<'_, Layout> {
        self.layout.read().expect("star layout lock poisoned")
    }

    fn write_layout(&self) -> std::sync::RwLockWriteGuard<'_, Layout> {
        self.layout.write().expect("star layout lock poisoned")
    }
}

fn unique_alias(taken: &HashSet<String>, base: &str) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 1usize;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
