#![allow(dead_code)]

use rolap_agg::{
    AggConfig, Aggregator, CellRequestBuilder, ColumnRef, Cube, DimensionLink, Level, LevelSpec,
    Member, MeasureGroup, MemorySegmentCache, RolapStar, StarRegistry, Value,
};
use rolap_schema::{DataType, PhysRelation, PhysSchema, PhysSchemaGraph};
use std::sync::Arc;

pub const STORE: usize = 0;
pub const TIME: usize = 1;
pub const CUSTOMER: usize = 2;
pub const WAREHOUSE: usize = 3;
pub const SHIP_TIME: usize = 4;

fn relation(name: &str, columns: &[(&str, DataType)]) -> PhysRelation {
    let mut rel = PhysRelation::table(name);
    for (column, datatype) in columns {
        rel = rel.with_column(*column, *datatype).unwrap();
    }
    rel
}

/// `sales` joins to `store`, to `customer`, and twice to `time` (order and ship date).
/// `warehouse` is part of the schema but not linked to `sales`.
pub fn schema() -> PhysSchema {
    let mut schema = PhysSchema::new();
    schema
        .add_relation(
            relation(
                "sales",
                &[
                    ("fk_store", DataType::Integer),
                    ("fk_time", DataType::Integer),
                    ("fk_ship_time", DataType::Integer),
                    ("fk_customer", DataType::Integer),
                    ("amount", DataType::Numeric),
                ],
            )
            .with_row_count(100_000),
        )
        .unwrap();
    schema
        .add_relation(
            relation(
                "store",
                &[
                    ("id", DataType::Integer),
                    ("region", DataType::String),
                    ("name", DataType::String),
                ],
            )
            .with_key("primary", vec!["id"])
            .unwrap(),
        )
        .unwrap();
    schema
        .add_relation(
            relation(
                "time",
                &[
                    ("id", DataType::Integer),
                    ("year", DataType::Integer),
                    ("month", DataType::String),
                    ("week", DataType::Integer),
                ],
            )
            .with_key("primary", vec!["id"])
            .unwrap(),
        )
        .unwrap();
    schema
        .add_relation(
            relation(
                "customer",
                &[("id", DataType::Integer), ("gender", DataType::String)],
            )
            .with_key("primary", vec!["id"])
            .unwrap(),
        )
        .unwrap();
    schema
        .add_relation(
            relation(
                "warehouse",
                &[("id", DataType::Integer), ("city", DataType::String)],
            )
            .with_key("primary", vec!["id"])
            .unwrap(),
        )
        .unwrap();
    schema.link("sales", vec!["fk_store"], "store").unwrap();
    schema.link("sales", vec!["fk_time"], "time").unwrap();
    schema.link("sales", vec!["fk_ship_time"], "time").unwrap();
    schema.link("sales", vec!["fk_customer"], "customer").unwrap();
    schema
}

pub struct Fixture {
    pub registry: StarRegistry,
    pub star: Arc<RolapStar>,
    pub cube: Cube,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(AggConfig::default())
    }

    pub fn with_config(config: AggConfig) -> Self {
        Self::build(config, None)
    }

    /// A fixture whose star uses `cache` as its shared tier.
    pub fn with_cache(cache: Arc<MemorySegmentCache>) -> Self {
        Self::build(AggConfig::default(), Some(cache))
    }

    fn build(config: AggConfig, cache: Option<Arc<MemorySegmentCache>>) -> Self {
        let graph = Arc::new(PhysSchemaGraph::new(Arc::new(schema())));
        let mut registry = StarRegistry::new(graph.clone(), config);
        if let Some(cache) = cache {
            registry = registry.with_shared_cache(cache);
        }
        let star = registry.get_or_create("sales").unwrap();

        let mut cube = Cube::new("Sales");
        let store = cube.add_dimension("Store");
        let time = cube.add_dimension("Time");
        let customer = cube.add_dimension("Customer");
        let warehouse = cube.add_dimension("Warehouse");
        let ship_time = cube.add_dimension("Ship Time");
        assert_eq!(
            (store, time, customer, warehouse, ship_time),
            (STORE, TIME, CUSTOMER, WAREHOUSE, SHIP_TIME)
        );

        cube.add_hierarchy(
            store,
            "Store",
            vec![
                LevelSpec::new("Region", vec![ColumnRef::new("store", "region")]),
                LevelSpec::new("Store", vec![ColumnRef::new("store", "id")])
                    .with_name_column(ColumnRef::new("store", "name")),
            ],
        )
        .unwrap();
        cube.add_hierarchy(
            time,
            "Time",
            vec![
                LevelSpec::new("Year", vec![ColumnRef::new("time", "year")]),
                LevelSpec::new("Month", vec![ColumnRef::new("time", "month")]),
            ],
        )
        .unwrap();
        cube.add_hierarchy(
            time,
            "Time.Weekly",
            vec![LevelSpec::new("Week", vec![ColumnRef::new("time", "week")])],
        )
        .unwrap();
        cube.add_hierarchy(
            customer,
            "Gender",
            vec![LevelSpec::new(
                "Gender",
                vec![ColumnRef::new("customer", "gender")],
            )],
        )
        .unwrap();
        cube.add_hierarchy(
            warehouse,
            "Warehouse",
            vec![LevelSpec::new(
                "City",
                vec![ColumnRef::new("warehouse", "city")],
            )],
        )
        .unwrap();
        cube.add_hierarchy(
            ship_time,
            "Ship Time",
            vec![LevelSpec::new(
                "Month",
                vec![ColumnRef::new("time", "month")],
            )],
        )
        .unwrap();

        let sales = graph.schema().lookup("sales").unwrap();
        let time_rel = graph.schema().lookup("time").unwrap();
        let order_date = graph.all_paths(sales, time_rel, true).remove(0);

        let mut group = MeasureGroup::new("Sales", "Sales", star.clone());
        group
            .add_measure("Unit Sales", Aggregator::Sum, Some("amount"))
            .unwrap();
        group
            .add_measure("Sales Count", Aggregator::Count, None)
            .unwrap();
        group
            .add_measure("Customer Count", Aggregator::DistinctCount, Some("fk_customer"))
            .unwrap();
        group
            .link_dimension(store, DimensionLink::Inferred)
            .unwrap();
        group
            .link_dimension(time, DimensionLink::Explicit(order_date))
            .unwrap();
        group
            .link_dimension(customer, DimensionLink::Inferred)
            .unwrap();
        // Ship time is reachable along two links; inferring its path is ambiguous.
        group
            .link_dimension(ship_time, DimensionLink::Inferred)
            .unwrap();
        cube.add_measure_group(group);

        Self {
            registry,
            star,
            cube,
        }
    }

    pub fn builder(&self) -> CellRequestBuilder<'_> {
        CellRequestBuilder::new(&self.cube)
    }

    pub fn level(&self, unique_name: &str) -> Arc<Level> {
        self.cube.level(unique_name).unwrap().clone()
    }

    pub fn member(&self, level: &str, key: impl Into<Value>) -> Member {
        Member::regular(&self.level(level), vec![key.into()])
    }

    pub fn all(&self, hierarchy: &str) -> Member {
        Member::all(self.cube.hierarchy(hierarchy).unwrap())
    }

    pub fn unit_sales(&self) -> Member {
        Member::stored_measure("Unit Sales")
    }

    pub fn region(&self, region: &str) -> Member {
        self.member("[Store].[Region]", region)
    }

    pub fn month(&self, month: &str) -> Member {
        self.member("[Time].[Month]", month)
    }

    pub fn week(&self, week: i64) -> Member {
        self.member("[Time.Weekly].[Week]", week)
    }

    pub fn gender(&self, gender: &str) -> Member {
        self.member("[Gender].[Gender]", gender)
    }
}
