use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rolap_agg::{AggConfig, AggError, AggStar, ColumnExpr, StarColumn, StarRegistry};
use rolap_schema::{BitKey, InMemoryStatistics, PhysSchemaError, PhysSchemaGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

mod common;

use common::Fixture;

const LEVELS: [&str; 5] = [
    "[Store].[Region]",
    "[Store].[Store]",
    "[Time].[Year]",
    "[Time].[Month]",
    "[Gender].[Gender]",
];

fn key_column(fx: &Fixture, level: &str) -> Arc<StarColumn> {
    let group = fx.cube.measure_groups()[0].clone();
    let mut columns = group.resolve_key(&fx.level(level)).unwrap().unwrap();
    assert_eq!(columns.len(), 1);
    columns.remove(0)
}

fn measure(fx: &Fixture, name: &str) -> Arc<StarColumn> {
    fx.star.find_measure("Sales", name).unwrap()
}

fn bits(columns: &[&Arc<StarColumn>]) -> BitKey {
    BitKey::from_positions(columns.iter().map(|c| c.bit_position()))
}

fn resolve_all(fx: &Fixture, order: &[&str]) -> BTreeMap<String, usize> {
    order
        .iter()
        .map(|level| {
            let column = key_column(fx, level);
            (column.qualified_name(), column.bit_position())
        })
        .collect()
}

#[test]
fn measures_take_the_first_bits_in_registration_order() {
    let fx = Fixture::new();
    let names: Vec<(usize, String)> = fx
        .star
        .columns()
        .iter()
        .map(|c| (c.bit_position(), c.to_string()))
        .collect();
    assert_eq!(
        names,
        vec![
            (0, "sum(sales.amount) as Unit Sales".to_string()),
            (1, "count(sales.*) as Sales Count".to_string()),
            (2, "distinct-count(sales.fk_customer) as Customer Count".to_string()),
        ]
    );
    assert!(measure(&fx, "Unit Sales").is_measure());
    assert_eq!(measure(&fx, "Sales Count").expr(), &ColumnExpr::Star);
}

#[test]
fn level_columns_are_resolved_once() {
    let fx = Fixture::new();
    let first = key_column(&fx, "[Time].[Month]");
    let second = key_column(&fx, "[Time].[Month]");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.bit_position(), 3);
    assert_eq!(first.table_alias(), "time");
    assert_eq!(fx.star.column_count(), 4);

    // Both levels read `time`, through one join-tree table.
    let year = key_column(&fx, "[Time].[Year]");
    assert_eq!(year.table(), first.table());
    assert_eq!(fx.star.tables().len(), 2);
}

#[test]
fn concurrent_resolution_agrees_on_bit_positions() {
    let fx = Fixture::new();
    let results: Vec<BTreeMap<String, usize>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let fx = &fx;
                scope.spawn(move || {
                    let mut order = LEVELS.to_vec();
                    order.rotate_left(i % LEVELS.len());
                    if i % 2 == 1 {
                        order.reverse();
                    }
                    resolve_all(fx, &order)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("resolver thread panicked"))
            .collect()
    });

    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
    let positions: BTreeSet<usize> = results[0].values().copied().collect();
    assert_eq!(positions, (3..8).collect::<BTreeSet<_>>());
    assert_eq!(fx.star.column_count(), 8);
    for (name, bit) in &results[0] {
        assert_eq!(&fx.star.column(*bit).unwrap().qualified_name(), name);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bit_positions_are_dense_and_stable(order in Just(LEVELS.to_vec()).prop_shuffle()) {
        let fx = Fixture::new();
        let assigned = resolve_all(&fx, &order);

        // Bits follow first resolution.
        let first = key_column(&fx, order[0]);
        prop_assert_eq!(first.bit_position(), 3);

        let positions: BTreeSet<usize> = assigned.values().copied().collect();
        prop_assert_eq!(positions, (3..8).collect::<BTreeSet<_>>());

        let mut reversed = order.clone();
        reversed.reverse();
        prop_assert_eq!(resolve_all(&fx, &reversed), assigned);
        prop_assert_eq!(fx.star.column_count(), 8);
    }
}

/// Aggregate tables over the fixture star (100 000 fact rows, 24 bytes wide).
fn register_aggregates(fx: &Fixture) {
    let region = key_column(fx, "[Store].[Region]");
    let month = key_column(fx, "[Time].[Month]");
    let gender = key_column(fx, "[Gender].[Gender]");
    let unit_sales = measure(fx, "Unit Sales");
    let customers = measure(fx, "Customer Count");

    fx.star.add_agg_star(
        AggStar::new("agg_region_month", 5_000, 10)
            .with_level(&region)
            .with_level(&month)
            .with_measure(&unit_sales)
            .with_measure(&customers),
    );
    fx.star.add_agg_star(
        AggStar::new("agg_region", 500, 100)
            .with_level(&region)
            .with_measure(&unit_sales)
            .with_measure(&customers),
    );
    fx.star.add_agg_star(
        AggStar::new("agg_region_slim", 500, 1)
            .with_level(&region)
            .with_measure(&unit_sales),
    );
    fx.star.add_agg_star(
        AggStar::new("agg_wide", 200_000, 1)
            .with_level(&region)
            .with_level(&month)
            .with_level(&gender)
            .with_measure(&unit_sales),
    );
}

fn agg_names(fx: &Fixture) -> Vec<String> {
    fx.star
        .agg_stars()
        .iter()
        .map(|a| a.name().to_string())
        .collect()
}

fn selected(fx: &Fixture, levels: &[&Arc<StarColumn>], measures: &[&Arc<StarColumn>]) -> Option<String> {
    fx.star
        .select_agg_star(&bits(levels), &bits(measures))
        .map(|a| a.name().to_string())
}

#[test]
fn aggregate_tables_are_ignored_unless_enabled() {
    let fx = Fixture::new();
    register_aggregates(&fx);
    let region = key_column(&fx, "[Store].[Region]");
    assert_eq!(selected(&fx, &[&region], &[&measure(&fx, "Unit Sales")]), None);
}

#[test]
fn cheapest_covering_aggregate_table_is_chosen() {
    let fx = Fixture::with_config(AggConfig {
        use_aggregates: true,
        ..AggConfig::default()
    });
    register_aggregates(&fx);
    assert_eq!(fx.star.get_cost(), 100_000);
    // Ties keep registration order.
    assert_eq!(
        agg_names(&fx),
        vec!["agg_region", "agg_region_slim", "agg_region_month", "agg_wide"]
    );

    let region = key_column(&fx, "[Store].[Region]");
    let month = key_column(&fx, "[Time].[Month]");
    let gender = key_column(&fx, "[Gender].[Gender]");
    let unit_sales = measure(&fx, "Unit Sales");

    assert_eq!(selected(&fx, &[&region], &[&unit_sales]).as_deref(), Some("agg_region"));
    assert_eq!(selected(&fx, &[], &[&unit_sales]).as_deref(), Some("agg_region"));
    assert_eq!(
        selected(&fx, &[&month, &region], &[&unit_sales]).as_deref(),
        Some("agg_region_month")
    );
    // Only covered by a table bigger than the fact table.
    assert_eq!(selected(&fx, &[&region, &month, &gender], &[&unit_sales]), None);
    // No table carries the measure.
    assert_eq!(selected(&fx, &[&region], &[&measure(&fx, "Sales Count")]), None);
}

#[test]
fn distinct_count_needs_an_exact_level_match() {
    let fx = Fixture::with_config(AggConfig {
        use_aggregates: true,
        ..AggConfig::default()
    });
    register_aggregates(&fx);
    let region = key_column(&fx, "[Store].[Region]");
    let month = key_column(&fx, "[Time].[Month]");
    let customers = measure(&fx, "Customer Count");

    assert_eq!(selected(&fx, &[&region], &[&customers]).as_deref(), Some("agg_region"));
    assert_eq!(
        selected(&fx, &[&region, &month], &[&customers]).as_deref(),
        Some("agg_region_month")
    );
    // Rolling agg_region up to the grand total would double count customers.
    assert_eq!(selected(&fx, &[], &[&customers]), None);
    assert_eq!(selected(&fx, &[&month], &[&customers]), None);
}

#[test]
fn ranking_by_volume_uses_row_width() {
    let fx = Fixture::with_config(AggConfig {
        use_aggregates: true,
        choose_aggregate_by_volume: true,
        ..AggConfig::default()
    });
    register_aggregates(&fx);
    assert_eq!(fx.star.get_cost(), 2_400_000);
    assert_eq!(
        agg_names(&fx),
        vec!["agg_region_slim", "agg_region_month", "agg_region", "agg_wide"]
    );

    let region = key_column(&fx, "[Store].[Region]");
    let gender = key_column(&fx, "[Gender].[Gender]");
    let unit_sales = measure(&fx, "Unit Sales");
    assert_eq!(
        selected(&fx, &[&region], &[&unit_sales]).as_deref(),
        Some("agg_region_slim")
    );
    assert_eq!(
        selected(&fx, &[&gender], &[&unit_sales]).as_deref(),
        Some("agg_wide")
    );
}

#[test]
fn registry_hands_out_one_star_per_fact_table() {
    let fx = Fixture::new();
    let again = fx.registry.get_or_create("sales").unwrap();
    assert!(Arc::ptr_eq(&again, &fx.star));
    assert!(Arc::ptr_eq(&fx.registry.get("sales").unwrap(), &fx.star));
    assert!(fx.registry.get("store").is_none());
    assert_eq!(fx.registry.len(), 1);

    match fx.registry.get_or_create("returns").unwrap_err() {
        AggError::Schema(PhysSchemaError::UnknownRelation(name)) => assert_eq!(name, "returns"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.registry.len(), 1);
}

#[test]
fn statistics_fill_in_undeclared_row_counts_and_cardinalities() {
    let graph = Arc::new(PhysSchemaGraph::new(Arc::new(common::schema())));
    let stats = InMemoryStatistics::new()
        .with_row_count("sales", 1)
        .with_row_count("store", 50)
        .with_cardinality("store", "region", 4);
    let registry =
        StarRegistry::new(graph.clone(), AggConfig::default()).with_statistics(Arc::new(stats));

    // Declared counts win over statistics.
    let sales = registry.get_or_create("sales").unwrap();
    assert_eq!(sales.get_cost(), 100_000);
    assert!(!sales.are_rows_unique());

    let store = registry.get_or_create("store").unwrap();
    assert_eq!(store.get_cost(), 50);
    assert!(store.are_rows_unique());
    assert_eq!(registry.len(), 2);

    let schema = graph.schema();
    let path = graph
        .find_path(
            schema.lookup("sales").unwrap(),
            &[schema.lookup("store").unwrap()],
            true,
        )
        .unwrap();
    let table = sales.get_table(&path).unwrap();
    assert_eq!(table.alias(), "store");

    let region = sales
        .lookup_column_by_expression(table.id(), &ColumnExpr::Column("region".into()), true)
        .unwrap()
        .unwrap();
    let name = sales
        .lookup_column_by_expression(table.id(), &ColumnExpr::Column("name".into()), true)
        .unwrap()
        .unwrap();
    assert_eq!(sales.column_cardinality(&region), Some(4));
    assert_eq!(sales.column_cardinality(&name), None);

    // Looking up without creating does not allocate a bit.
    let missing = sales
        .lookup_column_by_expression(table.id(), &ColumnExpr::Column("id".into()), false)
        .unwrap();
    assert!(missing.is_none());
    assert_eq!(sales.column_count(), 2);
}
