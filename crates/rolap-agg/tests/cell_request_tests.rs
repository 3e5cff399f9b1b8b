use pretty_assertions::assert_eq;
use rolap_agg::{
    AggConfig, AggError, CellReader, ColumnRef, Cube, LevelSpec, Member, Segment,
    UnrelatedDimensionPolicy, Value,
};
use rolap_schema::PhysSchemaError;

mod common;

use common::Fixture;

fn constraints(request: &rolap_agg::CellRequest) -> Vec<(String, Option<Value>)> {
    request
        .columns()
        .map(|(column, value)| (column.qualified_name(), value.cloned()))
        .collect()
}

#[test]
fn region_and_month_coordinate_constrains_both_columns_and_hits_cache_after_register() {
    let fx = Fixture::new();
    let coordinate = vec![fx.unit_sales(), fx.region("CA"), fx.month("Jan")];

    let request = fx.builder().make_request(&coordinate).unwrap().unwrap();
    assert_eq!(request.measure().qualified_name(), "sales.amount");
    assert_eq!(
        constraints(&request),
        vec![
            ("store.region".to_string(), Some(Value::from("CA"))),
            ("time.month".to_string(), Some(Value::from("Jan"))),
        ]
    );
    assert_eq!(
        request.to_predicate().to_string(),
        "(store.region = 'CA' AND time.month = 'Jan')"
    );

    let mut reader = CellReader::new(fx.star.clone());
    assert_eq!(reader.get(&request), None);
    reader.register(Segment::for_request(&request, Value::from(1234.5)));

    let again = fx.builder().make_request(&coordinate).unwrap().unwrap();
    assert_eq!(reader.get(&again), Some(Value::from(1234.5)));
    assert_eq!((reader.hit_count(), reader.miss_count()), (1, 1));
}

#[test]
fn member_order_does_not_change_the_aggregation_key() {
    let fx = Fixture::new();
    let a = fx
        .builder()
        .make_request(&[fx.unit_sales(), fx.region("CA"), fx.month("Jan")])
        .unwrap()
        .unwrap();
    let b = fx
        .builder()
        .make_request(&[fx.unit_sales(), fx.month("Jan"), fx.region("CA")])
        .unwrap()
        .unwrap();
    assert_eq!(a.aggregation_key(), b.aggregation_key());
    assert_eq!(a.coordinates(), b.coordinates());
}

#[test]
fn null_and_calculated_members_are_unsatisfiable() {
    let fx = Fixture::new();
    let builder = fx.builder();

    assert!(builder
        .make_request(&[fx.unit_sales(), Member::null()])
        .unwrap()
        .is_none());
    assert!(builder
        .make_request(&[Member::null(), fx.region("CA")])
        .unwrap()
        .is_none());
    assert!(builder
        .make_request(&[Member::calculated_measure("Profit"), fx.region("CA")])
        .unwrap()
        .is_none());

    let region = fx.level("[Store].[Region]");
    let calculated = Member::calculated("[Store].[West Coast]", Some(&region));
    assert!(builder
        .make_request(&[fx.unit_sales(), calculated])
        .unwrap()
        .is_none());
}

#[test]
fn all_member_adds_no_constraint() {
    let fx = Fixture::new();
    let request = fx
        .builder()
        .make_request(&[fx.unit_sales(), fx.all("Store"), fx.month("Feb")])
        .unwrap()
        .unwrap();
    assert_eq!(request.constrained_columns().cardinality(), 1);
    assert_eq!(
        constraints(&request),
        vec![("time.month".to_string(), Some(Value::from("Feb")))]
    );

    // No constraint at all is a request, not an unsatisfiable coordinate.
    let request = fx
        .builder()
        .make_request(&[fx.unit_sales()])
        .unwrap()
        .unwrap();
    assert!(request.constrained_columns().is_empty());
}

#[test]
fn conflicting_keys_for_one_column_are_unsatisfiable() {
    let fx = Fixture::new();
    let builder = fx.builder();
    assert!(builder
        .make_request(&[fx.unit_sales(), fx.region("CA"), fx.region("WA")])
        .unwrap()
        .is_none());

    let request = builder
        .make_request(&[fx.unit_sales(), fx.region("CA"), fx.region("CA")])
        .unwrap()
        .unwrap();
    assert_eq!(request.constrained_columns().cardinality(), 1);
}

#[test]
fn malformed_coordinates_are_internal_errors() {
    let fx = Fixture::new();
    let builder = fx.builder();

    let err = builder.make_request(&[]).unwrap_err();
    assert!(matches!(err, AggError::Internal(_)));

    let err = builder.make_request(&[fx.region("CA")]).unwrap_err();
    assert!(matches!(err, AggError::Internal(_)));

    let err = builder
        .make_request(&[fx.unit_sales(), Member::stored_measure("Sales Count")])
        .unwrap_err();
    assert!(matches!(err, AggError::Internal(_)));

    let region = fx.level("[Store].[Region]");
    let keyless = Member::regular(&region, Vec::new());
    let err = builder
        .make_request(&[fx.unit_sales(), keyless])
        .unwrap_err();
    assert!(matches!(err, AggError::Internal(_)));
}

#[test]
fn unknown_measure_is_reported_by_name() {
    let fx = Fixture::new();
    let err = fx
        .builder()
        .make_request(&[Member::stored_measure("Store Cost")])
        .unwrap_err();
    match err {
        AggError::UnknownMeasure { cube, measure } => {
            assert_eq!((cube.as_str(), measure.as_str()), ("Sales", "Store Cost"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unrelated_dimension_policy() {
    let fx = Fixture::new();
    let coordinate = vec![
        fx.unit_sales(),
        fx.member("[Warehouse].[City]", "Paris"),
        fx.region("CA"),
    ];

    assert!(fx.builder().make_request(&coordinate).unwrap().is_none());

    let request = fx
        .builder()
        .with_policy(UnrelatedDimensionPolicy::Ignore)
        .make_request(&coordinate)
        .unwrap()
        .unwrap();
    assert_eq!(
        constraints(&request),
        vec![("store.region".to_string(), Some(Value::from("CA")))]
    );

    let lenient = Fixture::with_config(AggConfig {
        unrelated_dimensions: UnrelatedDimensionPolicy::Ignore,
        ..AggConfig::default()
    });
    let coordinate = vec![lenient.unit_sales(), lenient.member("[Warehouse].[City]", "Paris")];
    assert!(lenient.builder().make_request(&coordinate).unwrap().is_some());
    assert!(lenient
        .builder()
        .with_policy(UnrelatedDimensionPolicy::Unsatisfiable)
        .make_request(&coordinate)
        .unwrap()
        .is_none());
}

#[test]
fn role_playing_dimension_without_explicit_path_is_ambiguous() {
    let fx = Fixture::new();
    let err = fx
        .builder()
        .make_request(&[fx.unit_sales(), fx.member("[Ship Time].[Month]", "Jan")])
        .unwrap_err();
    match err {
        AggError::Schema(PhysSchemaError::AmbiguousPath { from, to, count }) => {
            assert_eq!((from.as_str(), to.as_str(), count), ("sales", "time", 2));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn drill_through_orders_columns_by_dimension_and_puts_measure_last() {
    let fx = Fixture::new();
    // Time arrives before Store, but Store is declared first.
    let request = fx
        .builder()
        .make_drill_through_request(&[fx.unit_sales(), fx.month("Jan"), fx.region("CA")], None)
        .unwrap()
        .unwrap();
    assert!(request.is_drill_through());

    let selected: Vec<String> = request
        .drill_through_columns()
        .iter()
        .map(|c| c.qualified_name())
        .collect();
    assert_eq!(
        selected,
        vec![
            "store.region",
            "store.id",
            "store.name",
            "time.month",
            "sales.amount"
        ]
    );
    assert_eq!(
        constraints(&request),
        vec![
            ("store.region".to_string(), Some(Value::from("CA"))),
            ("store.id".to_string(), None),
            ("store.name".to_string(), None),
            ("time.month".to_string(), Some(Value::from("Jan"))),
        ]
    );
    assert_eq!(request.constrained_columns().cardinality(), 2);
}

#[test]
fn drill_through_orders_hierarchies_of_one_dimension_by_declaration() {
    let fx = Fixture::new();
    let week = fx.level("[Time.Weekly].[Week]");
    assert_eq!(
        (week.dimension(), week.hierarchy_ordinal()),
        (common::TIME, 1)
    );
    assert_eq!(fx.level("[Time].[Month]").hierarchy_ordinal(), 0);

    let selected = |members: Vec<Member>| -> Vec<String> {
        fx.builder()
            .make_drill_through_request(&members, None)
            .unwrap()
            .unwrap()
            .drill_through_columns()
            .iter()
            .map(|c| c.qualified_name())
            .collect()
    };
    let expected = vec!["time.month", "time.week", "sales.amount"];
    assert_eq!(
        selected(vec![fx.unit_sales(), fx.month("Jan"), fx.week(3)]),
        expected
    );
    // Weekly arrives first but is declared after Time.
    assert_eq!(
        selected(vec![fx.unit_sales(), fx.week(3), fx.month("Jan")]),
        expected
    );
}

#[test]
fn hierarchies_reject_repeated_level_names() {
    let mut cube = Cube::new("Sales");
    let time = cube.add_dimension("Time");
    let month = || LevelSpec::new("Month", vec![ColumnRef::new("time", "month")]);

    match cube.add_hierarchy(time, "Time", vec![month(), month()]) {
        Err(AggError::DuplicateLevel(name)) => assert_eq!(name, "[Time].[Month]"),
        other => panic!("unexpected result: {other:?}"),
    }
    match cube.add_hierarchy(
        time,
        "Time",
        vec![LevelSpec::new("(All)", vec![ColumnRef::new("time", "year")])],
    ) {
        Err(AggError::DuplicateLevel(name)) => assert_eq!(name, "[Time].[(All)]"),
        other => panic!("unexpected result: {other:?}"),
    }
    // Nothing was registered by the failed calls.
    assert!(cube.hierarchy("Time").is_none());
    cube.add_hierarchy(time, "Time", vec![month()]).unwrap();
    assert_eq!(
        cube.level("[Time].[Month]").map(|l| l.hierarchy_ordinal()),
        Some(0)
    );
}

#[test]
fn drill_through_from_all_member_selects_every_level() {
    let fx = Fixture::new();
    let request = fx
        .builder()
        .make_drill_through_request(&[fx.unit_sales(), fx.all("Gender")], None)
        .unwrap()
        .unwrap();
    let selected: Vec<String> = request
        .drill_through_columns()
        .iter()
        .map(|c| c.qualified_name())
        .collect();
    assert_eq!(selected, vec!["customer.gender", "sales.amount"]);
    assert!(request.constrained_columns().is_empty());
}

#[test]
fn drill_through_projection_overrides_default_columns() {
    let fx = Fixture::new();
    let projection = ["[Time].[Year]", "[Warehouse].[City]", "[Store].[Store]"];
    let request = fx
        .builder()
        .make_drill_through_request(&[fx.unit_sales(), fx.region("CA")], Some(&projection[..]))
        .unwrap()
        .unwrap();
    let selected: Vec<String> = request
        .drill_through_columns()
        .iter()
        .map(|c| c.qualified_name())
        .collect();
    assert_eq!(
        selected,
        vec!["time.year", "store.id", "store.name", "sales.amount"]
    );
    assert_eq!(
        constraints(&request)[0],
        ("store.region".to_string(), Some(Value::from("CA")))
    );
}

#[test]
fn drill_through_projection_with_unknown_level_is_a_user_error() {
    let fx = Fixture::new();
    let err = fx
        .builder()
        .make_drill_through_request(&[fx.unit_sales()], Some(&["[Store].[Nope]"][..]))
        .unwrap_err();
    match err {
        AggError::UnknownProjection { name } => assert_eq!(name, "[Store].[Nope]"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn drill_through_is_unsatisfiable_for_null_members() {
    let fx = Fixture::new();
    assert!(fx
        .builder()
        .make_drill_through_request(&[fx.unit_sales(), Member::null()], None)
        .unwrap()
        .is_none());
}
