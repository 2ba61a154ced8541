//! Type system synthesis: identity, cycles, escaping, emulated groups and
//! input type restrictions.

use super::common::*;
use relgraph_core::{Field, FieldType, Ref, Table};
use relgraph_schema::{
    BUILD_PROGRESS_TOTAL, FieldKind, GraphSchema, NlpSchema, NoProgress, QUERY_TYPE, SchemaError,
    build, lower,
};
use std::collections::HashSet;
use std::sync::Arc;

fn synthesize(tables: Vec<Table>) -> Result<GraphSchema, SchemaError> {
    build(Arc::new(FixtureAdapter::new(Vec::new())), tables, &NoProgress)
}

fn connection_node(schema: &GraphSchema, type_name: &str, field: &str) -> Arc<relgraph_schema::ObjectType> {
    let object = schema.registry().object(type_name).unwrap();
    match &object.field(field).unwrap().kind {
        FieldKind::Connection(connection) => connection.node().unwrap(),
        other => panic!("{field} is not a connection: {}", other.type_name()),
    }
}

// =============================================================================
// TYPE IDENTITY
// =============================================================================

#[test]
fn test_one_object_type_per_table() {
    let tables = vec![
        Table::new("B").with_field(Field::new("B", "ID", FieldType::Int).primary()),
        Table::new("A")
            .with_field(Field::new("A", "ID", FieldType::Int).primary())
            .with_field(Field::new("A", "FIRST_B", FieldType::Int).references("B", "ID"))
            .with_field(Field::new("A", "SECOND_B", FieldType::Int).references("B", "ID")),
    ];
    let schema = synthesize(tables).unwrap();

    let root_b = schema.root_type("B").unwrap();
    let first = connection_node(&schema, "A", "link_FIRST_B");
    let second = connection_node(&schema, "A", "link_SECOND_B");
    assert!(Arc::ptr_eq(&root_b, &first));
    assert!(Arc::ptr_eq(&first, &second));

    let a = schema.registry().object("A").unwrap();
    let (FieldKind::Connection(c1), FieldKind::Connection(c2)) = (
        &a.field("link_FIRST_B").unwrap().kind,
        &a.field("link_SECOND_B").unwrap().kind,
    ) else {
        panic!("links must be connections");
    };
    assert!(Arc::ptr_eq(c1, c2));
}

#[test]
fn test_connection_types_are_unique() {
    let schema = synthesize(people_tables()).unwrap();
    let names: Vec<&str> = schema
        .registry()
        .connections()
        .map(|c| c.name.as_str())
        .collect();
    let unique: HashSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), unique.len());
    assert!(unique.contains("CITYConnection"));
    assert!(unique.contains("PERSONConnection"));
}

#[test]
fn test_mutual_references_build() {
    let tables = vec![
        Table::new("A")
            .with_field(Field::new("A", "ID", FieldType::Int).primary())
            .with_field(Field::new("A", "B_ID", FieldType::Int).references("B", "ID")),
        Table::new("B")
            .with_field(Field::new("B", "ID", FieldType::Int).primary())
            .with_field(Field::new("B", "A_ID", FieldType::Int).references("A", "ID")),
    ];
    let schema = synthesize(tables).unwrap();

    let a = schema.root_type("A").unwrap();
    let b = schema.root_type("B").unwrap();
    assert!(Arc::ptr_eq(&connection_node(&schema, "A", "link_B_ID"), &b));
    assert!(Arc::ptr_eq(&connection_node(&schema, "B", "link_A_ID"), &a));
    assert!(a.is_populated() && b.is_populated());
}

#[test]
fn test_self_reference_builds() {
    let tables = vec![
        Table::new("NODE")
            .with_field(Field::new("NODE", "ID", FieldType::Int).primary())
            .with_field(Field::new("NODE", "PARENT_ID", FieldType::Int).references("NODE", "ID")),
    ];
    let schema = synthesize(tables).unwrap();
    let node = schema.root_type("NODE").unwrap();
    assert!(Arc::ptr_eq(&connection_node(&schema, "NODE", "link_PARENT_ID"), &node));
}

#[test]
fn test_link_without_field_ref_joins_on_primary() {
    let tables = vec![
        Table::new("B").with_field(Field::new("B", "KEY", FieldType::Int).primary()),
        Table::new("A").with_field({
            let mut f = Field::new("A", "B", FieldType::Int);
            f.table_name_ref = Some("B".to_string());
            f
        }),
    ];
    let schema = synthesize(tables).unwrap();
    let a = schema.registry().object("A").unwrap();
    let join = a.field("link_B").unwrap().join.clone().unwrap();
    assert_eq!(join("t0", "t1"), r#"t0."B" = t1."KEY""#);
}

// =============================================================================
// SKIPPED METADATA
// =============================================================================

#[test]
fn test_dangling_reference_is_dropped() {
    let tables = vec![
        Table::new("A")
            .with_field(Field::new("A", "ID", FieldType::Int).primary())
            .with_field(Field::new("A", "GONE_ID", FieldType::Int).references("GONE", "ID")),
    ];
    let schema = synthesize(tables).unwrap();
    let a = schema.root_type("A").unwrap();
    let names: Vec<&str> = a.fields().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["ID"]);
}

#[test]
fn test_tables_without_fields_are_skipped() {
    let tables = vec![
        Table::new("KEEP").with_field(Field::new("KEEP", "ID", FieldType::Int).primary()),
        Table::new("EMPTY"),
        Table::new("STRANDED")
            .with_field(Field::new("STRANDED", "X", FieldType::Int).references("GONE", "ID")),
        Table::new("CHAINED")
            .with_field(Field::new("CHAINED", "Y", FieldType::Int).references("STRANDED", "X")),
    ];
    let schema = synthesize(tables).unwrap();
    let roots: Vec<&str> = schema.root_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(roots, vec!["KEEP"]);
}

#[test]
fn test_no_tables_is_an_error() {
    assert!(matches!(synthesize(Vec::new()), Err(SchemaError::NoTables)));
    assert!(matches!(
        synthesize(vec![Table::new("EMPTY")]),
        Err(SchemaError::NoTables)
    ));
}

// =============================================================================
// NAMES
// =============================================================================

#[test]
fn test_escaped_names_do_not_collide() {
    let tables = vec![
        Table::new("A$B")
            .with_field(Field::new("A$B", "X$Y", FieldType::Int))
            .with_field(Field::new("A$B", "X__Y", FieldType::Int)),
        Table::new("A__B").with_field(Field::new("A__B", "ID", FieldType::Int)),
    ];
    let schema = synthesize(tables).unwrap();

    let roots: HashSet<&str> = schema.root_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(roots, HashSet::from(["A___B", "A__B"]));

    let object = schema.root_type("A___B").unwrap();
    assert_eq!(object.sql_table, "A$B");
    assert_eq!(object.field("X___Y").unwrap().sql_column.as_deref(), Some("X$Y"));
    assert_eq!(object.field("X__Y").unwrap().sql_column.as_deref(), Some("X__Y"));
}

#[test]
fn test_link_names_avoid_physical_columns() {
    let tables = vec![
        Table::new("CITY").with_field(Field::new("CITY", "ID", FieldType::Int).primary()),
        Table::new("PERSON")
            .with_field(Field::new("PERSON", "ID", FieldType::Int).primary())
            .with_field(Field::new("PERSON", "CITY_ID", FieldType::Int).references("CITY", "ID"))
            .with_field(Field::new("PERSON", "NAME", FieldType::String).with_ref(Ref::new(1)))
            .with_field(Field::new("PERSON", "link_CITY_ID", FieldType::String))
            .with_field(Field::new("PERSON", "link_1", FieldType::String)),
    ];
    let schema = synthesize(tables).unwrap();
    let person = schema.root_type("PERSON").unwrap();

    let fields: Vec<(&str, &str)> = person
        .fields()
        .map(|f| (f.name.as_str(), f.kind.type_name()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("ID", "Int"),
            ("link_CITY_ID_", "CITYConnection"),
            ("NAME", "String"),
            ("link_CITY_ID", "String"),
            ("link_1", "String"),
            ("link_1_", "EMULATED_PERSON_1"),
        ]
    );
    assert_eq!(
        person.field("link_CITY_ID").unwrap().sql_column.as_deref(),
        Some("link_CITY_ID")
    );
}

#[test]
fn test_emulated_type_names_avoid_table_names() {
    let tables = vec![
        Table::new("T")
            .with_field(Field::new("T", "ID", FieldType::Int).primary())
            .with_field(Field::new("T", "NAME", FieldType::String).with_ref(Ref::new(1))),
        Table::new("EMULATED_T_1")
            .with_field(Field::new("EMULATED_T_1", "ID", FieldType::Int).primary())
            .with_field(Field::new("EMULATED_T_1", "OTHER", FieldType::String)),
    ];
    let schema = synthesize(tables).unwrap();

    let table = schema.root_type("EMULATED_T_1").unwrap();
    assert_eq!(table.sql_table, "EMULATED_T_1");
    let names: Vec<&str> = table.fields().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["ID", "OTHER"]);

    let t = schema.root_type("T").unwrap();
    let FieldKind::Emulated(group) = &t.field("link_1").unwrap().kind else {
        panic!("link_1 must be an emulated object");
    };
    assert_eq!(group.name, "EMULATED_T_1_");
    assert_eq!(group.sql_table, "T");
    assert!(Arc::ptr_eq(
        group,
        schema.registry().object("EMULATED_T_1_").unwrap()
    ));
}

#[test]
fn test_root_type_is_named_tables() {
    let adapter = Arc::new(FixtureAdapter::new(Vec::new()));
    let graph = build(adapter.clone(), people_tables(), &NoProgress).unwrap();
    let executable = lower(Arc::new(graph), adapter).unwrap();
    let sdl = executable.sdl();
    assert!(sdl.contains(&format!("type {QUERY_TYPE} {{")), "{sdl}");
    assert!(sdl.contains("PERSON("), "{sdl}");
    assert!(sdl.contains("scalar Date"), "{sdl}");
}

// =============================================================================
// EMULATED GROUPS
// =============================================================================

#[test]
fn test_emulated_group_type() {
    let schema = synthesize(people_tables()).unwrap();
    let person = schema.root_type("PERSON").unwrap();

    let link = person.field("link_1").unwrap();
    assert!(!link.non_null);
    assert_eq!(link.description, "names");
    assert!(link.args.iter().all(|a| a.name == "where" || a.name == "order"));

    let FieldKind::Emulated(group) = &link.kind else {
        panic!("link_1 must be an emulated object");
    };
    assert_eq!(group.name, "EMULATED_PERSON_1");
    assert_eq!(group.description.as_deref(), Some("Naming"));
    let names: Vec<&str> = group.fields().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["NAME", "NICK"]);
}

#[test]
fn test_empty_emulated_group_is_suppressed() {
    let tables = vec![
        Table::new("A")
            .with_field(Field::new("A", "ID", FieldType::Int).primary())
            .with_field(
                Field::new("A", "GONE_ID", FieldType::Int)
                    .references("GONE", "ID")
                    .with_ref(Ref::new(5)),
            ),
    ];
    let schema = synthesize(tables).unwrap();
    assert!(schema.registry().object("EMULATED_A_5").is_none());
    assert!(schema.root_type("A").unwrap().field("link_5").is_none());
}

#[test]
fn test_group_without_primary_field_fails() {
    let tables = vec![
        Table::new("LOG")
            .with_field(Field::new("LOG", "MESSAGE", FieldType::String).with_ref(Ref::new(1))),
    ];
    match synthesize(tables) {
        Err(SchemaError::MissingPrimaryKey { table }) => assert_eq!(table, "LOG"),
        other => panic!("expected MissingPrimaryKey, got {other:?}"),
    }
}

// =============================================================================
// INPUT TYPES
// =============================================================================

#[test]
fn test_operators_follow_field_types() {
    let schema = synthesize(people_tables()).unwrap();
    let registry = schema.registry();

    let field_names = |name: &str| -> Vec<String> {
        registry
            .input(name)
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect()
    };

    assert_eq!(field_names("CONTAINS_PERSON"), vec!["NAME", "NICK"]);
    assert_eq!(field_names("BEGINS_OR_ENDS_PERSON"), vec!["NAME", "NICK"]);
    assert_eq!(field_names("GREATER_OR_LESS_PERSON"), vec!["ID", "BORN", "CITY_ID"]);
    assert!(!field_names("EQUALS_PERSON").contains(&"PHOTO".to_string()));

    let empty: Vec<&str> = registry
        .enum_type("IS_EMPTY_FIELDS_PERSON")
        .unwrap()
        .items
        .iter()
        .map(|i| i.name.as_str())
        .collect();
    assert_eq!(empty, vec!["NAME", "NICK", "PHOTO"]);

    let filter = field_names("FILTER_PERSON");
    for key in ["equals", "contains", "begins", "ends", "greater", "less", "isNull", "isEmpty", "or", "and", "not"] {
        assert!(filter.contains(&key.to_string()), "missing {key}");
    }
}

#[test]
fn test_is_null_absent_when_all_fields_required() {
    let schema = synthesize(people_tables()).unwrap();
    let registry = schema.registry();

    let filter = registry.input("FILTER_CITY").unwrap();
    assert!(filter.field("isNull").is_some());
    let nullable: Vec<&str> = registry
        .enum_type("IS_NULL_FIELDS_CITY")
        .unwrap()
        .items
        .iter()
        .map(|i| i.name.as_str())
        .collect();
    assert_eq!(nullable, vec!["POPULATION"]);

    let tables = vec![
        Table::new("T")
            .with_field(Field::new("T", "ID", FieldType::Int).primary())
            .with_field(Field::new("T", "N", FieldType::Int).non_null()),
    ];
    let schema = synthesize(tables).unwrap();
    let registry = schema.registry();
    assert!(registry.input("FILTER_T").unwrap().field("isNull").is_none());
    assert!(registry.enum_type("IS_NULL_FIELDS_T").is_none());
    assert!(registry.input("CONTAINS_T").is_none());
    assert!(registry.input("FILTER_T").unwrap().field("contains").is_none());
}

#[test]
fn test_sorting_input() {
    let schema = synthesize(people_tables()).unwrap();
    let registry = schema.registry();
    let sorting = registry.input("SORTING_CITY").unwrap();
    let fields: Vec<&str> = sorting.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["asc", "desc"]);
    assert_eq!(registry.enum_type("SORTING_FIELDS_CITY").unwrap().items.len(), 3);
}

#[test]
fn test_link_arguments_target_referenced_table() {
    let schema = synthesize(people_tables()).unwrap();
    let person = schema.root_type("PERSON").unwrap();
    let link = person.field("link_CITY_ID").unwrap();
    let args: Vec<(String, String)> = link
        .args
        .iter()
        .map(|a| (a.name.clone(), a.ty.to_string()))
        .collect();
    assert!(args.contains(&("where".to_string(), "FILTER_CITY".to_string())));
    assert!(args.contains(&("order".to_string(), "[SORTING_CITY]".to_string())));
    assert!(args.contains(&("first".to_string(), "Int".to_string())));
    assert_eq!(link.description, "CITY_ID");
}

// =============================================================================
// PROGRESS
// =============================================================================

#[tokio::test]
async fn test_progress_ticks_stay_within_total() {
    let engine = NlpSchema::new(Arc::new(FixtureAdapter::new(people_tables())));
    let progress = RecordingProgress::default();
    engine.create_schema(Some(&progress)).await.unwrap();

    let ticks = progress.ticks.lock().unwrap();
    assert_eq!(ticks.first().unwrap().0, "Reading database schema...");
    assert_eq!(ticks.last().unwrap().0, "Done.");
    assert!(ticks.iter().any(|(m, _)| m == "Creating GraphQL type: PERSON"));
    let total: f64 = ticks.iter().map(|(_, step)| step).sum();
    assert!((total - BUILD_PROGRESS_TOTAL).abs() < 1e-6, "total {total}");
    assert!(progress.terminated.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_metadata_failure_terminates_progress() {
    let engine = NlpSchema::new(Arc::new(FixtureAdapter::failing()));
    let progress = RecordingProgress::default();
    let result = engine.create_schema(Some(&progress)).await;
    assert!(matches!(result, Err(SchemaError::Metadata(_))));
    assert!(progress.terminated.lock().unwrap().is_some());
}
