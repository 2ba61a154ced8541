//! End-to-end execution through the lowered schema.

use super::common::*;
use async_graphql::Request;
use pretty_assertions::assert_eq;
use relgraph_schema::{NlpSchema, SchemaHandle, SchemaState};
use serde_json::{Value, json};
use std::sync::Arc;

fn person_rows() -> Vec<Value> {
    vec![
        json!({"t0_pk": 1, "t0_c0": "Ann", "t1_pk": 7, "t1_c0": "Oslo"}),
        json!({"t0_pk": 2, "t0_c0": "Ann", "t1_pk": null, "t1_c0": null}),
    ]
}

async fn run(adapter: Arc<FixtureAdapter>, query: &str) -> async_graphql::Response {
    let engine = NlpSchema::new(adapter);
    let schema = engine.create_executable(None).await.unwrap();
    schema.execute(Request::new(query).data(())).await
}

#[tokio::test]
async fn test_root_query_with_link() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()).with_rows(person_rows()));
    let response = run(
        adapter.clone(),
        r#"{
            PERSON(first: 1, where: {equals: {NAME: "Ann"}}) {
                total
                edges {
                    cursor
                    node {
                        NAME
                        link_CITY_ID { nodes { NAME } }
                    }
                }
                pageInfo { hasNextPage }
            }
        }"#,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({
            "PERSON": {
                "total": 2,
                "edges": [{
                    "cursor": "YXJyYXljb25uZWN0aW9uOjA=",
                    "node": {"NAME": "Ann", "link_CITY_ID": {"nodes": [{"NAME": "Oslo"}]}}
                }],
                "pageInfo": {"hasNextPage": true}
            }
        })
    );

    assert_eq!(
        adapter.statements(),
        vec![
            r#"SELECT t0."ID" AS "t0_pk", t0."NAME" AS "t0_c0", t1."ID" AS "t1_pk", t1."NAME" AS "t1_c0" FROM "PERSON" t0 LEFT JOIN "CITY" t1 ON t0."CITY_ID" = t1."ID" WHERE (t0."NAME" = 'Ann')"#
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_aliases_key_hydrated_values() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()).with_rows(vec![
        json!({"t0_pk": 1, "t0_c0": "Oslo", "t0_c1": "Oslo"}),
    ]));
    let response = run(
        adapter,
        r#"{ people: CITY { nodes { a: NAME b: NAME } } }"#,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({"people": {"nodes": [{"a": "Oslo", "b": "Oslo"}]}})
    );
}

#[tokio::test]
async fn test_filter_on_unknown_enum_value_is_rejected() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()));
    let response = run(adapter.clone(), r#"{ CITY(where: {isNull: NAME}) { total } }"#).await;
    assert_eq!(response.errors.len(), 1);
    assert!(adapter.statements().is_empty());
}

#[tokio::test]
async fn test_order_and_variables() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()));
    let engine = NlpSchema::new(adapter.clone());
    let schema = engine.create_executable(None).await.unwrap();

    let request = Request::new(
        r#"query ($min: Int) {
            CITY(where: {greater: {POPULATION: $min}}, order: [{desc: POPULATION}, {asc: NAME}]) {
                total
            }
        }"#,
    )
    .variables(async_graphql::Variables::from_json(json!({"min": 1000})))
    .data(());
    let response = schema.execute(request).await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap(), json!({"CITY": {"total": 0}}));
    assert_eq!(
        adapter.statements(),
        vec![
            r#"SELECT t0."ID" AS "t0_pk" FROM "CITY" t0 WHERE (t0."POPULATION" > 1000) ORDER BY t0."POPULATION" DESC, t0."NAME" ASC"#
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_emulated_group_resolves_from_the_same_row() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()).with_rows(vec![
        json!({"t0_pk": 1, "t1_pk": 1, "t1_c0": "Ann", "t1_c1": "annie"}),
    ]));
    let response = run(
        adapter.clone(),
        r#"{ PERSON { nodes { link_1 { NAME NICK } } } }"#,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({"PERSON": {"nodes": [{"link_1": {"NAME": "Ann", "NICK": "annie"}}]}})
    );
    assert!(adapter.statements()[0].contains(r#"LEFT JOIN "PERSON" t1 ON t0."ID" = t1."ID""#));
}

#[tokio::test]
async fn test_filtered_out_group_is_null() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()).with_rows(vec![
        json!({"t0_pk": 1, "t0_c0": 1, "t1_pk": null, "t1_c0": null}),
    ]));
    let response = run(
        adapter.clone(),
        r#"{ PERSON { nodes { ID link_1(where: {equals: {NAME: "Bob"}}) { NAME } } } }"#,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data.into_json().unwrap(),
        json!({"PERSON": {"nodes": [{"ID": 1, "link_1": null}]}})
    );
    assert!(adapter.statements()[0].contains(r#"ON t0."ID" = t1."ID" AND ((t1."NAME" = 'Bob'))"#));
}

#[tokio::test]
async fn test_handle_serves_after_rebuild() {
    let adapter = Arc::new(FixtureAdapter::new(people_tables()));
    let engine = NlpSchema::new(adapter);
    let handle = SchemaHandle::new();

    let response = handle.execute(Request::new("{ CITY { total } }").data(())).await;
    assert_eq!(response.errors.len(), 1);

    handle.rebuild(&engine, None).await.unwrap();
    assert!(matches!(handle.state().await, SchemaState::Ready(_)));

    let response = handle.execute(Request::new("{ CITY { total } }").data(())).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap(), json!({"CITY": {"total": 0}}));
}

#[tokio::test]
async fn test_failed_rebuild_makes_handle_unavailable() {
    let engine = NlpSchema::new(Arc::new(FixtureAdapter::failing()));
    let handle = SchemaHandle::new();
    assert!(handle.rebuild(&engine, None).await.is_err());
    assert!(matches!(handle.state().await, SchemaState::Failed(_)));

    let response = handle.execute(Request::new("{ __typename }").data(())).await;
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("connection refused"));
}
