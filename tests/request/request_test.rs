use chrono::{TimeZone, Utc};
use quarry::ast::RequestError;
use quarry::prelude::*;
use serde_json::Value;

fn events_query() -> Query {
    Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(vec![Condition::binary(
            Column::new("project_id").unwrap(),
            Op::Eq,
            Expr::lit(1),
        )
        .unwrap()
        .into()])
}

fn metrics_query() -> MetricsQuery {
    let ts = Timeseries::new(Metric::from_public_name("transaction.duration"), "sum").unwrap();
    MetricsQuery::new(ts)
        .set_start(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap())
        .set_end(Utc.with_ymd_and_hms(2023, 1, 16, 3, 4, 5).unwrap())
        .set_rollup(Rollup::totals(None, Some(3600)).unwrap())
        .set_scope(MetricsScope::new(vec![1], vec![11]))
}

#[test]
fn test_events_request_body() {
    let request = Request::new("events", "my_app", events_query())
        .with_flags(Flags::default().set("debug", true).unwrap())
        .with_parent_api("/api/0/events")
        .with_tenant_id("organization_id", 1)
        .with_tenant_id("referrer", "test");

    insta::assert_snapshot!(
        request.serialize().unwrap(),
        @r#"{"app_id":"my_app","dataset":"events","debug":true,"parent_api":"/api/0/events","query":"MATCH (events) SELECT title WHERE project_id = 1","tenant_ids":{"organization_id":1,"referrer":"test"}}"#
    );
}

#[test]
fn test_unset_flags_are_left_out() {
    let body: Value = serde_json::from_str(
        &Request::new("events", "my_app", events_query()).serialize().unwrap(),
    )
    .unwrap();
    assert_eq!(body["parent_api"], "<unknown>");
    assert!(body.get("debug").is_none());
    assert!(body.get("turbo").is_none());
    assert_eq!(body["tenant_ids"], serde_json::json!({}));
}

#[test]
fn test_metrics_request_body() {
    let request = Request::new("generic_metrics", "my_app", metrics_query());
    let body: Value = serde_json::from_str(&request.serialize().unwrap()).unwrap();

    assert_eq!(body["query"]["mql"], "sum(transaction.duration)");
    assert_eq!(body["query"]["mql_context"]["rollup"]["with_totals"], "True");
    assert_eq!(body["query"]["mql_context"]["end"], "2023-01-16T03:04:05+00:00");
}

#[test]
fn test_invalid_envelope() {
    let empty_dataset = Request::new("", "my_app", events_query());
    assert!(matches!(empty_dataset.serialize(), Err(RequestError::InvalidRequest(_))));

    let bad_app = Request::new("events", "my app", events_query());
    assert!(matches!(bad_app.validate(), Err(RequestError::InvalidRequest(_))));

    assert!(matches!(
        Flags::default().set("fast", true),
        Err(RequestError::InvalidFlag(name)) if name == "fast"
    ));
}

#[test]
fn test_invalid_query_fails_the_request() {
    let no_select = Query::new(Entity::new("events").unwrap());
    assert!(matches!(
        Request::new("events", "my_app", no_select).serialize(),
        Err(RequestError::Validation(_))
    ));

    let unscoped = MetricsQuery {
        scope: None,
        ..metrics_query()
    };
    assert!(matches!(
        Request::new("generic_metrics", "my_app", unscoped).serialize(),
        Err(RequestError::Metrics(_))
    ));
}

#[test]
fn test_print_is_pretty() {
    let printed = Request::new("events", "my_app", events_query()).print().unwrap();
    assert!(printed.starts_with("{\n  \"app_id\": \"my_app\","));
}

#[test]
fn test_delete_request_body() {
    let delete = DeleteQuery::new("search_issues")
        .with_condition("project_id", [1])
        .with_condition("occurrence_id", ["1234"]);
    let request = Request::new("search_issues", "my_app", delete);
    let body: Value = serde_json::from_str(&request.serialize().unwrap()).unwrap();

    assert_eq!(
        body["query"],
        serde_json::json!({"columns": {"project_id": [1], "occurrence_id": ["1234"]}})
    );
    assert_eq!(body["dataset"], "search_issues");
}

#[test]
fn test_delete_request_without_conditions_is_rejected() {
    let request = Request::new("search_issues", "my_app", DeleteQuery::new("search_issues"));
    let err = request.serialize().unwrap_err();
    assert!(matches!(err, RequestError::Validation(_)));
    assert!(err.to_string().contains("column conditions cannot be empty"));
}
