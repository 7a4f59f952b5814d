use chrono::{TimeZone, Utc};
use quarry::metrics::{FormulaFunction, IndexerValue, RollupContext};
use quarry::mql::MAX_DEPTH;
use quarry::prelude::*;
use quarry::{MetricsError, MqlError};

fn tag(name: &str, op: Op, value: impl Into<Scalar>) -> ConditionGroup {
    Condition::binary(Column::new(name).unwrap(), op, Expr::lit(value))
        .unwrap()
        .into()
}

fn duration() -> Timeseries {
    Timeseries::new(Metric::from_public_name("transaction.duration"), "sum").unwrap()
}

fn round_trip(mql: &str) -> MetricsExpr {
    let parsed = parse_mql(mql).unwrap();
    let reparsed = parse_mql(&parsed.to_mql()).unwrap();
    assert_eq!(parsed, reparsed, "{mql:?} did not survive a print/parse round trip");
    parsed
}

#[test]
fn test_parse_arithmetic_with_groupby() {
    let parsed = parse_mql("sum(transaction.duration){} by (project_id) / 1000").unwrap();

    let grouped = duration().set_groupby(vec![col("project_id").unwrap()]).unwrap();
    let expected = Formula::arithmetic(ArithmeticOperator::Divide, grouped, 1000i64).unwrap();
    assert_eq!(parsed, MetricsExpr::Formula(expected));

    insta::assert_snapshot!(parsed.to_mql(), @"(sum(transaction.duration) by (project_id) / 1000)");
    assert_eq!(parse_mql(&parsed.to_mql()).unwrap(), parsed);
}

#[test]
fn test_parse_filters() {
    let parsed = parse_mql(
        r#"max(d:transactions/duration@millisecond){environment:prod AND !release:["a", "b"] AND transaction:"/api/*"} by transaction"#,
    )
    .unwrap();

    let expected = Timeseries::new(Metric::from_mri("d:transactions/duration@millisecond"), "max")
        .unwrap()
        .set_filters(vec![BooleanCondition::and(vec![
            tag("environment", Op::Eq, "prod"),
            tag("release", Op::NotIn, vec!["a", "b"]),
            tag("transaction", Op::Like, "/api/*"),
        ])
        .unwrap()
        .into()])
        .unwrap()
        .set_groupby(vec![col("transaction").unwrap()])
        .unwrap();
    assert_eq!(parsed, MetricsExpr::Timeseries(expected));
}

#[test]
fn test_outer_filters_extend_inner_ones() {
    let parsed = parse_mql(r#"sum(foo{env:"prod"} by release){team:"a"} by project_id"#).unwrap();
    let MetricsExpr::Timeseries(ts) = &parsed else {
        panic!("expected a timeseries, got {parsed:?}");
    };
    assert_eq!(ts.filters, vec![tag("team", Op::Eq, "a"), tag("env", Op::Eq, "prod")]);
    assert_eq!(ts.groupby, vec![col("project_id").unwrap(), col("release").unwrap()]);
}

#[test]
fn test_round_trips() {
    for mql in [
        "sum(transaction.duration)",
        "quantiles(0.5, 0.99)(transaction.duration){environment:\"prod\"} by (transaction, status_code)",
        "(sum(foo) + sum(bar)) * 2",
        "sum(foo) - sum(bar) - sum(baz)",
        r#"count(foo){(env:"prod" OR !env:"dev") AND team:"a\"b"}"#,
        "apdex(sum(transaction.duration), 300)",
        "topK(10)(sum(transaction.duration))",
        "-sum(foo)",
        "max(`d:custom/value@none`)",
    ] {
        round_trip(mql);
    }
}

#[test]
fn test_float_coefficients_in_exponent_form_round_trip() {
    for coefficient in [1e16, 1e-7, -2.5e-12] {
        let f = Formula::arithmetic(ArithmeticOperator::Multiply, duration(), coefficient).unwrap();
        let expr = MetricsExpr::Formula(f);
        let printed = expr.to_mql();
        assert_eq!(parse_mql(&printed).unwrap(), expr, "{printed:?} did not parse back");
    }
    insta::assert_snapshot!(
        Formula::arithmetic(ArithmeticOperator::Multiply, duration(), 1e16).unwrap().to_mql(),
        @"(sum(transaction.duration) * 1e16)"
    );
}

#[test]
fn test_filters_that_would_print_differently_are_rejected() {
    let filter = |op: Op, value: Scalar| duration().set_filters(vec![tag("env", op, value)]);

    assert!(matches!(filter(Op::Eq, Scalar::Int(1)), Err(MetricsError::InvalidTimeseries(_))));
    assert!(matches!(filter(Op::Like, "prod".into()), Err(MetricsError::InvalidTimeseries(_))));
    assert!(matches!(filter(Op::Eq, "prod*".into()), Err(MetricsError::InvalidTimeseries(_))));

    for (op, value) in [
        (Op::Eq, Scalar::from("1")),
        (Op::Like, "prod*".into()),
        (Op::NotLike, "prod*".into()),
        (Op::Neq, "pro*d".into()),
        (Op::Eq, "literal\\*".into()),
        (Op::In, Scalar::List(vec!["a".into(), "b*".into()])),
    ] {
        let expr = MetricsExpr::Timeseries(filter(op, value).unwrap());
        assert_eq!(parse_mql(&expr.to_mql()).unwrap(), expr, "{} changed on reparse", expr.to_mql());
    }
}

#[test]
fn test_long_operator_chain_is_too_deep() {
    let long = vec!["sum(foo)"; 3000].join(" + ");
    assert_eq!(parse_mql(&long), Err(MqlError::TooDeep { max: MAX_DEPTH }));

    let fits = vec!["sum(foo)"; MAX_DEPTH + 1].join(" + ");
    let MetricsExpr::Formula(f) = parse_mql(&fits).unwrap() else {
        panic!("expected a formula");
    };
    assert_eq!(f.function, FormulaFunction::Arithmetic(ArithmeticOperator::Plus));

    let over = vec!["sum(foo)"; MAX_DEPTH + 2].join(" * ");
    assert_eq!(parse_mql(&over), Err(MqlError::TooDeep { max: MAX_DEPTH }));
}

#[test]
fn test_quoted_string_function_argument() {
    let parsed = parse_mql(r#"topK(sum(transaction.duration), "transaction")"#).unwrap();
    let expected = Formula::named("topK", vec![duration().into(), "transaction".into()]).unwrap();
    assert_eq!(parsed, MetricsExpr::Formula(expected));
    round_trip(r#"topK(sum(transaction.duration), "transaction")"#);

    assert!(matches!(parse_mql(r#"sum(foo) + "x""#), Err(MqlError::Invalid(_))));
    assert!(matches!(parse_mql(r#"apdex(sum(foo), -"x")"#), Err(MqlError::Invalid(_))));
}

#[test]
fn test_curried_function_over_metric_is_an_aggregate() {
    let parsed = parse_mql("quantiles(0.5)(foo)").unwrap();
    let expected = Timeseries::new(Metric::from_public_name("foo"), "quantiles")
        .unwrap()
        .set_aggregate("quantiles", vec![Scalar::Float(0.5)])
        .unwrap();
    assert_eq!(parsed, MetricsExpr::Timeseries(expected));
}

#[test]
fn test_errors() {
    assert!(matches!(parse_mql("sum(foo"), Err(MqlError::Syntax { .. })));
    assert!(matches!(parse_mql("sum(foo){env:$env}"), Err(MqlError::Unsupported(_))));
    assert!(matches!(parse_mql("foo"), Err(MqlError::Invalid(_))));
    assert!(matches!(parse_mql("`d:custom/value@none`"), Err(MqlError::Invalid(_))));

    let deep = format!("{}sum(foo){}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
    assert_eq!(parse_mql(&deep), Err(MqlError::TooDeep { max: MAX_DEPTH }));
}

fn context() -> MqlContext {
    MqlContext {
        start: "2023-01-02T03:04:05+00:00".to_string(),
        end: "2023-01-16T03:04:05+00:00".to_string(),
        rollup: RollupContext {
            orderby: None,
            granularity: None,
            interval: Some(3600),
            with_totals: None,
        },
        scope: MetricsScope::new(vec![1], vec![11]).with_use_case_id("transactions"),
        limit: Some(100),
        offset: None,
        indexer_mappings: [("transaction.duration".to_string(), IndexerValue::Int(9))]
            .into_iter()
            .collect(),
    }
}

#[test]
fn test_from_mql_with_context() {
    let query = MetricsQuery::from_mql("sum(transaction.duration) by transaction", Some(&context())).unwrap();

    assert_eq!(query.start, Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()));
    assert_eq!(query.rollup.and_then(|r| r.granularity), Some(3600));
    assert_eq!(query.limit.map(|l| l.get()), Some(100));
    assert!(query.validate().is_ok());

    let without_context = MetricsQuery::from_mql("sum(transaction.duration)", None).unwrap();
    assert!(without_context.start.is_none());
    assert!(without_context.validate().is_err());
}

#[test]
fn test_serialize_to_mql() {
    let query = MetricsQuery::from_mql(r#"sum(transaction.duration){env:"prod"}"#, Some(&context())).unwrap();
    let body = query.serialize_to_mql().unwrap();

    assert_eq!(body["mql"], r#"sum(transaction.duration){env:"prod"}"#);
    assert_eq!(body["mql_context"]["start"], "2023-01-02T03:04:05+00:00");
    assert_eq!(body["mql_context"]["rollup"]["granularity"], 3600);
    assert!(body["mql_context"]["rollup"]["with_totals"].is_null());
    assert_eq!(body["mql_context"]["scope"]["org_ids"][0], 1);
    assert_eq!(body["mql_context"]["indexer_mappings"]["transaction.duration"], 9);

    let restored = MetricsQuery::from_mql(
        body["mql"].as_str().unwrap(),
        Some(&serde_json::from_value(body["mql_context"].clone()).unwrap()),
    )
    .unwrap();
    assert_eq!(restored, query);
}

#[test]
fn test_metric_with_only_an_id_cannot_be_printed() {
    let ts = Timeseries::new(Metric::from_id(123), "sum").unwrap();
    let query = MetricsQuery::new(ts).apply_context(&context()).unwrap();
    assert!(matches!(query.serialize_to_mql(), Err(MetricsError::InvalidMetric(_))));
}
