use chrono::{TimeZone, Utc};
use quarry::prelude::*;
use std::sync::Arc;

fn cond(name: &str, op: Op, rhs: impl Into<Scalar>) -> ConditionGroup {
    Condition::binary(Column::new(name).unwrap(), op, Expr::lit(rhs))
        .unwrap()
        .into()
}

fn schema() -> Arc<EntityModel> {
    Arc::new(EntityModel::new(
        vec![
            ColumnModel::new("required1", true),
            ColumnModel::new("required2", true),
            ColumnModel::new("title", false),
        ],
        Some("time"),
    ))
}

fn bounded_where() -> Vec<ConditionGroup> {
    vec![
        cond("required1", Op::In, vec![1, 2]),
        cond("required2", Op::Eq, "x"),
        cond("time", Op::Gte, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()),
        cond("time", Op::Lt, Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap()),
    ]
}

#[test]
fn test_required_columns_scenario() {
    let query = Query::new(Entity::new("events").unwrap().with_data_model(schema()))
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(bounded_where());

    assert!(query.validate().is_ok());
    insta::assert_snapshot!(
        query.serialize(),
        @"MATCH (events) SELECT title WHERE required1 IN (1, 2) AND required2 = 'x' AND time >= toDateTime('2021-01-01T00:00:00.000000') AND time < toDateTime('2021-02-01T00:00:00.000000')"
    );
}

#[test]
fn test_every_clause_in_order() {
    let query = Query::new(Entity::new("events").unwrap())
        .set_select(vec![
            col("title").unwrap(),
            func_as("count", vec![], "count").unwrap(),
        ])
        .unwrap()
        .set_groupby(vec![col("title").unwrap()])
        .unwrap()
        .set_array_join(vec![Column::new("exception_frames").unwrap()])
        .set_where(vec![cond("project_id", Op::Eq, 1)])
        .set_having(vec![cond("count", Op::Gt, 1)])
        .set_orderby(vec![OrderBy::desc(col("count").unwrap()).unwrap()])
        .set_limitby(LimitBy::new(vec![Column::new("title").unwrap()], 5).unwrap())
        .set_limit(10)
        .unwrap()
        .set_offset(20)
        .set_granularity(3600)
        .unwrap()
        .set_totals(true);

    insta::assert_snapshot!(
        query.serialize(),
        @"MATCH (events) SELECT title, count() AS count BY title ARRAY JOIN exception_frames WHERE project_id = 1 HAVING count > 1 ORDER BY count DESC LIMIT 5 BY title LIMIT 10 OFFSET 20 GRANULARITY 3600 TOTALS True"
    );

    insta::assert_snapshot!(query.print(), @r"
    MATCH (events)
    SELECT title, count() AS count
    BY title
    ARRAY JOIN exception_frames
    WHERE project_id = 1
    HAVING count > 1
    ORDER BY count DESC
    LIMIT 5 BY title
    LIMIT 10
    OFFSET 20
    GRANULARITY 3600
    TOTALS True
    ");
}

#[test]
fn test_join_columns_are_qualified() {
    let events = Entity::new("events").unwrap().with_alias("e").unwrap();
    let transactions = Entity::new("transactions").unwrap().with_alias("t").unwrap();
    let join = Join::new(vec![Relationship::new(events.clone(), "grouped", transactions.clone()).unwrap()])
        .unwrap();

    let event_id = Column::new("event_id").unwrap().with_entity(events.clone()).unwrap();
    let title = Column::new("title").unwrap().with_entity(transactions).unwrap();
    let project = Column::new("project_id").unwrap().with_entity(events).unwrap();

    let query = Query::new(join)
        .set_select(vec![event_id.into(), title.into()])
        .unwrap()
        .set_where(vec![Condition::binary(project, Op::Eq, Expr::lit(1)).unwrap().into()]);

    assert!(query.validate_structure().is_ok());
    insta::assert_snapshot!(
        query.serialize(),
        @"MATCH (e: events) -[grouped]-> (t: transactions) SELECT e.event_id, t.title WHERE e.project_id = 1"
    );
}

#[test]
fn test_subquery_prints_on_one_line() {
    let inner = Query::new(Entity::new("events").unwrap())
        .set_select(vec![func_as("count", vec![], "count").unwrap(), col("title").unwrap()])
        .unwrap()
        .set_groupby(vec![col("title").unwrap()])
        .unwrap();
    let outer = Query::new(inner)
        .set_select(vec![func_as("avg", vec![col("count").unwrap()], "avg_count").unwrap()])
        .unwrap();

    assert!(outer.validate_structure().is_ok());
    insta::assert_snapshot!(outer.print(), @r"
    MATCH { MATCH (events) SELECT count() AS count, title BY title }
    SELECT avg(count) AS avg_count
    ");
}

#[test]
fn test_subquery_column_must_come_from_inner_select() {
    let inner = Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap();
    let outer = Query::new(inner)
        .set_select(vec![col("event_id").unwrap()])
        .unwrap();
    assert!(outer.validate_structure().is_err());
}

#[test]
fn test_strings_and_aliases_are_escaped() {
    let query = Query::new(Entity::new("events").unwrap())
        .set_select(vec![
            func_as("quantile", vec![col("duration").unwrap()], "p 50").unwrap(),
            func_as("count", vec![], "total").unwrap(),
        ])
        .unwrap()
        .set_where(vec![cond("title", Op::Eq, "it's a\\path\nnext")]);

    insta::assert_snapshot!(
        query.serialize(),
        @r"MATCH (events) SELECT quantile(duration) AS `p 50`, count() AS total WHERE title = 'it\'s a\\path\nnext'"
    );
}

#[test]
fn test_control_characters_are_escaped() {
    let query = Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(vec![cond("title", Op::Eq, "nul\0 esc\x1b del\x7f")]);

    insta::assert_snapshot!(
        query.serialize(),
        @r"MATCH (events) SELECT title WHERE title = 'nul\x00 esc\x1b del\x7f'"
    );
}

#[test]
fn test_storage_match() {
    let storage = Storage::new("metric_summaries")
        .unwrap()
        .with_sample(0.1)
        .unwrap()
        .with_data_model(schema());
    let query = Query::new(storage)
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(bounded_where());

    assert!(query.validate().is_ok());
    insta::assert_snapshot!(
        query.serialize(),
        @"MATCH STORAGE(metric_summaries SAMPLE 0.100000) SELECT title WHERE required1 IN (1, 2) AND required2 = 'x' AND time >= toDateTime('2021-01-01T00:00:00.000000') AND time < toDateTime('2021-02-01T00:00:00.000000')"
    );

    let unbounded = query.set_where(vec![cond("required1", Op::Eq, 1)]);
    let err = unbounded.validate_schema().unwrap_err();
    assert_eq!(err.entity, "metric_summaries");
}

#[test]
fn test_mixed_connectives_get_parentheses() {
    let or = BooleanCondition::or(vec![cond("a", Op::Eq, 1), cond("b", Op::Eq, 2)]).unwrap();
    let query = Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(vec![cond("c", Op::Eq, 3), or.into()]);
    insta::assert_snapshot!(
        query.serialize(),
        @"MATCH (events) SELECT title WHERE c = 3 AND (a = 1 OR b = 2)"
    );
}

#[test]
fn test_setters_do_not_mutate() {
    let base = Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap();
    let limited = base.set_limit(10).unwrap();

    assert_eq!(base.limit(), None);
    assert_eq!(limited.limit().map(|l| l.get()), Some(10));
    assert!(limited.shares_select_with(&base));
    assert_ne!(base, limited);
}

#[test]
fn test_structural_failures() {
    let no_select = Query::new(Entity::new("events").unwrap());
    assert!(no_select.validate_structure().is_err());

    let totals_without_groupby = Query::new(Entity::new("events").unwrap())
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_totals(true);
    assert!(totals_without_groupby.validate_structure().is_err());

    assert!(Column::new("1title").is_err());
    assert!(Query::new(Entity::new("events").unwrap()).set_limit(0).is_err());
    assert!(Query::new(Entity::new("events").unwrap()).set_limit(10_001).is_err());
}
