use chrono::{TimeZone, Utc};
use quarry::prelude::*;
use quarry::validation::schema::SchemaViolation;
use quarry::{validate_required_columns, SchemaError};
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

fn start() -> Scalar {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap().into()
}

fn end() -> Scalar {
    Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap().into()
}

fn query(conditions: Vec<ConditionGroup>) -> Query {
    Query::new(Entity::new("events").unwrap().with_data_model(schema()))
        .set_select(vec![col("title").unwrap()])
        .unwrap()
        .set_where(conditions)
}

fn schema_error(q: &Query) -> SchemaError {
    match q.validate() {
        Err(ValidationError::Schema(err)) => err,
        other => panic!("expected a schema error, got {other:?}"),
    }
}

#[test]
fn test_missing_required_column_is_named() {
    let q = query(vec![
        cond("required1", Op::In, vec![1, 2]),
        cond("time", Op::Gte, start()),
        cond("time", Op::Lt, end()),
    ]);
    let err = schema_error(&q);
    assert_eq!(err.missing_columns(), vec!["required2"]);
    assert_eq!(
        err.to_string(),
        "events: where clause is missing required condition(s) on column(s) 'required2'"
    );
}

#[test]
fn test_adding_the_missing_condition_passes() {
    let partial = vec![
        cond("required1", Op::Eq, 1),
        cond("time", Op::Gte, start()),
        cond("time", Op::Lt, end()),
    ];
    assert!(query(partial.clone()).validate_schema().is_err());

    let mut complete = partial;
    complete.push(cond("required2", Op::In, vec!["x", "y"]));
    assert!(query(complete).validate().is_ok());
}

#[test]
fn test_open_time_range_fails() {
    let open = vec![
        cond("required1", Op::Eq, 1),
        cond("required2", Op::Eq, "x"),
        cond("time", Op::Gte, start()),
    ];
    let err = schema_error(&query(open.clone()));
    assert_eq!(
        err.violations,
        vec![SchemaViolation::MissingTimeBounds {
            column: "time".to_string(),
            ops: vec![Op::Lt],
        }]
    );

    let mut closed = open;
    closed.push(cond("time", Op::Lt, end()));
    assert!(query(closed).validate().is_ok());
}

#[test]
fn test_all_violations_reported_together() {
    let q = query(vec![cond("bogus", Op::Eq, 1)]);
    let err = schema_error(&q);
    assert_eq!(err.violations.len(), 3);
    assert_eq!(
        err.to_string(),
        "events: where clause is missing required condition(s) on column(s) 'required1', 'required2'; \
         where clause is missing required >=, < condition(s) on column 'time'; \
         unknown column(s) 'bogus'"
    );
}

#[test]
fn test_empty_where() {
    let err = schema_error(&query(vec![]));
    assert_eq!(err.violations, vec![SchemaViolation::EmptyWhere]);
}

#[test]
fn test_conditions_under_or_do_not_count() {
    let either = BooleanCondition::or(vec![
        cond("required2", Op::Eq, "x"),
        cond("required2", Op::Eq, "y"),
    ])
    .unwrap();
    let conditions = vec![
        cond("required1", Op::Eq, 1),
        either.into(),
        cond("time", Op::Gte, start()),
        cond("time", Op::Lt, end()),
    ];
    assert_eq!(schema_error(&query(conditions.clone())).missing_columns(), vec!["required2"]);

    // The same alternatives folded into an IN satisfy the requirement.
    assert!(query(conditions).optimize_where().validate().is_ok());
}

#[test]
fn test_nested_and_counts() {
    let both = BooleanCondition::and(vec![
        cond("required1", Op::Eq, 1),
        cond("required2", Op::Eq, "x"),
    ])
    .unwrap();
    let q = query(vec![
        both.into(),
        cond("time", Op::Gte, start()),
        cond("time", Op::Lt, end()),
    ]);
    assert!(q.validate().is_ok());
}

#[test]
fn test_join_checks_each_modelled_entity() {
    let events = Entity::new("events")
        .unwrap()
        .with_alias("e")
        .unwrap()
        .with_data_model(schema());
    let groups = Entity::new("groupedmessage")
        .unwrap()
        .with_alias("g")
        .unwrap()
        .with_data_model(Arc::new(EntityModel::new(
            vec![ColumnModel::new("project_id", true), ColumnModel::new("status", false)],
            None,
        )));
    let join = Join::new(vec![Relationship::new(events.clone(), "grouped", groups.clone()).unwrap()]).unwrap();

    let on = |entity: &Entity, name: &str, op: Op, rhs: Scalar| -> ConditionGroup {
        let column = Column::new(name).unwrap().with_entity(entity.clone()).unwrap();
        Condition::binary(column, op, Expr::lit(rhs)).unwrap().into()
    };
    let status = Column::new("status").unwrap().with_entity(groups.clone()).unwrap();

    let q = Query::new(join)
        .set_select(vec![status.into()])
        .unwrap()
        .set_where(vec![
            on(&events, "required1", Op::Eq, Scalar::Int(1)),
            on(&events, "required2", Op::Eq, Scalar::from("x")),
            on(&events, "time", Op::Gte, start()),
            on(&events, "time", Op::Lt, end()),
        ]);

    let err = schema_error(&q);
    assert_eq!(err.entity, "groupedmessage");
    assert_eq!(err.missing_columns(), vec!["project_id"]);
}

#[test]
fn test_validate_required_columns_directly() {
    let conditions = vec![cond("required1", Op::Eq, 1), cond("time", Op::Lt, end())];
    let err = validate_required_columns(&conditions, &schema(), None).unwrap_err();
    assert_eq!(err.missing_columns(), vec!["required2"]);
    assert!(err.to_string().contains("missing required >= condition(s) on column 'time'"));
}
