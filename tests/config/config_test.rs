use quarry::config::{Settings, SettingsError};
use quarry::prelude::*;
use std::fs;

const CONFIG: &str = r#"
[printer]
pretty = true

[request]
dataset = "events"
app_id = "quarry_tests"

[entities.events]
required_time_column = "timestamp"
columns = [
    { name = "project_id", required = true },
    { name = "event_id" },
    { name = "tags" },
]
"#;

fn cond(name: &str, op: Op, rhs: impl Into<Scalar>) -> ConditionGroup {
    Condition::binary(Column::new(name).unwrap(), op, Expr::lit(rhs))
        .unwrap()
        .into()
}

#[test]
fn test_configured_entity_enforces_its_schema() {
    let settings = Settings::from_toml_str(CONFIG).unwrap();
    let entity = settings.entity("events").unwrap();

    let query = Query::new(entity)
        .set_select(vec![col("event_id").unwrap(), col("tags[environment]").unwrap()])
        .unwrap()
        .set_where(vec![cond("timestamp", Op::Gte, 1), cond("timestamp", Op::Lt, 2)]);
    let err = query.validate_schema().unwrap_err();
    assert_eq!(err.missing_columns(), vec!["project_id"]);

    let fixed = query.set_where(vec![
        cond("project_id", Op::Eq, 1),
        cond("timestamp", Op::Gte, 1),
        cond("timestamp", Op::Lt, 2),
    ]);
    assert!(fixed.validate().is_ok());

    insta::assert_snapshot!(settings.printer().print_query(&fixed), @r"
    MATCH (events)
    SELECT event_id, tags[environment]
    WHERE project_id = 1 AND timestamp >= 1 AND timestamp < 2
    ");
}

#[test]
fn test_request_defaults() {
    let settings = Settings::from_toml_str(CONFIG).unwrap();
    let query = Query::new(settings.entity("events").unwrap())
        .set_select(vec![col("event_id").unwrap()])
        .unwrap();
    let request = settings.request(query).unwrap();
    assert_eq!(request.dataset, "events");
    assert_eq!(request.app_id, "quarry_tests");
    assert_eq!(request.parent_api, "<unknown>");

    let empty = Settings::default();
    let query = Query::new(Entity::new("events").unwrap());
    assert!(matches!(empty.request(query), Err(SettingsError::InvalidConfig(_))));
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("quarry-config-{}.toml", std::process::id()));
    fs::write(&path, CONFIG).unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert!(settings.printer.pretty);
    assert!(settings.entity_model("events").is_ok());
    assert!(matches!(
        settings.entity_model("transactions"),
        Err(SettingsError::EntityNotFound(_))
    ));

    fs::remove_file(&path).unwrap();
}
