//! Shared fixtures for the schema tests.
//!
//! `FixtureAdapter` serves a fixed table snapshot and canned result rows, and
//! records every statement it is asked to run.

use async_trait::async_trait;
use relgraph_core::{Field, FieldType, Ref, Table};
use relgraph_schema::{
    Adapter, ArgMap, FilterKind, ProgressReporter, ResolveInfo, SqlDialect, resolve_from_source,
    resolve_rows,
};
use serde_json::{Map, Value};
use std::sync::Mutex;

pub struct FixtureAdapter {
    tables: Vec<Table>,
    rows: Vec<Map<String, Value>>,
    fail: bool,
    statements: Mutex<Vec<String>>,
}

impl FixtureAdapter {
    pub fn new(tables: Vec<Table>) -> Self {
        Self {
            tables,
            rows: Vec::new(),
            fail: false,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Value>) -> Self {
        self.rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

impl SqlDialect for FixtureAdapter {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn create_sql_condition(
        &self,
        kind: FilterKind,
        alias: &str,
        field: &Field,
        value: Option<&Value>,
    ) -> String {
        let column = format!("{alias}.{}", self.quote(&field.name));
        let literal = match value {
            Some(Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        match kind {
            FilterKind::IsEmpty => format!("{column} = ''"),
            _ if literal.is_empty() => String::new(),
            FilterKind::Equals => format!("{column} = {literal}"),
            FilterKind::Greater => format!("{column} > {literal}"),
            FilterKind::Less => format!("{column} < {literal}"),
            FilterKind::Contains | FilterKind::Begins | FilterKind::Ends => {
                format!("{column} LIKE {literal}")
            }
        }
    }
}

#[async_trait]
impl Adapter for FixtureAdapter {
    type Context = ();

    async fn get_tables(&self) -> anyhow::Result<Vec<Table>> {
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(self.tables.clone())
    }

    async fn resolve(
        &self,
        source: Option<&Value>,
        args: &ArgMap,
        _context: &Self::Context,
        info: &ResolveInfo<'_>,
    ) -> anyhow::Result<Value> {
        if let Some(source) = source {
            return resolve_from_source(source, args, info);
        }
        let plan = info
            .plan
            .ok_or_else(|| anyhow::anyhow!("root field without a plan"))?;
        self.statements.lock().unwrap().push(plan.to_sql(self));
        resolve_rows(plan, self.rows.clone(), args)
    }
}

/// Records ticks and terminations.
#[derive(Default)]
pub struct RecordingProgress {
    pub ticks: Mutex<Vec<(String, f64)>>,
    pub terminated: Mutex<Option<String>>,
}

impl ProgressReporter for RecordingProgress {
    fn tick(&self, message: &str, step: f64) {
        self.ticks.lock().unwrap().push((message.to_string(), step));
    }

    fn terminate(&self, message: &str) {
        *self.terminated.lock().unwrap() = Some(message.to_string());
    }
}

/// `CITY(ID, NAME, POPULATION)` and `PERSON(ID, NAME, NICK, BORN, PHOTO,
/// CITY_ID -> CITY.ID)`, with NAME and NICK grouped under ref 1.
pub fn people_tables() -> Vec<Table> {
    vec![
        Table::new("CITY")
            .with_index("cities")
            .with_field(Field::new("CITY", "ID", FieldType::Int).primary())
            .with_field(Field::new("CITY", "NAME", FieldType::String).non_null())
            .with_field(Field::new("CITY", "POPULATION", FieldType::Int)),
        Table::new("PERSON")
            .with_field(Field::new("PERSON", "ID", FieldType::Int).primary())
            .with_field(Field::new("PERSON", "NAME", FieldType::String).with_ref(naming()))
            .with_field(Field::new("PERSON", "NICK", FieldType::String).with_ref(naming()))
            .with_field(Field::new("PERSON", "BORN", FieldType::Date))
            .with_field(Field::new("PERSON", "PHOTO", FieldType::Blob))
            .with_field(
                Field::new("PERSON", "CITY_ID", FieldType::Int)
                    .references("CITY", "ID")
                    .with_index("lives in"),
            ),
    ]
}

fn naming() -> Ref {
    let mut r = Ref::new(1);
    r.name = Some("Naming".to_string());
    r.indices = vec![relgraph_core::Index::new("names")];
    r
}
