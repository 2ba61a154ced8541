//! Translation of `where` arguments into SQL boolean expressions.
//!
//! A filter is an object whose keys are filter kinds:
//!
//! ```text
//! { equals: { NAME: "x" }, greater: { AGE: 30 }, isNull: CITY,
//!   isEmpty: NAME, and: [..], or: [..], not: [..] }
//! ```
//!
//! Each value kind becomes one parenthesized AND group of conditions rendered
//! by the dialect. `isNull`, `not`, `or` and `and` follow, in that order, and
//! all groups are joined with ` AND `.

use relgraph_core::Field;
use serde_json::{Map, Value};
use std::fmt;

use crate::adapter::SqlDialect;
use crate::error::TranslateError;
use crate::registry::TableShape;

/// Atomic condition kinds rendered by the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Equals,
    IsEmpty,
    Contains,
    Begins,
    Ends,
    Greater,
    Less,
}

impl FilterKind {
    pub const ALL: [FilterKind; 7] = [
        FilterKind::Equals,
        FilterKind::IsEmpty,
        FilterKind::Contains,
        FilterKind::Begins,
        FilterKind::Ends,
        FilterKind::Greater,
        FilterKind::Less,
    ];

    /// Argument key in the filter input.
    pub fn key(self) -> &'static str {
        match self {
            FilterKind::Equals => "equals",
            FilterKind::IsEmpty => "isEmpty",
            FilterKind::Contains => "contains",
            FilterKind::Begins => "begins",
            FilterKind::Ends => "ends",
            FilterKind::Greater => "greater",
            FilterKind::Less => "less",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

pub const IS_NULL: &str = "isNull";
pub const AND: &str = "and";
pub const OR: &str = "or";
pub const NOT: &str = "not";

/// Translate the `where` argument of a field. No argument yields `""`.
pub fn translate_where(
    dialect: &dyn SqlDialect,
    shape: &TableShape,
    table_alias: &str,
    filter: Option<&Value>,
) -> Result<String, TranslateError> {
    match filter {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::Object(filter)) => translate_object(dialect, shape, table_alias, filter),
        Some(other) => Err(TranslateError::InvalidFilter(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn translate_object(
    dialect: &dyn SqlDialect,
    shape: &TableShape,
    alias: &str,
    filter: &Map<String, Value>,
) -> Result<String, TranslateError> {
    let mut groups: Vec<String> = Vec::new();

    for (key, value) in filter {
        if matches!(key.as_str(), IS_NULL | AND | OR | NOT) {
            continue;
        }
        let kind = FilterKind::from_key(key)
            .ok_or_else(|| TranslateError::InvalidFilter(format!("unknown filter kind {key}")))?;

        let mut conditions = Vec::new();
        match value {
            Value::Null => {}
            Value::String(name) => {
                let field = lookup(shape, name)?;
                push_condition(&mut conditions, dialect.create_sql_condition(kind, alias, field, None));
            }
            Value::Array(names) => {
                for name in names {
                    let name = name.as_str().ok_or_else(|| {
                        TranslateError::InvalidFilter(format!("{key} expects field names"))
                    })?;
                    let field = lookup(shape, name)?;
                    push_condition(&mut conditions, dialect.create_sql_condition(kind, alias, field, None));
                }
            }
            Value::Object(values) => {
                for (name, value) in values {
                    let field = lookup(shape, name)?;
                    let value = (!value.is_null()).then_some(value);
                    push_condition(&mut conditions, dialect.create_sql_condition(kind, alias, field, value));
                }
            }
            other => {
                return Err(TranslateError::InvalidFilter(format!(
                    "{key} expects an object, got {other}"
                )));
            }
        }
        if !conditions.is_empty() {
            groups.push(format!("({})", conditions.join(" AND ")));
        }
    }

    match filter.get(IS_NULL) {
        None | Some(Value::Null) => {}
        Some(Value::String(name)) => {
            let field = lookup(shape, name)?;
            groups.push(format!("{}.{} IS NULL", alias, dialect.quote(&field.name)));
        }
        Some(other) => {
            return Err(TranslateError::InvalidFilter(format!(
                "{IS_NULL} expects a field name, got {other}"
            )));
        }
    }

    let nested = translate_list(dialect, shape, alias, filter.get(NOT))?;
    if !nested.is_empty() {
        groups.push(format!("NOT ({})", nested.join(" AND ")));
    }
    let nested = translate_list(dialect, shape, alias, filter.get(OR))?;
    if !nested.is_empty() {
        groups.push(format!("({})", nested.join(" OR ")));
    }
    let nested = translate_list(dialect, shape, alias, filter.get(AND))?;
    if !nested.is_empty() {
        groups.push(format!("({})", nested.join(" AND ")));
    }

    Ok(groups.join(" AND "))
}

/// Translate a list of nested filters, dropping the ones that render empty.
fn translate_list(
    dialect: &dyn SqlDialect,
    shape: &TableShape,
    alias: &str,
    list: Option<&Value>,
) -> Result<Vec<String>, TranslateError> {
    let items: &[Value] = match list {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(single) => std::slice::from_ref(single),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let sql = translate_where(dialect, shape, alias, Some(item))?;
        if !sql.is_empty() {
            out.push(sql);
        }
    }
    Ok(out)
}

fn lookup<'a>(shape: &'a TableShape, escaped: &str) -> Result<&'a Field, TranslateError> {
    shape
        .original_field(escaped)
        .ok_or_else(|| TranslateError::unknown_field(&shape.table.name, escaped))
}

fn push_condition(conditions: &mut Vec<String>, condition: String) {
    if !condition.is_empty() {
        conditions.push(condition);
    }
}
