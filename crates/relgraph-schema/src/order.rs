//! Translation of `order` arguments.
//!
//! `[{asc: NAME}, {desc: CITY}]` flattens into an ordered column map. A column
//! named more than once keeps its first position and takes the direction of
//! its last entry.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::TranslateError;
use crate::registry::TableShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Original column name -> direction, in first-mention order.
pub type OrderBy = IndexMap<String, SortDirection>;

/// Translate the `order` argument of a field. No argument yields `None`.
pub fn translate_order(
    shape: &TableShape,
    order: Option<&Value>,
) -> Result<Option<OrderBy>, TranslateError> {
    let entries: &[Value] = match order {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(entries)) => entries,
        Some(single) => std::slice::from_ref(single),
    };

    let mut out = OrderBy::new();
    for entry in entries {
        let Value::Object(entry) = entry else {
            return Err(TranslateError::InvalidOrder(format!(
                "expected an object, got {entry}"
            )));
        };
        for (key, name) in entry {
            let direction = SortDirection::from_key(key).ok_or_else(|| {
                TranslateError::InvalidOrder(format!("unknown sort direction {key}"))
            })?;
            let name = match name {
                Value::Null => continue,
                Value::String(name) => name,
                other => {
                    return Err(TranslateError::InvalidOrder(format!(
                        "{key} expects a field name, got {other}"
                    )));
                }
            };
            let field = shape
                .original_field(name)
                .ok_or_else(|| TranslateError::unknown_field(&shape.table.name, name))?;
            out.insert(field.name.clone(), direction);
        }
    }
    Ok(Some(out))
}
