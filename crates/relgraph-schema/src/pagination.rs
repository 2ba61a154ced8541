//! Relay-style array connections.
//!
//! Cursors are `base64("arrayconnection:<offset>")`; `total` is the length of
//! the whole array, before slicing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::adapter::ArgMap;
use crate::error::TranslateError;

const CURSOR_PREFIX: &str = "arrayconnection:";

/// `first`/`after`/`last`/`before`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageArgs {
    pub first: Option<i64>,
    pub after: Option<String>,
    pub last: Option<i64>,
    pub before: Option<String>,
}

impl PageArgs {
    pub fn from_args(args: &ArgMap) -> Result<Self, TranslateError> {
        Ok(Self {
            first: int_arg(args, "first")?,
            after: string_arg(args, "after")?,
            last: int_arg(args, "last")?,
            before: string_arg(args, "before")?,
        })
    }
}

fn int_arg(args: &ArgMap, name: &str) -> Result<Option<i64>, TranslateError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| TranslateError::Pagination(format!("{name} must be an integer"))),
    }
}

fn string_arg(args: &ArgMap, name: &str) -> Result<Option<String>, TranslateError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TranslateError::Pagination(format!(
            "{name} must be a cursor string"
        ))),
    }
}

pub fn offset_to_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Offset encoded in a cursor, or `None` for foreign cursors.
pub fn cursor_to_offset(cursor: &str) -> Option<i64> {
    let bytes = STANDARD.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix(CURSOR_PREFIX)?.parse().ok()
}

/// Slice `items` according to `page` and wrap it as a connection value:
/// `{ total, edges: [{ cursor, node }], pageInfo }`.
pub fn connection_from_array(items: Vec<Value>, page: &PageArgs) -> Result<Value, TranslateError> {
    let length = items.len() as i64;
    let mut start = 0i64;
    let mut end = length;

    let after_offset = page.after.as_deref().and_then(cursor_to_offset).unwrap_or(-1);
    if (0..length).contains(&after_offset) {
        start = start.max(after_offset + 1);
    }
    let before_offset = page.before.as_deref().and_then(cursor_to_offset).unwrap_or(end);
    if (0..length).contains(&before_offset) {
        end = end.min(before_offset);
    }

    if let Some(first) = page.first {
        if first < 0 {
            return Err(TranslateError::Pagination(
                "first must be a non-negative integer".to_string(),
            ));
        }
        end = end.min(start + first);
    }
    if let Some(last) = page.last {
        if last < 0 {
            return Err(TranslateError::Pagination(
                "last must be a non-negative integer".to_string(),
            ));
        }
        start = start.max(end - last);
    }

    let edges: Vec<Value> = if start < end {
        items
            .into_iter()
            .enumerate()
            .skip(start as usize)
            .take((end - start) as usize)
            .map(|(offset, node)| json!({ "cursor": offset_to_cursor(offset), "node": node }))
            .collect()
    } else {
        Vec::new()
    };

    let lower_bound = if page.after.is_some() { after_offset + 1 } else { 0 };
    let upper_bound = if page.before.is_some() { before_offset } else { length };

    let start_cursor = edges.first().map(|e| e["cursor"].clone()).unwrap_or(Value::Null);
    let end_cursor = edges.last().map(|e| e["cursor"].clone()).unwrap_or(Value::Null);

    Ok(json!({
        "total": length,
        "edges": edges,
        "pageInfo": {
            "startCursor": start_cursor,
            "endCursor": end_cursor,
            "hasPreviousPage": page.last.is_some() && start > lower_bound,
            "hasNextPage": page.first.is_some() && end < upper_bound,
        }
    }))
}
