//! Semantic annotations layered on top of the physical schema.
//!
//! Adapters read annotations as flat rows (one row per table, field, ref and
//! index combination, the shape a chain of LEFT JOINs produces). The rows are
//! nested into [`TableAnnotation`]s and then merged into the physical
//! [`Table`]s by table name and field id.

use crate::{Index, Ref, RefId, Table};
use serde::{Deserialize, Serialize};

/// One flat annotation row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub table_name: String,
    #[serde(default)]
    pub field_id: Option<String>,
    #[serde(default)]
    pub table_index: Option<String>,
    #[serde(default)]
    pub field_index: Option<String>,
    #[serde(default)]
    pub ref_id: Option<RefId>,
    #[serde(default)]
    pub ref_name: Option<String>,
    #[serde(default)]
    pub ref_index: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldAnnotation {
    pub id: String,
    pub indices: Vec<Index>,
    pub refs: Vec<Ref>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableAnnotation {
    pub name: String,
    pub indices: Vec<Index>,
    pub fields: Vec<FieldAnnotation>,
}

/// Group flat rows into tables, fields and refs.
///
/// Every level is deduplicated by identity and keeps first-seen order.
/// Blank index names are skipped.
pub fn nest_annotations(rows: impl IntoIterator<Item = AnnotationRow>) -> Vec<TableAnnotation> {
    let mut tables: Vec<TableAnnotation> = Vec::new();

    for row in rows {
        let pos = match tables.iter().position(|t| t.name == row.table_name) {
            Some(pos) => pos,
            None => {
                tables.push(TableAnnotation {
                    name: row.table_name.clone(),
                    ..Default::default()
                });
                tables.len() - 1
            }
        };
        let table = &mut tables[pos];
        push_index(&mut table.indices, row.table_index.as_deref());

        let Some(field_id) = row.field_id else {
            continue;
        };
        let pos = match table.fields.iter().position(|f| f.id == field_id) {
            Some(pos) => pos,
            None => {
                table.fields.push(FieldAnnotation {
                    id: field_id,
                    ..Default::default()
                });
                table.fields.len() - 1
            }
        };
        let field = &mut table.fields[pos];
        push_index(&mut field.indices, row.field_index.as_deref());

        let Some(ref_id) = row.ref_id else {
            continue;
        };
        let pos = match field.refs.iter().position(|r| r.id == ref_id) {
            Some(pos) => pos,
            None => {
                field.refs.push(Ref {
                    id: ref_id,
                    name: row.ref_name.clone(),
                    indices: Vec::new(),
                });
                field.refs.len() - 1
            }
        };
        push_index(&mut field.refs[pos].indices, row.ref_index.as_deref());
    }

    tables
}

fn push_index(indices: &mut Vec<Index>, key: Option<&str>) {
    let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
        return;
    };
    if !indices.iter().any(|i| i.key == key) {
        indices.push(Index::new(key));
    }
}

/// Overwrite indices and refs of the physical tables with their annotations.
///
/// Tables are matched by name and fields by id. Annotations for unknown
/// tables or fields are ignored.
pub fn merge_annotations(tables: &mut [Table], annotations: Vec<TableAnnotation>) {
    for annotation in annotations {
        let Some(table) = tables.iter_mut().find(|t| t.name == annotation.name) else {
            continue;
        };
        table.indices = annotation.indices;
        for field_annotation in annotation.fields {
            if let Some(field) = table.fields.iter_mut().find(|f| f.id == field_annotation.id) {
                field.indices = field_annotation.indices;
                field.refs = field_annotation.refs;
            }
        }
    }
}
