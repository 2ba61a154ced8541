use serde::{Deserialize, Serialize};
use std::fmt;

// Annotation rows and the merge into physical metadata
pub mod annotation;

// Configuration types shared across all relgraph crates
pub mod config;

pub use annotation::{
    AnnotationRow, FieldAnnotation, TableAnnotation, merge_annotations, nest_annotations,
};
pub use config::{
    AnnotationsConfig, BlobConfig, ConfigError, PoolConfig, RelgraphConfig, SchemaConfig,
    UpstreamConfig,
};

/// Primitive column type, as seen by the schema engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    #[default]
    String,
    Int,
    Float,
    Date,
    Blob,
}

impl FieldType {
    pub fn is_string(self) -> bool {
        matches!(self, FieldType::String)
    }

    /// Types that support `greater`/`less` comparisons.
    pub fn is_ordered(self) -> bool {
        matches!(self, FieldType::Date | FieldType::Int | FieldType::Float)
    }
}

/// A semantic tag. Only used to compose descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    pub key: String,
}

impl Index {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Identifier of an annotation reference group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefId::Number(n) => write!(f, "{n}"),
            RefId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RefId {
    fn from(value: i64) -> Self {
        RefId::Number(value)
    }
}

impl From<&str> for RefId {
    fn from(value: &str) -> Self {
        RefId::Text(value.to_string())
    }
}

/// An annotation grouping: fields carrying the same ref id form one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    pub id: RefId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub indices: Vec<Index>,
}

impl Ref {
    pub fn new(id: impl Into<RefId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            indices: Vec::new(),
        }
    }

    /// Refs are described by their indices only.
    pub fn description(&self) -> String {
        compose_description(None, &self.indices)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Stable key, distinct from the display name.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub non_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name_ref: Option<String>,
    #[serde(default)]
    pub indices: Vec<Index>,
    #[serde(default)]
    pub refs: Vec<Ref>,
}

impl Field {
    pub fn new(table: &str, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            id: field_id(table, &name),
            name,
            primary: false,
            field_type,
            non_null: false,
            table_name_ref: None,
            field_name_ref: None,
            indices: Vec::new(),
            refs: Vec::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.non_null = true;
        self
    }

    pub fn non_null(mut self) -> Self {
        self.non_null = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.table_name_ref = Some(table.into());
        self.field_name_ref = Some(field.into());
        self
    }

    pub fn with_ref(mut self, r: Ref) -> Self {
        self.refs.push(r);
        self
    }

    pub fn with_index(mut self, key: impl Into<String>) -> Self {
        self.indices.push(Index::new(key));
        self
    }

    pub fn description(&self) -> String {
        compose_description(Some(&self.name), &self.indices)
    }

    pub fn has_ref(&self, id: &RefId) -> bool {
        self.refs.iter().any(|r| &r.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub indices: Vec<Index>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            indices: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_index(mut self, key: impl Into<String>) -> Self {
        self.indices.push(Index::new(key));
        self
    }

    pub fn description(&self) -> String {
        compose_description(Some(&self.name), &self.indices)
    }

    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.primary)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Stable field key used by the adapters: `TABLE_FIELD`.
pub fn field_id(table: &str, field: &str) -> String {
    format!("{table}_{field}")
}

/// `name` followed by the comma-joined index keys.
pub fn compose_description(name: Option<&str>, indices: &[Index]) -> String {
    let mut out = name.unwrap_or_default().to_string();
    for index in indices {
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(&index.key);
    }
    out
}
