//! Synthesized type system.
//!
//! One [`TypeRegistry`] belongs to exactly one build. Object and connection
//! types are shared through `Arc`, so "the same type" means `Arc::ptr_eq`.
//! Object types are registered before their fields exist and populated once
//! afterwards, which lets mutually referencing tables see each other.

use async_graphql::dynamic::TypeRef;
use indexmap::IndexMap;
use relgraph_core::{FieldType, Table};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::adapter::ArgMap;
use crate::error::TranslateError;
use crate::names::{DerivedNames, NameScope};
use crate::order::OrderBy;

/// Name of the root query type.
pub const QUERY_TYPE: &str = "Tables";
pub const PAGE_INFO_TYPE: &str = "PageInfo";
pub const DATE_SCALAR: &str = "Date";
pub const URL_SCALAR: &str = "Url";

/// `(parent_alias, child_alias) -> join condition`
pub type JoinFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;
/// `(table_alias, args) -> WHERE fragment`
pub type WhereFn = Arc<dyn Fn(&str, &ArgMap) -> Result<String, TranslateError> + Send + Sync>;
/// `args -> column ordering`
pub type OrderByFn = Arc<dyn Fn(&ArgMap) -> Result<Option<OrderBy>, TranslateError> + Send + Sync>;

/// A table of the snapshot together with its escaped names.
#[derive(Debug)]
pub struct TableShape {
    pub table: Table,
    /// Escaped table name; also the object type name.
    pub name: String,
    /// Escaped names of the physical fields.
    pub fields: NameScope,
    /// `link_*` field names, kept apart from the physical ones.
    links: DerivedNames,
}

impl TableShape {
    pub fn new(table: Table, name: String) -> Self {
        let fields = NameScope::new(table.fields.iter().map(|f| f.name.as_str()));
        let mut links = DerivedNames::new(fields.escaped_names());
        for field in table.fields.iter().filter(|f| f.table_name_ref.is_some()) {
            links.issue(&format!("link_{}", field.name));
        }
        for field in &table.fields {
            for r in &field.refs {
                links.issue(&format!("link_{}", r.id));
            }
        }
        Self {
            table,
            name,
            fields,
            links,
        }
    }

    /// Field name of the link along a foreign key column.
    pub fn link_field(&self, column: &str) -> String {
        let base = format!("link_{column}");
        self.links.get(&base).map(str::to_string).unwrap_or(base)
    }

    /// Field name of the annotated group with this ref id.
    pub fn group_field(&self, ref_id: &impl fmt::Display) -> String {
        let base = format!("link_{ref_id}");
        self.links.get(&base).map(str::to_string).unwrap_or(base)
    }

    pub fn primary_field(&self) -> Option<&str> {
        self.table.primary_field().map(|f| f.name.as_str())
    }

    /// Escaped name of a physical field.
    pub fn escaped_field<'a>(&'a self, original: &'a str) -> &'a str {
        self.fields.escaped(original).unwrap_or(original)
    }

    /// Physical field behind an escaped name.
    pub fn original_field(&self, escaped: &str) -> Option<&relgraph_core::Field> {
        let original = self.fields.original(escaped)?;
        self.table.field(original)
    }
}

/// Scalar types of generated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Boolean,
    String,
    Int,
    Float,
    Date,
    /// Blob columns surface as links.
    Url,
}

impl ScalarKind {
    pub fn from_field_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Blob => ScalarKind::Url,
            FieldType::Int => ScalarKind::Int,
            FieldType::Float => ScalarKind::Float,
            FieldType::Date => ScalarKind::Date,
            FieldType::Boolean => ScalarKind::Boolean,
            FieldType::String => ScalarKind::String,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            ScalarKind::Boolean => TypeRef::BOOLEAN,
            ScalarKind::String => TypeRef::STRING,
            ScalarKind::Int => TypeRef::INT,
            ScalarKind::Float => TypeRef::FLOAT,
            ScalarKind::Date => DATE_SCALAR,
            ScalarKind::Url => URL_SCALAR,
        }
    }
}

pub enum FieldKind {
    Scalar(ScalarKind),
    /// Link to another table, paginated.
    Connection(Arc<ConnectionType>),
    /// Annotated field group of the same table.
    Emulated(Arc<ObjectType>),
}

impl FieldKind {
    pub fn type_name(&self) -> &str {
        match self {
            FieldKind::Scalar(kind) => kind.type_name(),
            FieldKind::Connection(connection) => &connection.name,
            FieldKind::Emulated(object) => &object.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgDef {
    pub name: String,
    pub ty: TypeRef,
}

impl ArgDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A field of an object type (or of the root query type).
pub struct FieldDef {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    pub non_null: bool,
    pub args: Vec<ArgDef>,
    /// Physical column read for this field.
    pub sql_column: Option<String>,
    pub join: Option<JoinFn>,
    pub where_fn: WhereFn,
    pub order_by: OrderByFn,
}

impl FieldDef {
    pub fn type_ref(&self) -> TypeRef {
        let name = self.kind.type_name().to_string();
        if self.non_null {
            TypeRef::named_nn(name)
        } else {
            TypeRef::named(name)
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("type", &self.type_ref().to_string())
            .field("sql_column", &self.sql_column)
            .field("args", &self.args.iter().map(|a| &a.name).collect::<Vec<_>>())
            .finish()
    }
}

pub type FieldMap = IndexMap<String, Arc<FieldDef>>;

pub struct ObjectType {
    pub name: String,
    pub sql_table: String,
    /// Primary field of the table, when it has one.
    pub unique_key: Option<String>,
    pub description: Option<String>,
    fields: OnceLock<FieldMap>,
}

impl ObjectType {
    pub fn new(
        name: impl Into<String>,
        sql_table: impl Into<String>,
        unique_key: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sql_table: sql_table.into(),
            unique_key,
            description,
            fields: OnceLock::new(),
        }
    }

    /// Set the fields. Only the first call has an effect.
    pub fn populate(&self, fields: FieldMap) {
        let _ = self.fields.set(fields);
    }

    pub fn is_populated(&self) -> bool {
        self.fields.get().is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldDef>> {
        self.fields.get().into_iter().flat_map(|f| f.values())
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.fields.get()?.get(name)
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("sql_table", &self.sql_table)
            .field("unique_key", &self.unique_key)
            .field("fields", &self.fields().map(|fd| &fd.name).collect::<Vec<_>>())
            .finish()
    }
}

/// `<T>Connection { edges, nodes, pageInfo, total }` over an object type.
#[derive(Debug)]
pub struct ConnectionType {
    pub name: String,
    pub edge_name: String,
    pub node_name: String,
    node: Weak<ObjectType>,
}

impl ConnectionType {
    pub fn new(node: &Arc<ObjectType>) -> Self {
        Self {
            name: format!("{}Connection", node.name),
            edge_name: format!("{}Edge", node.name),
            node_name: node.name.clone(),
            node: Arc::downgrade(node),
        }
    }

    /// The node type; alive as long as the registry that built it.
    pub fn node(&self) -> Option<Arc<ObjectType>> {
        self.node.upgrade()
    }
}

#[derive(Debug, Clone)]
pub struct InputFieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub fields: Vec<InputFieldDef>,
}

impl InputObjectDef {
    pub fn field(&self, name: &str) -> Option<&InputFieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct EnumItemDef {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub items: Vec<EnumItemDef>,
}

/// Every type created during one build, keyed by name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    pub(crate) objects: IndexMap<String, Arc<ObjectType>>,
    pub(crate) connections: IndexMap<String, Arc<ConnectionType>>,
    pub(crate) inputs: IndexMap<String, InputObjectDef>,
    pub(crate) enums: IndexMap<String, EnumDef>,
}

impl TypeRegistry {
    pub fn object(&self, name: &str) -> Option<&Arc<ObjectType>> {
        self.objects.get(name)
    }

    pub fn connection(&self, name: &str) -> Option<&Arc<ConnectionType>> {
        self.connections.get(name)
    }

    pub fn input(&self, name: &str) -> Option<&InputObjectDef> {
        self.inputs.get(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Arc<ObjectType>> {
        self.objects.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Arc<ConnectionType>> {
        self.connections.values()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputObjectDef> {
        self.inputs.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDef> {
        self.enums.values()
    }
}

/// Output of a build: the root fields plus every type they reach.
#[derive(Debug)]
pub struct GraphSchema {
    pub(crate) root: FieldMap,
    pub(crate) registry: TypeRegistry,
    pub(crate) tables: Vec<Arc<TableShape>>,
}

impl GraphSchema {
    /// Root query fields, one per table.
    pub fn root_fields(&self) -> impl Iterator<Item = &Arc<FieldDef>> {
        self.root.values()
    }

    pub fn root_field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.root.get(name)
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn tables(&self) -> &[Arc<TableShape>] {
        &self.tables
    }

    /// Node type of a root field.
    pub fn root_type(&self, name: &str) -> Option<Arc<ObjectType>> {
        match &self.root.get(name)?.kind {
            FieldKind::Connection(connection) => connection.node(),
            _ => None,
        }
    }
}
