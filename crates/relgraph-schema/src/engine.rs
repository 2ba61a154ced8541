//! Schema synthesis.
//!
//! Turns one metadata snapshot into a [`GraphSchema`]:
//! - one object type per table, memoized by escaped table name;
//! - one connection type per object type;
//! - one filter input and one sorting input per table;
//! - one `EMULATED_<table>_<ref>` object per annotation group.
//!
//! Every field carries the closures (`join`, `where`, `order_by`) the
//! resolution layer calls at request time to build SQL.

use async_graphql::dynamic::TypeRef;
use indexmap::IndexMap;
use relgraph_core::{Field, FieldType, Ref, Table, compose_description};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, SqlDialect};
use crate::error::SchemaError;
use crate::filter::{AND, FilterKind, IS_NULL, NOT, OR, translate_where};
use crate::lower::{ExecutableSchema, lower};
use crate::names::{DerivedNames, NameScope};
use crate::order::translate_order;
use crate::progress::{NoProgress, ProgressReporter};
use crate::registry::{
    ArgDef, ConnectionType, EnumDef, EnumItemDef, FieldDef, FieldKind, FieldMap, GraphSchema,
    InputFieldDef, InputObjectDef, JoinFn, ObjectType, OrderByFn, ScalarKind, TableShape,
    TypeRegistry, WhereFn,
};

/// Progress weight of a full build: 100 spread over the tables, 10 for the
/// fixed steps.
pub const BUILD_PROGRESS_TOTAL: f64 = 110.0;
const TABLES_PROGRESS: f64 = 100.0;

/// Builds GraphQL schemas from the metadata an adapter provides.
pub struct NlpSchema<A: Adapter> {
    adapter: Arc<A>,
}

impl<A: Adapter> NlpSchema<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// Read a fresh metadata snapshot and synthesize the type system.
    pub async fn create_schema(
        &self,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<GraphSchema, SchemaError> {
        let progress = progress.unwrap_or(&NoProgress);
        info!("Creating GraphQL schema...");

        let result = async {
            progress.tick("Reading database schema...", 1.0);
            let tables = self.adapter.get_tables().await?;

            progress.tick("Creating GraphQL schema...", 8.0);
            let dialect: Arc<dyn SqlDialect> = self.adapter.clone();
            let schema = build(dialect, tables, progress)?;

            progress.tick("Done.", 1.0);
            Ok::<_, SchemaError>(schema)
        }
        .await;

        match &result {
            Ok(schema) => info!(tables = schema.tables.len(), "GraphQL schema created"),
            Err(e) => progress.terminate(&e.to_string()),
        }
        result
    }

    /// [`create_schema`](Self::create_schema), then lower into an executable
    /// schema resolved through the adapter.
    pub async fn create_executable(
        &self,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<ExecutableSchema, SchemaError> {
        let graph = self.create_schema(progress).await?;
        lower(Arc::new(graph), self.adapter.clone())
    }
}

/// Synthesize a schema from a snapshot. Performs no I/O.
pub fn build(
    dialect: Arc<dyn SqlDialect>,
    tables: Vec<Table>,
    progress: &dyn ProgressReporter,
) -> Result<GraphSchema, SchemaError> {
    let tables = exposable_tables(tables);
    if tables.is_empty() {
        return Err(SchemaError::NoTables);
    }

    let table_names = NameScope::new(tables.iter().map(|t| t.name.as_str()));
    let shapes: IndexMap<String, Arc<TableShape>> = tables
        .into_iter()
        .map(|table| {
            let name = table_names
                .escaped(&table.name)
                .unwrap_or(&table.name)
                .to_string();
            (table.name.clone(), Arc::new(TableShape::new(table, name)))
        })
        .collect();

    let mut builder = Builder {
        table_step: TABLES_PROGRESS / shapes.len() as f64,
        dialect,
        shapes,
        type_names: DerivedNames::new(table_names.escaped_names()),
        registry: TypeRegistry::default(),
        progress,
    };

    let mut root = FieldMap::new();
    let shapes: Vec<Arc<TableShape>> = builder.shapes.values().cloned().collect();
    for shape in &shapes {
        let field = builder.create_root_field(shape)?;
        root.insert(field.name.clone(), Arc::new(field));
    }

    Ok(GraphSchema {
        root,
        registry: builder.registry,
        tables: shapes,
    })
}

/// Drop duplicate tables and tables that would end up without any field.
///
/// A field survives when it is a plain column or a link whose target table
/// survives; removing a table can strand others, so this runs to a fixpoint.
fn exposable_tables(tables: Vec<Table>) -> Vec<Table> {
    let mut seen = HashSet::new();
    let mut tables: Vec<Table> = tables
        .into_iter()
        .filter(|t| {
            let first = seen.insert(t.name.clone());
            if !first {
                warn!(table = %t.name, "duplicate table in metadata snapshot, keeping the first");
            }
            first
        })
        .collect();

    loop {
        let before = tables.len();
        let snapshot = tables.clone();
        tables.retain(|table| {
            let keep = table.fields.iter().any(|field| match &field.table_name_ref {
                None => true,
                Some(target) => snapshot
                    .iter()
                    .find(|t| &t.name == target)
                    .is_some_and(|t| join_column(field, t).is_some()),
            });
            if !keep {
                debug!(table = %table.name, "skipping table without exposable fields");
            }
            keep
        });
        if tables.len() == before {
            return tables;
        }
    }
}

/// Column of `target` a link field joins against.
fn join_column<'a>(field: &'a Field, target: &'a Table) -> Option<&'a str> {
    field
        .field_name_ref
        .as_deref()
        .or_else(|| target.primary_field().map(|f| f.name.as_str()))
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

struct Builder<'p> {
    dialect: Arc<dyn SqlDialect>,
    /// By original table name.
    shapes: IndexMap<String, Arc<TableShape>>,
    /// Emulated type names; table type names are reserved up front.
    type_names: DerivedNames,
    registry: TypeRegistry,
    progress: &'p dyn ProgressReporter,
    table_step: f64,
}

impl Builder<'_> {
    fn create_root_field(&mut self, shape: &Arc<TableShape>) -> Result<FieldDef, SchemaError> {
        let object = self.create_type(shape)?;
        let connection = self.create_connection_type(&object);
        Ok(FieldDef {
            name: shape.name.clone(),
            description: shape.table.description(),
            kind: FieldKind::Connection(connection),
            non_null: false,
            args: self.table_args(shape, true),
            sql_column: None,
            join: None,
            where_fn: self.where_fn(shape),
            order_by: self.order_fn(shape),
        })
    }

    /// Object type of a table. Registered before its fields are built.
    fn create_type(&mut self, shape: &Arc<TableShape>) -> Result<Arc<ObjectType>, SchemaError> {
        if let Some(existing) = self.registry.objects.get(&shape.name) {
            return Ok(existing.clone());
        }

        self.progress.tick(
            &format!("Creating GraphQL type: {}", shape.table.name),
            self.table_step,
        );

        let object = Arc::new(ObjectType::new(
            shape.name.clone(),
            shape.table.name.clone(),
            shape.primary_field().map(str::to_string),
            non_empty(shape.table.description()),
        ));
        self.registry
            .objects
            .insert(shape.name.clone(), object.clone());

        let mut fields = self.create_fields(shape, shape.table.fields.iter())?;
        fields.extend(self.create_emulated_fields(shape)?);
        debug!(table = %shape.table.name, fields = fields.len(), "created object type");

        object.populate(fields);
        Ok(object)
    }

    fn create_fields<'f>(
        &mut self,
        shape: &Arc<TableShape>,
        fields: impl Iterator<Item = &'f Field>,
    ) -> Result<FieldMap, SchemaError> {
        let mut out = FieldMap::new();
        for field in fields {
            let def = match &field.table_name_ref {
                None => self.create_scalar_field(shape, field),
                Some(target_name) => {
                    let Some(target) = self.shapes.get(target_name).cloned() else {
                        debug!(
                            table = %shape.table.name,
                            field = %field.name,
                            target = %target_name,
                            "dropping field referencing an unknown table"
                        );
                        continue;
                    };
                    let Some(column) = join_column(field, &target.table).map(str::to_string)
                    else {
                        debug!(
                            table = %shape.table.name,
                            field = %field.name,
                            target = %target_name,
                            "dropping link without a join column"
                        );
                        continue;
                    };
                    self.create_link_field(shape, field, &target, column)?
                }
            };
            out.insert(def.name.clone(), Arc::new(def));
        }
        Ok(out)
    }

    fn create_scalar_field(&mut self, shape: &Arc<TableShape>, field: &Field) -> FieldDef {
        FieldDef {
            name: shape.escaped_field(&field.name).to_string(),
            description: field.description(),
            kind: FieldKind::Scalar(ScalarKind::from_field_type(field.field_type)),
            non_null: field.non_null,
            args: Vec::new(),
            sql_column: Some(field.name.clone()),
            join: None,
            where_fn: self.where_fn(shape),
            order_by: self.order_fn(shape),
        }
    }

    /// Foreign key: a connection to the referenced table's type.
    fn create_link_field(
        &mut self,
        shape: &Arc<TableShape>,
        field: &Field,
        target: &Arc<TableShape>,
        target_column: String,
    ) -> Result<FieldDef, SchemaError> {
        let object = self.create_type(target)?;
        let connection = self.create_connection_type(&object);

        let dialect = self.dialect.clone();
        let column = field.name.clone();
        let join: JoinFn = Arc::new(move |parent, child| {
            format!(
                "{}.{} = {}.{}",
                parent,
                dialect.quote(&column),
                child,
                dialect.quote(&target_column)
            )
        });

        let indices = field.refs.first().map(|r| r.indices.as_slice()).unwrap_or_default();
        Ok(FieldDef {
            name: shape.link_field(&field.name),
            description: compose_description(Some(&field.name), indices),
            kind: FieldKind::Connection(connection),
            non_null: field.non_null,
            args: self.table_args(target, true),
            sql_column: Some(field.name.clone()),
            join: Some(join),
            where_fn: self.where_fn(target),
            order_by: self.order_fn(target),
        })
    }

    /// One nested object per annotation ref id, holding the fields that
    /// carry it. Joined back to the same row on the primary field.
    fn create_emulated_fields(&mut self, shape: &Arc<TableShape>) -> Result<FieldMap, SchemaError> {
        let mut refs: Vec<&Ref> = Vec::new();
        for field in &shape.table.fields {
            for r in &field.refs {
                if !refs.iter().any(|seen| seen.id == r.id) {
                    refs.push(r);
                }
            }
        }

        let mut out = FieldMap::new();
        for r in refs {
            let type_name = self
                .type_names
                .issue(&format!("EMULATED_{}_{}", shape.table.name, r.id));

            let object = match self.registry.objects.get(&type_name) {
                Some(existing) => existing.clone(),
                None => {
                    let members = shape.table.fields.iter().filter(|f| f.has_ref(&r.id));
                    let fields = self.create_fields(shape, members)?;
                    if fields.is_empty() {
                        debug!(table = %shape.table.name, ref_id = %r.id, "skipping empty annotated group");
                        continue;
                    }
                    let Some(primary) = shape.primary_field() else {
                        return Err(SchemaError::MissingPrimaryKey {
                            table: shape.table.name.clone(),
                        });
                    };
                    let object = Arc::new(ObjectType::new(
                        type_name.clone(),
                        shape.table.name.clone(),
                        Some(primary.to_string()),
                        r.name.clone(),
                    ));
                    object.populate(fields);
                    self.registry.objects.insert(type_name, object.clone());
                    object
                }
            };

            let Some(primary) = object.unique_key.clone() else {
                return Err(SchemaError::MissingPrimaryKey {
                    table: shape.table.name.clone(),
                });
            };
            let dialect = self.dialect.clone();
            let key = primary.clone();
            let join: JoinFn = Arc::new(move |parent, child| {
                let key = dialect.quote(&key);
                format!("{parent}.{key} = {child}.{key}")
            });

            // Nullable: a `where` on the group can exclude the row.
            let def = FieldDef {
                name: shape.group_field(&r.id),
                description: r.description(),
                kind: FieldKind::Emulated(object),
                non_null: false,
                args: self.table_args(shape, false),
                sql_column: Some(primary),
                join: Some(join),
                where_fn: self.where_fn(shape),
                order_by: self.order_fn(shape),
            };
            out.insert(def.name.clone(), Arc::new(def));
        }
        Ok(out)
    }

    fn create_connection_type(&mut self, object: &Arc<ObjectType>) -> Arc<ConnectionType> {
        let name = format!("{}Connection", object.name);
        if let Some(existing) = self.registry.connections.get(&name) {
            return existing.clone();
        }
        let connection = Arc::new(ConnectionType::new(object));
        self.registry.connections.insert(name, connection.clone());
        connection
    }

    fn table_args(&mut self, shape: &TableShape, paginated: bool) -> Vec<ArgDef> {
        let mut args = Vec::new();
        if paginated {
            args.push(ArgDef::new("first", TypeRef::named(TypeRef::INT)));
            args.push(ArgDef::new("after", TypeRef::named(TypeRef::STRING)));
            args.push(ArgDef::new("last", TypeRef::named(TypeRef::INT)));
            args.push(ArgDef::new("before", TypeRef::named(TypeRef::STRING)));
        }
        let filter = self.create_filter_input_type(shape);
        args.push(ArgDef::new("where", TypeRef::named(filter)));
        if let Some(sorting) = self.create_sorting_input_type(shape) {
            args.push(ArgDef::new("order", TypeRef::named_list(sorting)));
        }
        args
    }

    fn create_filter_input_type(&mut self, shape: &TableShape) -> String {
        let name = format!("FILTER_{}", shape.name);
        if self.registry.inputs.contains_key(&name) {
            return name;
        }

        let equals = self.operator_input(shape, "EQUALS", |f| f.field_type != FieldType::Blob);
        let contains = self.operator_input(shape, "CONTAINS", |f| f.field_type.is_string());
        let begins_or_ends = self.operator_input(shape, "BEGINS_OR_ENDS", |f| f.field_type.is_string());
        let greater_or_less = self.operator_input(shape, "GREATER_OR_LESS", |f| f.field_type.is_ordered());
        let is_null = self.field_enum(shape, "IS_NULL_FIELDS", |f| !f.non_null);
        let is_empty = self.field_enum(shape, "IS_EMPTY_FIELDS", |f| {
            matches!(f.field_type, FieldType::String | FieldType::Blob)
        });

        let mut fields = Vec::new();
        let mut push = |key: &str, ty: TypeRef| {
            fields.push(InputFieldDef {
                name: key.to_string(),
                ty,
                description: None,
            })
        };
        if let Some(ty) = equals {
            push(FilterKind::Equals.key(), TypeRef::named(ty));
        }
        if let Some(ty) = contains {
            push(FilterKind::Contains.key(), TypeRef::named(ty));
        }
        if let Some(ty) = begins_or_ends {
            push(FilterKind::Begins.key(), TypeRef::named(&ty));
            push(FilterKind::Ends.key(), TypeRef::named(ty));
        }
        if let Some(ty) = greater_or_less {
            push(FilterKind::Greater.key(), TypeRef::named(&ty));
            push(FilterKind::Less.key(), TypeRef::named(ty));
        }
        if let Some(ty) = is_null {
            push(IS_NULL, TypeRef::named(ty));
        }
        if let Some(ty) = is_empty {
            push(FilterKind::IsEmpty.key(), TypeRef::named(ty));
        }
        push(OR, TypeRef::named_list(&name));
        push(AND, TypeRef::named_list(&name));
        push(NOT, TypeRef::named_list(&name));

        self.registry.inputs.insert(
            name.clone(),
            InputObjectDef {
                name: name.clone(),
                fields,
            },
        );
        name
    }

    /// `<PREFIX>_<table>` with one input per matching field, or `None` when
    /// nothing matches.
    fn operator_input(
        &mut self,
        shape: &TableShape,
        prefix: &str,
        include: impl Fn(&Field) -> bool,
    ) -> Option<String> {
        let fields: Vec<InputFieldDef> = shape
            .table
            .fields
            .iter()
            .filter(|f| include(f))
            .map(|f| InputFieldDef {
                name: shape.escaped_field(&f.name).to_string(),
                ty: TypeRef::named(ScalarKind::from_field_type(f.field_type).type_name()),
                description: non_empty(f.description()),
            })
            .collect();
        if fields.is_empty() {
            return None;
        }
        let name = format!("{prefix}_{}", shape.name);
        self.registry.inputs.insert(
            name.clone(),
            InputObjectDef {
                name: name.clone(),
                fields,
            },
        );
        Some(name)
    }

    /// `<PREFIX>_<table>` enum of matching field names, or `None`.
    fn field_enum(
        &mut self,
        shape: &TableShape,
        prefix: &str,
        include: impl Fn(&Field) -> bool,
    ) -> Option<String> {
        let items: Vec<EnumItemDef> = shape
            .table
            .fields
            .iter()
            .filter(|f| include(f))
            .map(|f| EnumItemDef {
                name: shape.escaped_field(&f.name).to_string(),
                description: non_empty(f.description()),
            })
            .collect();
        if items.is_empty() {
            return None;
        }
        let name = format!("{prefix}_{}", shape.name);
        self.registry.enums.insert(
            name.clone(),
            EnumDef {
                name: name.clone(),
                items,
            },
        );
        Some(name)
    }

    fn create_sorting_input_type(&mut self, shape: &TableShape) -> Option<String> {
        let name = format!("SORTING_{}", shape.name);
        if self.registry.inputs.contains_key(&name) {
            return Some(name);
        }
        let fields_enum = self.field_enum(shape, "SORTING_FIELDS", |_| true)?;
        let fields = ["asc", "desc"]
            .into_iter()
            .map(|direction| InputFieldDef {
                name: direction.to_string(),
                ty: TypeRef::named(&fields_enum),
                description: None,
            })
            .collect();
        self.registry.inputs.insert(
            name.clone(),
            InputObjectDef {
                name: name.clone(),
                fields,
            },
        );
        Some(name)
    }

    fn where_fn(&self, shape: &Arc<TableShape>) -> WhereFn {
        let dialect = self.dialect.clone();
        let shape = shape.clone();
        Arc::new(move |alias, args| {
            translate_where(dialect.as_ref(), &shape, alias, args.get("where"))
        })
    }

    fn order_fn(&self, shape: &Arc<TableShape>) -> OrderByFn {
        let shape = shape.clone();
        Arc::new(move |args| translate_order(&shape, args.get("order")))
    }
}
