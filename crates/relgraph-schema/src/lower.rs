//! Lowering of a [`GraphSchema`] into an executable `async-graphql` schema.
//!
//! Root fields plan one statement for their whole selection and hand it to
//! the adapter. Every other field resolves from the value its parent already
//! holds, again through the adapter so it can post-process (blob links).

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object,
    ResolverContext, Scalar, Schema, TypeRef,
};
use async_graphql::{Request, Response, SelectionField};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;

use crate::adapter::{Adapter, ArgMap, ResolveInfo};
use crate::error::SchemaError;
use crate::plan::{Selection, plan_root};
use crate::registry::{
    ConnectionType, DATE_SCALAR, FieldDef, FieldKind, GraphSchema, ObjectType, PAGE_INFO_TYPE,
    QUERY_TYPE, URL_SCALAR,
};

/// A synthesized schema that can execute GraphQL requests.
///
/// Requests must carry the adapter's per-request context as data.
pub struct ExecutableSchema {
    graph: Arc<GraphSchema>,
    schema: Schema,
}

impl ExecutableSchema {
    pub fn graph(&self) -> &GraphSchema {
        &self.graph
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Schema definition language of the whole schema.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }

    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        self.schema.execute(request).await
    }
}

impl std::fmt::Debug for ExecutableSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableSchema")
            .field("tables", &self.graph.tables().len())
            .finish()
    }
}

pub fn lower<A: Adapter>(
    graph: Arc<GraphSchema>,
    adapter: Arc<A>,
) -> Result<ExecutableSchema, SchemaError> {
    let mut query = Object::new(QUERY_TYPE);
    for field in graph.root_fields() {
        query = query.field(root_field(field.clone(), adapter.clone()));
    }

    let mut builder = Schema::build(QUERY_TYPE, None, None)
        .register(query)
        .register(page_info_type())
        .register(
            Scalar::new(DATE_SCALAR)
                .description("Date and time, ISO 8601")
                .validator(is_date),
        )
        .register(
            Scalar::new(URL_SCALAR)
                .description("Link to binary content")
                .validator(|value| matches!(value, async_graphql::Value::String(_))),
        );

    let registry = graph.registry();
    for object in registry.objects() {
        builder = builder.register(object_type(object.clone(), adapter.clone()));
    }
    for connection in registry.connections() {
        let (connection_object, edge_object) = connection_types(connection);
        builder = builder.register(connection_object).register(edge_object);
    }
    for input in registry.inputs() {
        let mut object = InputObject::new(&input.name);
        for field in &input.fields {
            let mut value = InputValue::new(&field.name, field.ty.clone());
            if let Some(description) = &field.description {
                value = value.description(description);
            }
            object = object.field(value);
        }
        builder = builder.register(object);
    }
    for def in registry.enums() {
        let mut e = Enum::new(&def.name);
        for item in &def.items {
            let mut enum_item = EnumItem::new(&item.name);
            if let Some(description) = &item.description {
                enum_item = enum_item.description(description);
            }
            e = e.item(enum_item);
        }
        builder = builder.register(e);
    }

    let schema = builder
        .finish()
        .map_err(|e| SchemaError::Finish(e.to_string()))?;
    Ok(ExecutableSchema { graph, schema })
}

fn with_args(mut field: Field, def: &FieldDef) -> Field {
    for arg in &def.args {
        field = field.argument(InputValue::new(&arg.name, arg.ty.clone()));
    }
    if !def.description.is_empty() {
        field = field.description(&def.description);
    }
    field
}

fn root_field<A: Adapter>(def: Arc<FieldDef>, adapter: Arc<A>) -> Field {
    let field = Field::new(def.name.clone(), def.type_ref(), {
        let def = def.clone();
        move |ctx| {
            let def = def.clone();
            let adapter = adapter.clone();
            FieldFuture::new(async move {
                let selection = selection_of(&ctx.ctx.field())?;
                let plan = plan_root(&def, &selection)?;
                let info = ResolveInfo {
                    field_name: &def.name,
                    response_key: selection.response_key(),
                    parent_type: None,
                    field: &def,
                    plan: Some(&plan),
                };
                let context = ctx.ctx.data::<A::Context>()?;
                let value = adapter
                    .resolve(None, &selection.args, context, &info)
                    .await?;
                Ok(Some(FieldValue::owned_any(value)))
            })
        }
    });
    with_args(field, &def)
}

fn object_type<A: Adapter>(object: Arc<ObjectType>, adapter: Arc<A>) -> Object {
    let mut out = Object::new(&object.name);
    if let Some(description) = &object.description {
        out = out.description(description);
    }
    for def in object.fields() {
        out = out.field(object_field(object.clone(), def.clone(), adapter.clone()));
    }
    out
}

fn object_field<A: Adapter>(object: Arc<ObjectType>, def: Arc<FieldDef>, adapter: Arc<A>) -> Field {
    let field = Field::new(def.name.clone(), def.type_ref(), {
        let def = def.clone();
        move |ctx| {
            let def = def.clone();
            let object = object.clone();
            let adapter = adapter.clone();
            FieldFuture::new(async move {
                let source = parent_json(&ctx)?;
                let response_key = {
                    let selection = ctx.ctx.field();
                    selection.alias().unwrap_or(selection.name()).to_string()
                };
                let args = args_of(&ctx)?;
                let info = ResolveInfo {
                    field_name: &def.name,
                    response_key: &response_key,
                    parent_type: Some(&object),
                    field: &def,
                    plan: None,
                };
                let context = ctx.ctx.data::<A::Context>()?;
                let value = adapter.resolve(Some(source), &args, context, &info).await?;
                if value.is_null() {
                    return Ok(None);
                }
                match def.kind {
                    FieldKind::Scalar(_) => Ok(Some(FieldValue::value(
                        async_graphql::Value::from_json(value)?,
                    ))),
                    FieldKind::Connection(_) | FieldKind::Emulated(_) => {
                        Ok(Some(FieldValue::owned_any(value)))
                    }
                }
            })
        }
    });
    with_args(field, &def)
}

/// `<T>Connection` and `<T>Edge` over connection values built by
/// [`connection_from_array`](crate::pagination::connection_from_array).
fn connection_types(connection: &ConnectionType) -> (Object, Object) {
    let connection_object = Object::new(&connection.name)
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list(&connection.edge_name),
            |ctx| {
                FieldFuture::new(async move {
                    let edges = parent_json(&ctx)?["edges"].as_array().cloned().unwrap_or_default();
                    Ok(Some(FieldValue::list(edges.into_iter().map(FieldValue::owned_any))))
                })
            },
        ))
        .field(Field::new(
            "nodes",
            TypeRef::named_nn_list(&connection.node_name),
            |ctx| {
                FieldFuture::new(async move {
                    let nodes: Vec<Value> = parent_json(&ctx)?["edges"]
                        .as_array()
                        .map(|edges| edges.iter().map(|e| e["node"].clone()).collect())
                        .unwrap_or_default();
                    Ok(Some(FieldValue::list(nodes.into_iter().map(FieldValue::owned_any))))
                })
            },
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn(PAGE_INFO_TYPE),
            |ctx| {
                FieldFuture::new(async move {
                    let page_info = parent_json(&ctx)?["pageInfo"].clone();
                    Ok(Some(FieldValue::owned_any(page_info)))
                })
            },
        ))
        .field(
            Field::new("total", TypeRef::named_nn(TypeRef::INT), |ctx| {
                FieldFuture::new(async move { json_field(&ctx, "total") })
            })
            .description("Number of rows before pagination"),
        );

    let edge_object = Object::new(&connection.edge_name)
        .field(Field::new("cursor", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move { json_field(&ctx, "cursor") })
        }))
        .field(Field::new(
            "node",
            TypeRef::named_nn(&connection.node_name),
            |ctx| {
                FieldFuture::new(async move {
                    let node = parent_json(&ctx)?["node"].clone();
                    Ok(Some(FieldValue::owned_any(node)))
                })
            },
        ));

    (connection_object, edge_object)
}

fn page_info_type() -> Object {
    let mut object = Object::new(PAGE_INFO_TYPE);
    for (name, ty) in [
        ("startCursor", TypeRef::named(TypeRef::STRING)),
        ("endCursor", TypeRef::named(TypeRef::STRING)),
        ("hasPreviousPage", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("hasNextPage", TypeRef::named_nn(TypeRef::BOOLEAN)),
    ] {
        object = object.field(Field::new(name, ty, move |ctx| {
            FieldFuture::new(async move { json_field(&ctx, name) })
        }));
    }
    object
}

fn parent_json<'a>(ctx: &ResolverContext<'a>) -> async_graphql::Result<&'a Value> {
    ctx.parent_value.try_downcast_ref::<Value>()
}

/// A scalar member of the parent value.
fn json_field<'a>(
    ctx: &ResolverContext<'a>,
    key: &str,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    match parent_json(ctx)?.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(FieldValue::value(async_graphql::Value::from_json(
            value.clone(),
        )?))),
    }
}

fn args_of(ctx: &ResolverContext<'_>) -> async_graphql::Result<ArgMap> {
    let mut args = ArgMap::new();
    for (name, value) in ctx.args.as_index_map() {
        args.insert(name.to_string(), value.clone().into_json()?);
    }
    Ok(args)
}

/// The selection below a field, with variables resolved.
fn selection_of(field: &SelectionField<'_>) -> async_graphql::Result<Selection> {
    let mut selection = Selection::new(field.name());
    selection.alias = field.alias().map(str::to_string);
    for (name, value) in field.arguments()? {
        selection.args.insert(name.to_string(), value.into_json()?);
    }
    for child in field.selection_set() {
        selection.children.push(selection_of(&child)?);
    }
    Ok(selection)
}

/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM:SS[.fff]` and `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn is_date(value: &async_graphql::Value) -> bool {
    match value {
        async_graphql::Value::String(text) => parse_date(text).is_some(),
        _ => false,
    }
}
