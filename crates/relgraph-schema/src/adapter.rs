use async_trait::async_trait;
use relgraph_core::{Field, Table};
use serde_json::{Map, Value};

use crate::filter::FilterKind;
use crate::pagination::{PageArgs, connection_from_array};
use crate::plan::SelectPlan;
use crate::registry::{FieldDef, ObjectType};

/// Field arguments as JSON, in the order they were written.
pub type ArgMap = Map<String, Value>;

/// Dialect hooks used while translating arguments into SQL.
///
/// Object safe: the closures attached to schema fields hold it as
/// `Arc<dyn SqlDialect>`.
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier.
    fn quote(&self, identifier: &str) -> String;

    /// Reference to a table in a FROM clause.
    fn table_ref(&self, table: &str) -> String {
        self.quote(table)
    }

    /// Expression identifying a physical row of `table_alias`, selected for
    /// tables without a primary field so identical rows stay distinct.
    fn row_identity(&self, _table_alias: &str) -> Option<String> {
        None
    }

    /// Render one atomic condition. An empty string means the combination is
    /// not supported and the condition is left out.
    fn create_sql_condition(
        &self,
        kind: FilterKind,
        table_alias: &str,
        field: &Field,
        value: Option<&Value>,
    ) -> String;
}

/// What the resolution layer knows about the field being resolved.
#[derive(Clone, Copy)]
pub struct ResolveInfo<'a> {
    pub field_name: &'a str,
    /// Alias when given, field name otherwise. Hydrated rows are keyed by it.
    pub response_key: &'a str,
    /// `None` for root fields.
    pub parent_type: Option<&'a ObjectType>,
    pub field: &'a FieldDef,
    /// Select plan built from the selection; only set for root fields.
    pub plan: Option<&'a SelectPlan>,
}

/// Metadata provider and query executor behind a synthesized schema.
#[async_trait]
pub trait Adapter: SqlDialect + 'static {
    /// Per-request execution context (for example one attached connection).
    type Context: Send + Sync + 'static;

    /// Full metadata snapshot, annotations merged in.
    async fn get_tables(&self) -> anyhow::Result<Vec<Table>>;

    /// Resolve one field.
    ///
    /// With a `source`, the value was already fetched with its parent. Without
    /// one, the adapter runs the query described by `info.plan` and returns a
    /// connection.
    async fn resolve(
        &self,
        source: Option<&Value>,
        args: &ArgMap,
        context: &Self::Context,
        info: &ResolveInfo<'_>,
    ) -> anyhow::Result<Value>;
}

/// Resolve a value that was fetched together with its parent.
///
/// Arrays (link fields) are turned into connections, everything else is
/// returned as is.
pub fn resolve_from_source(
    source: &Value,
    args: &ArgMap,
    info: &ResolveInfo<'_>,
) -> anyhow::Result<Value> {
    match source.get(info.response_key) {
        Some(Value::Array(items)) => {
            let page = PageArgs::from_args(args)?;
            Ok(connection_from_array(items.clone(), &page)?)
        }
        Some(value) => Ok(value.clone()),
        None => Ok(Value::Null),
    }
}

/// Turn the rows of a root query into a paginated connection.
pub fn resolve_rows(
    plan: &SelectPlan,
    rows: Vec<Map<String, Value>>,
    args: &ArgMap,
) -> anyhow::Result<Value> {
    let nodes = plan.hydrate(&rows);
    let page = PageArgs::from_args(args)?;
    Ok(connection_from_array(nodes, &page)?)
}
