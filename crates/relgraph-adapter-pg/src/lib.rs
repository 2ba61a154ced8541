use async_trait::async_trait;
use relgraph_core::{AnnotationsConfig, Field, FieldType, RelgraphConfig, SchemaConfig, Table};
use relgraph_schema::{
    Adapter, ArgMap, FieldKind, FilterKind, PK_KEY, ResolveInfo, ScalarKind, SqlDialect,
    resolve_from_source, resolve_rows,
};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::{debug, info};

pub mod blob;
pub mod context;
pub mod introspect;

pub use blob::BlobId;
pub use context::PgContext;

#[derive(Debug, Clone)]
pub struct PostgresAdapterOptions {
    pub tables: SchemaConfig,
    pub annotations: AnnotationsConfig,
    /// Base URL blob links are built on.
    pub blob_link_base: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PostgresAdapterOptions {
    fn default() -> Self {
        Self::from_config(&RelgraphConfig::default())
    }
}

impl PostgresAdapterOptions {
    pub fn from_config(config: &RelgraphConfig) -> Self {
        Self {
            tables: config.schema.clone(),
            annotations: config.annotations.clone(),
            blob_link_base: config.blobs.link_base.clone(),
            max_connections: config.upstream.pool.max_connections,
            acquire_timeout: Duration::from_secs(config.upstream.pool.acquire_timeout_seconds),
        }
    }
}

pub struct PostgresAdapter {
    pool: sqlx::PgPool,
    options: PostgresAdapterOptions,
}

impl PostgresAdapter {
    pub async fn new(database_url: &str, options: PostgresAdapterOptions) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool, options })
    }

    pub fn from_pool(pool: sqlx::PgPool, options: PostgresAdapterOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub fn options(&self) -> &PostgresAdapterOptions {
        &self.options
    }

    /// Attach a pooled connection for one request.
    pub async fn create_context(&self) -> anyhow::Result<PgContext> {
        Ok(PgContext::new(self.pool.acquire().await?))
    }

    /// Bytes behind a blob link id. `None` when the row or value is missing.
    pub async fn read_blob(&self, id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let id = BlobId::decode(id)?;
        if !self.options.tables.allows(&id.table) {
            anyhow::bail!("table '{}' is not exposed", id.table);
        }

        let sql = format!(
            "SELECT {} AS data FROM {} WHERE {}::text = $1",
            quote_ident(&id.field),
            self.table_ref(&id.table),
            quote_ident(&id.primary_field)
        );
        debug!(sql = %sql, "reading blob");
        let rec = sqlx::query(&sql)
            .bind(id.primary_key_text())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match rec {
            Some(r) => r.try_get::<Option<Vec<u8>>, _>("data")?,
            None => None,
        })
    }

    fn blob_link(&self, source: &Value, info: &ResolveInfo<'_>) -> anyhow::Result<Value> {
        let (Some(parent), Some(column)) = (info.parent_type, info.field.sql_column.as_ref())
        else {
            return Ok(Value::Null);
        };
        let (Some(primary_field), Some(primary_key)) = (&parent.unique_key, source.get(PK_KEY))
        else {
            return Ok(Value::Null);
        };
        let id = BlobId {
            table: parent.sql_table.clone(),
            field: column.clone(),
            primary_field: primary_field.clone(),
            primary_key: primary_key.clone(),
        };
        Ok(Value::String(id.link(&self.options.blob_link_base)?))
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// SQL literal for a JSON scalar. Arrays and objects have none.
pub fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl SqlDialect for PostgresAdapter {
    fn quote(&self, identifier: &str) -> String {
        quote_ident(identifier)
    }

    fn table_ref(&self, table: &str) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.options.tables.db_schema),
            quote_ident(table)
        )
    }

    fn row_identity(&self, table_alias: &str) -> Option<String> {
        Some(format!("{table_alias}.ctid::text"))
    }

    fn create_sql_condition(
        &self,
        kind: FilterKind,
        table_alias: &str,
        field: &Field,
        value: Option<&Value>,
    ) -> String {
        let mut column = format!("{}.{}", table_alias, quote_ident(&field.name));
        if field.field_type == FieldType::Date {
            column = format!("CAST({} AS TIMESTAMP)", column);
        }
        if kind == FilterKind::IsEmpty {
            return format!("{} = ''", column);
        }

        let Some(mut literal) = value.and_then(sql_literal) else {
            return String::new();
        };
        if field.field_type == FieldType::Date {
            literal = format!("CAST({} AS TIMESTAMP)", literal);
        }
        match kind {
            FilterKind::Equals => format!("{} = {}", column, literal),
            FilterKind::Contains => format!("STRPOS(LOWER({}), LOWER({})) > 0", column, literal),
            FilterKind::Begins => format!("LEFT({}, LENGTH({})) = {}", column, literal, literal),
            FilterKind::Ends => format!("RIGHT({}, LENGTH({})) = {}", column, literal, literal),
            FilterKind::Greater => format!("{} > {}", column, literal),
            FilterKind::Less => format!("{} < {}", column, literal),
            FilterKind::IsEmpty => String::new(),
        }
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    type Context = PgContext;

    async fn get_tables(&self) -> anyhow::Result<Vec<Table>> {
        let mut tables = introspect::read_tables(&self.pool, &self.options.tables).await?;

        if self.options.annotations.enabled {
            let annotations =
                introspect::read_annotations(&self.pool, &self.options.annotations).await;
            tables = introspect::enrich_tables(tables, annotations, &self.options.annotations);
        }

        info!(
            schema = %self.options.tables.db_schema,
            tables = tables.len(),
            "read database metadata"
        );
        Ok(tables)
    }

    async fn resolve(
        &self,
        source: Option<&Value>,
        args: &ArgMap,
        context: &PgContext,
        info: &ResolveInfo<'_>,
    ) -> anyhow::Result<Value> {
        if let Some(source) = source {
            if matches!(info.field.kind, FieldKind::Scalar(ScalarKind::Url)) {
                return match source.get(info.response_key) {
                    Some(Value::Bool(true)) => self.blob_link(source, info),
                    _ => Ok(Value::Null),
                };
            }
            return resolve_from_source(source, args, info);
        }

        let plan = info
            .plan
            .ok_or_else(|| anyhow::anyhow!("root field '{}' resolved without a plan", info.field_name))?;
        let sql = root_query(self, plan);
        debug!(field = info.field_name, sql = %sql, "executing root query");

        let rows = context.query_rows(&sql).await?;
        resolve_rows(plan, rows, args)
    }
}

/// Wrap a plan so each row comes back as one JSON object, in plan order.
fn root_query(dialect: &dyn SqlDialect, plan: &relgraph_schema::SelectPlan) -> String {
    let order = plan.order_terms(dialect);
    let over = if order.is_empty() {
        String::new()
    } else {
        format!("ORDER BY {}", order.join(", "))
    };
    let mut inner = format!(
        "SELECT {}, row_number() OVER ({}) AS \"$row\" FROM {}",
        plan.select_list(dialect).join(", "),
        over,
        plan.from_clause(dialect)
    );
    if !plan.where_sql.is_empty() {
        inner.push_str(" WHERE ");
        inner.push_str(&plan.where_sql);
    }
    format!(
        "SELECT row_to_json(q) AS row FROM ({}) q ORDER BY q.\"$row\"",
        inner
    )
}
