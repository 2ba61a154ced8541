//! Per-request execution context.

use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};
use tokio::sync::Mutex;

/// One pooled connection attached to a request. Queries of the request run
/// on it one at a time.
pub struct PgContext {
    conn: Mutex<PoolConnection<Postgres>>,
}

impl PgContext {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run a statement producing one JSON object per row in a `row` column.
    pub async fn query_rows(&self, sql: &str) -> anyhow::Result<Vec<Map<String, Value>>> {
        let mut conn = self.conn.lock().await;
        let recs = sqlx::query(sql).fetch_all(&mut **conn).await?;

        let mut rows = Vec::with_capacity(recs.len());
        for r in recs {
            match r.try_get::<Value, _>("row")? {
                Value::Object(row) => rows.push(row),
                other => anyhow::bail!("expected a JSON object row, got {}", other),
            }
        }
        Ok(rows)
    }
}
