//! Shared schema state across rebuilds.
//!
//! Requests keep being served by the last good schema while a rebuild runs.
//! Before the first build completes, and after a failed build, requests are
//! rejected as temporarily unavailable.

use async_graphql::{Request, Response, ServerError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::adapter::Adapter;
use crate::engine::NlpSchema;
use crate::error::SchemaError;
use crate::lower::ExecutableSchema;
use crate::progress::ProgressReporter;

#[derive(Debug, Clone)]
pub enum SchemaState {
    Building,
    Ready(Arc<ExecutableSchema>),
    Failed(String),
}

#[derive(Debug)]
pub struct SchemaHandle {
    state: RwLock<SchemaState>,
}

impl Default for SchemaHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaHandle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SchemaState::Building),
        }
    }

    pub fn ready(schema: ExecutableSchema) -> Self {
        Self {
            state: RwLock::new(SchemaState::Ready(Arc::new(schema))),
        }
    }

    pub async fn state(&self) -> SchemaState {
        self.state.read().await.clone()
    }

    /// Build a new schema and swap it in. A failed build replaces whatever was
    /// served before.
    pub async fn rebuild<A: Adapter>(
        &self,
        engine: &NlpSchema<A>,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<Arc<ExecutableSchema>, SchemaError> {
        {
            let mut state = self.state.write().await;
            if !matches!(*state, SchemaState::Ready(_)) {
                *state = SchemaState::Building;
            }
        }

        match engine.create_executable(progress).await {
            Ok(schema) => {
                let schema = Arc::new(schema);
                *self.state.write().await = SchemaState::Ready(schema.clone());
                info!("schema ready");
                Ok(schema)
            }
            Err(e) => {
                error!(error = %e, "schema build failed");
                *self.state.write().await = SchemaState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// The schema currently served.
    pub async fn current(&self) -> Result<Arc<ExecutableSchema>, SchemaError> {
        match &*self.state.read().await {
            SchemaState::Ready(schema) => Ok(schema.clone()),
            SchemaState::Building => Err(SchemaError::Unavailable(
                "schema is being built".to_string(),
            )),
            SchemaState::Failed(reason) => Err(SchemaError::Unavailable(format!(
                "last schema build failed: {reason}"
            ))),
        }
    }

    /// Execute against the current schema, or answer with an error response
    /// when none is available.
    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        match self.current().await {
            Ok(schema) => schema.execute(request).await,
            Err(e) => Response::from_errors(vec![ServerError::new(e.to_string(), None)]),
        }
    }
}
