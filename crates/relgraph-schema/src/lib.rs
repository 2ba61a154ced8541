//! GraphQL schema synthesis over relational metadata.
//!
//! [`NlpSchema`] reads a metadata snapshot through an [`Adapter`] and builds
//! one object type per table, connection types for links, filter and sorting
//! inputs, and emulated object types for annotated field groups. The result
//! is lowered into an executable `async-graphql` schema whose root fields
//! translate each request into a single SQL statement.

pub mod adapter;
pub mod engine;
pub mod error;
pub mod filter;
pub mod lower;
pub mod names;
pub mod order;
pub mod pagination;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod state;

pub use adapter::{Adapter, ArgMap, ResolveInfo, SqlDialect, resolve_from_source, resolve_rows};
pub use engine::{BUILD_PROGRESS_TOTAL, NlpSchema, build};
pub use error::{SchemaError, TranslateError};
pub use filter::{FilterKind, translate_where};
pub use lower::{ExecutableSchema, lower};
pub use names::NameScope;
pub use order::{OrderBy, SortDirection, translate_order};
pub use pagination::{PageArgs, connection_from_array};
pub use plan::{PK_KEY, SelectPlan, Selection, plan_root};
pub use progress::{NoProgress, ProgressReporter, TracingProgress};
pub use registry::{
    ConnectionType, FieldDef, FieldKind, GraphSchema, ObjectType, QUERY_TYPE, ScalarKind,
    TableShape, TypeRegistry,
};
pub use state::{SchemaHandle, SchemaState};
