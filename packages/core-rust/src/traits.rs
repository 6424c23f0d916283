//! Collaborator traits consumed by the pipeline.
//!
//! The pipeline never implements a query language, a cache backend, or a
//! data fetcher itself; hosts plug those in through the traits defined here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::response::{Location, PathSegment, ResponseError};

/// A failure reported by the engine: a parse rejection, one validation rule
/// violation, or an execution-level fault. Carries source positions and a
/// result path when the engine knows them.
#[derive(Debug, Clone, Default, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct EngineFault {
    pub message: String,
    pub locations: Vec<Location>,
    pub path: Vec<PathSegment>,
    pub extensions: Option<Map<String, Value>>,
}

impl EngineFault {
    /// Build a fault from a plain message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a source location.
    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.locations.push(Location { line, column });
        self
    }
}

/// Field-level faults pass through to the response *without* a category;
/// that absence is how consumers tell partial application failures from
/// protocol failures.
impl From<EngineFault> for ResponseError {
    fn from(fault: EngineFault) -> Self {
        Self {
            message: fault.message,
            category: None,
            locations: (!fault.locations.is_empty()).then_some(fault.locations),
            path: (!fault.path.is_empty()).then_some(fault.path),
            extensions: fault.extensions,
        }
    }
}

/// The kind of operation a document entry declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// The single operation selected from a parsed document for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Operation name; `None` for an anonymous operation.
    pub name: Option<String>,
    pub kind: OperationKind,
}

/// The engine's execution result: data plus any field-level errors it
/// embedded while resolving. Field-level errors are not pipeline failures.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    pub data: Option<Value>,
    pub errors: Vec<EngineFault>,
}

/// Arguments handed to [`QueryEngine::execute`] for one request.
pub struct ExecuteRequest<'a, D> {
    pub document: &'a D,
    pub operation_name: Option<&'a str>,
    pub variables: &'a Map<String, Value>,
    pub context: &'a mut ExecutionContext,
}

/// The black-box query engine: parser, validator, and executor over a typed
/// schema the engine owns. The pipeline drives it stage by stage and never
/// looks inside `Document`.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    /// Immutable parsed syntax tree. Owned by the processing of one request.
    type Document: Send + Sync;

    /// Parse query text into a document.
    ///
    /// # Errors
    ///
    /// Returns the syntax fault when the text is not well-formed.
    async fn parse(&self, query: &str) -> Result<Self::Document, EngineFault>;

    /// Validate a document against the engine's schema with its standard
    /// rule set plus the named extra rules. An empty result means valid.
    async fn validate(&self, document: &Self::Document, extra_rules: &[String])
        -> Vec<EngineFault>;

    /// Select the operation named `name`, or the sole operation when `name`
    /// is absent and the document contains exactly one. Ambiguous or missing
    /// resolution returns `None`; the engine reports it at execute time.
    fn operation(&self, document: &Self::Document, name: Option<&str>)
        -> Option<OperationDescriptor>;

    /// Execute the selected operation.
    ///
    /// # Errors
    ///
    /// Returns a fault only for execution-level failures (an operation that
    /// cannot be resolved, an executor crash). Field-level resolver errors
    /// belong inside the `Ok` result.
    async fn execute(
        &self,
        request: ExecuteRequest<'_, Self::Document>,
    ) -> Result<EngineResponse, EngineFault>;
}

/// Async key-value store for persisted query text. Writes are best-effort
/// from the pipeline's perspective; a failed write never fails a request.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Look up a stored value.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store a value. Concurrent writes of the same key must be idempotent.
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Environment handed to a data source during per-request initialization.
pub struct DataSourceEnv<'a> {
    /// The request's execution context as built so far.
    pub context: &'a ExecutionContext,
    /// The configured persisted-query cache, when one exists. Data sources
    /// may reuse it for their own response caching.
    pub cache: Option<Arc<dyn QueryCache>>,
}

/// An auxiliary data-fetching component attached to the execution context
/// once per request.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Called exactly once per request, before any stage runs.
    ///
    /// # Errors
    ///
    /// An initialization failure aborts processor construction.
    async fn initialize(&self, env: DataSourceEnv<'_>) -> anyhow::Result<()>;
}
