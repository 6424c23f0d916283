//! `QueryGate` Core — wire types, error taxonomy, and collaborator traits for
//! the query-request pipeline.
//!
//! This crate is transport-agnostic and engine-agnostic. It defines:
//! - the request/response envelope ([`Request`], [`Response`]),
//! - the stable error taxonomy ([`ErrorCategory`], [`ClassifiedError`]),
//! - the per-request [`ExecutionContext`],
//! - the traits a host wires in: [`QueryEngine`], [`QueryCache`], [`DataSource`].
//!
//! The pipeline itself (persisted queries, staged processing, instrumentation)
//! lives in `querygate-pipeline`.

pub mod context;
pub mod error;
pub mod request;
pub mod response;
pub mod traits;

pub use context::{ContextError, ExecutionContext, DATA_SOURCES_KEY};
pub use error::{ClassifiedError, ErrorCategory};
pub use request::{Extensions, PersistedQueryExtension, Request};
pub use response::{Location, PathSegment, Response, ResponseError};
pub use traits::{
    DataSource, DataSourceEnv, EngineFault, EngineResponse, ExecuteRequest, OperationDescriptor,
    OperationKind, QueryCache, QueryEngine,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
