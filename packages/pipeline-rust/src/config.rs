//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once by the host and shared across request
//! processors via `Arc`. Everything per-request (execution context, data
//! sources, instrument instances) is constructed fresh from it, which is
//! what keeps sibling requests isolated.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use querygate_core::{
    DataSource, ExecutionContext, OperationDescriptor, QueryCache, Response,
};

use crate::instrument::Instrument;

/// Produces the data sources for one request. Called once per processor.
pub type DataSourceFactory =
    Arc<dyn Fn() -> HashMap<String, Arc<dyn DataSource>> + Send + Sync>;

/// Produces one instrumentation participant for one request.
pub type InstrumentFactory = Arc<dyn Fn() -> Arc<dyn Instrument> + Send + Sync>;

/// Notified after operation resolution, before execution. The single
/// extension point for operation-scoped authorization and logging.
pub type WillExecuteOperation =
    Arc<dyn Fn(&ExecutionContext, &OperationDescriptor) + Send + Sync>;

/// Rewrites the response during formatting, seeing the execution context.
pub type FormatResponse = Arc<dyn Fn(Response, &ExecutionContext) -> Response + Send + Sync>;

/// Optional processor callbacks. Every recognized hook is an explicit field,
/// checked for presence before invocation.
#[derive(Clone, Default)]
pub struct Hooks {
    pub will_execute_operation: Option<WillExecuteOperation>,
    pub format_response: Option<FormatResponse>,
}

/// Shared pipeline configuration.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Persisted-query cache. `None` disables the protocol entirely:
    /// requests carrying the extension are rejected.
    pub persisted_query_cache: Option<Arc<dyn QueryCache>>,
    /// Names of extra validation rules passed to the engine on top of its
    /// standard set.
    pub validation_rules: Vec<String>,
    /// Caller-supplied context values, value-copied into every request's
    /// execution context.
    pub context_values: Map<String, Value>,
    /// Data-source factory, invoked once per processor.
    pub data_sources: Option<DataSourceFactory>,
    /// Instrument factories; instances are created per processor and
    /// composed into a stack in this order.
    pub instruments: Vec<InstrumentFactory>,
    /// Optional processor callbacks.
    pub hooks: Hooks,
}

impl PipelineConfig {
    /// Register an instrument factory at the end of the stack.
    pub fn add_instrument(
        &mut self,
        factory: impl Fn() -> Arc<dyn Instrument> + Send + Sync + 'static,
    ) {
        self.instruments.push(Arc::new(factory));
    }

    /// Set a context value shared by all requests built from this config.
    pub fn set_context_value(&mut self, key: impl Into<String>, value: Value) {
        self.context_values.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::instrument::TimingInstrument;

    use super::*;

    #[test]
    fn default_config_is_bare() {
        let config = PipelineConfig::default();
        assert!(config.persisted_query_cache.is_none());
        assert!(config.instruments.is_empty());
        assert!(config.hooks.will_execute_operation.is_none());
        assert!(config.hooks.format_response.is_none());
    }

    #[test]
    fn add_instrument_appends_factories_in_order() {
        let mut config = PipelineConfig::default();
        config.add_instrument(|| Arc::new(TimingInstrument::new()));
        config.add_instrument(|| Arc::new(TimingInstrument::new()));
        assert_eq!(config.instruments.len(), 2);
    }

    #[test]
    fn set_context_value_accumulates() {
        let mut config = PipelineConfig::default();
        config.set_context_value("tenant", json!("acme"));
        assert_eq!(config.context_values["tenant"], json!("acme"));
    }
}
