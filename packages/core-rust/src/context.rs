//! Per-request execution context.
//!
//! The context combines a value-copy of the caller-supplied context map with
//! the data sources initialized for this request. It is created once when a
//! processor is constructed, mutated freely while the request runs, and
//! discarded with the processor — sibling requests built from the same
//! configuration never observe each other's mutations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::traits::DataSource;

/// Reserved context key under which initialized data sources are attached.
/// A caller context that already defines this key is a misconfiguration.
pub const DATA_SOURCES_KEY: &str = "dataSources";

/// Construction-time context failures. These indicate programming errors in
/// the host, not runtime conditions, and are raised before any request runs.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context already defines reserved key {key:?}")]
    ReservedKey { key: String },
    #[error("data source {name:?} failed to initialize")]
    DataSourceInit {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Per-request mutable bag: caller context values plus initialized data
/// sources.
pub struct ExecutionContext {
    values: Map<String, Value>,
    data_sources: HashMap<String, Arc<dyn DataSource>>,
}

impl ExecutionContext {
    /// Build a context from a value-copy of the caller's context map.
    ///
    /// # Errors
    ///
    /// Fails fast with [`ContextError::ReservedKey`] when the caller's map
    /// already defines [`DATA_SOURCES_KEY`], which would silently shadow the
    /// initialized data sources.
    pub fn new(values: Map<String, Value>) -> Result<Self, ContextError> {
        if values.contains_key(DATA_SOURCES_KEY) {
            return Err(ContextError::ReservedKey {
                key: DATA_SOURCES_KEY.to_string(),
            });
        }
        Ok(Self {
            values,
            data_sources: HashMap::new(),
        })
    }

    /// Read a context value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set or replace a context value.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// All context values.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Look up an initialized data source by name.
    #[must_use]
    pub fn data_source(&self, name: &str) -> Option<&Arc<dyn DataSource>> {
        self.data_sources.get(name)
    }

    /// Attach the initialized data sources for this request. Called once by
    /// the processor after every source's `initialize` has succeeded.
    pub fn attach_data_sources(&mut self, sources: HashMap<String, Arc<dyn DataSource>>) {
        self.data_sources = sources;
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("values", &self.values)
            .field(
                "data_sources",
                &self.data_sources.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
