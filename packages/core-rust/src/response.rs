//! Outgoing response envelope.
//!
//! A [`Response`] is the only thing the pipeline ever hands back to a
//! transport adapter: protocol failures and engine results alike are shaped
//! into `{ data?, errors?, extensions? }` before leaving the processor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClassifiedError, ErrorCategory};

/// The structured result of processing one request. Immutable once handed to
/// the transport adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ResponseError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl Response {
    /// Build an error-only response from classified pipeline errors.
    /// Order is preserved; `data` stays absent.
    #[must_use]
    pub fn from_classified(errors: Vec<ClassifiedError>) -> Self {
        Self {
            data: None,
            errors: Some(errors.into_iter().map(ResponseError::from).collect()),
            extensions: None,
        }
    }

    /// Insert a response extension, creating the extensions map on first use.
    pub fn insert_extension(&mut self, key: impl Into<String>, value: Value) {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
    }

    /// True when the response carries at least one error in the given
    /// category. Field-level engine errors have no category and never match.
    #[must_use]
    pub fn has_category(&self, category: ErrorCategory) -> bool {
        self.errors
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|e| e.category == Some(category))
    }
}

/// A single response error. `category` is set for pipeline-classified errors
/// and absent for field-level errors the engine embedded in its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

/// Source position within the query text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// One step in a result path: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}
