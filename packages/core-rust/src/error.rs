//! Stable error taxonomy for pipeline-level failures.
//!
//! Every failure the pipeline itself detects is classified into one of the
//! [`ErrorCategory`] variants before it reaches a transport adapter. The
//! category names are part of the wire contract: transports map them to
//! status codes, clients branch on them. Field-level errors produced by the
//! engine during execution are deliberately *not* classified and pass
//! through with no category.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::response::{Location, PathSegment, ResponseError};
use crate::traits::EngineFault;

/// Stable, transport-independent error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The parser rejected the query text.
    SyntaxError,
    /// The validator reported one or more rule violations.
    ValidationError,
    /// Malformed persisted-query protocol usage, or no query at all.
    InvalidRequest,
    /// A persisted-query extension was sent but no cache is configured.
    PersistedQueryNotSupported,
    /// Hash-only request whose hash is unknown to the cache.
    PersistedQueryNotFound,
    /// The engine raised during execution (distinct from field-level errors).
    ExecutionError,
}

impl ErrorCategory {
    /// The stable wire name of this category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxError => "SyntaxError",
            Self::ValidationError => "ValidationError",
            Self::InvalidRequest => "InvalidRequest",
            Self::PersistedQueryNotSupported => "PersistedQueryNotSupported",
            Self::PersistedQueryNotFound => "PersistedQueryNotFound",
            Self::ExecutionError => "ExecutionError",
        }
    }

    /// True for categories describing a fault in the request itself (a
    /// transport would map these to its 4xx equivalent). `ExecutionError`
    /// is the only server-side category.
    #[must_use]
    pub fn is_request_fault(self) -> bool {
        !matches!(self, Self::ExecutionError)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline failure carrying its category plus whatever detail the engine
/// fault provided. Classification never discards the original message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{category}: {message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub locations: Vec<Location>,
    pub path: Vec<PathSegment>,
    pub extensions: Option<Map<String, Value>>,
}

impl ClassifiedError {
    /// Build a classified error from a plain message.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }

    /// Classify an engine fault, preserving its message, locations, path,
    /// and extensions.
    #[must_use]
    pub fn from_fault(category: ErrorCategory, fault: EngineFault) -> Self {
        Self {
            category,
            message: fault.message,
            locations: fault.locations,
            path: fault.path,
            extensions: fault.extensions,
        }
    }
}

impl From<ClassifiedError> for ResponseError {
    fn from(err: ClassifiedError) -> Self {
        Self {
            message: err.message,
            category: Some(err.category),
            locations: (!err.locations.is_empty()).then_some(err.locations),
            path: (!err.path.is_empty()).then_some(err.path),
            extensions: err.extensions,
        }
    }
}
