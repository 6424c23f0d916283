//! Incoming request envelope.
//!
//! A [`Request`] carries either full query text, a persisted-query hash
//! extension, or both (the registration case). Wire field names follow the
//! conventional camelCase shape (`operationName`, `persistedQuery`,
//! `sha256Hash`) so any transport adapter can bind with serde alone.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single logical query request, independent of how it arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Full query text. May be absent on persisted-query (hash-only) requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Name of the operation to execute when the document contains several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Operation variables.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    /// Protocol extensions, including the persisted-query envelope.
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
    /// Opaque transport-supplied metadata (headers, peer info, ...).
    /// Never serialized; the pipeline does not interpret it.
    #[serde(skip)]
    pub transport_metadata: Option<Value>,
}

impl Request {
    /// Build a plain full-text request.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// Deserialize a request from a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when the body does not match the
    /// request shape (wrong types, malformed `persistedQuery` envelope, ...).
    pub fn from_json(body: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(body.clone())
    }
}

/// Request extensions. `persistedQuery` is the only extension the pipeline
/// interprets; everything else is preserved untouched in `other`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(
        rename = "persistedQuery",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub persisted_query: Option<PersistedQueryExtension>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Extensions {
    /// True when no extension of any kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persisted_query.is_none() && self.other.is_empty()
    }
}

/// The persisted-query protocol envelope: `{ version, sha256Hash }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueryExtension {
    /// Protocol version. Only version 1 is supported.
    pub version: u32,
    /// Lowercase hex SHA-256 of the query text.
    pub sha256_hash: String,
}
