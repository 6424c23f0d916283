//! Cache-control annotation instrument.
//!
//! Contributes a static `"cacheControl"` response extension so downstream
//! HTTP caches (and the transport adapter building `Cache-Control` headers)
//! know how long a response may be reused. Policy resolution per field is
//! the engine's business; this instrument only surfaces the configured
//! request-level hint.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Instrument;

/// Visibility scope of a cache hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Response may be stored by shared caches.
    Public,
    /// Response is specific to one client and must not be shared.
    Private,
}

impl CacheScope {
    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
        }
    }
}

/// Annotates every response with a cache-control extension.
#[derive(Debug, Clone)]
pub struct CacheHintInstrument {
    max_age_secs: u64,
    scope: CacheScope,
}

impl CacheHintInstrument {
    #[must_use]
    pub fn new(max_age_secs: u64, scope: CacheScope) -> Self {
        Self {
            max_age_secs,
            scope,
        }
    }
}

#[async_trait]
impl Instrument for CacheHintInstrument {
    fn response_extension(&self) -> Option<(String, Value)> {
        Some((
            "cacheControl".to_string(),
            json!({
                "version": 1,
                "maxAge": self.max_age_secs,
                "scope": self.scope.as_str(),
            }),
        ))
    }
}
