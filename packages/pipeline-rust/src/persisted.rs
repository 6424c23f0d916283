//! Persisted-query (APQ) protocol handler.
//!
//! Clients may send a SHA-256 hash of their query text instead of the text
//! itself once the text has been registered. The handler resolves a request
//! down to final query text, consulting and populating the configured
//! [`QueryCache`]. Cache keys are `"apq:" + hex(sha256(text))`.
//!
//! The write-back on the registration path is detached from the request: it
//! is spawned, never awaited, and its failure is logged rather than
//! surfaced, so a slow or failing cache never delays the triggering request.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use querygate_core::{ClassifiedError, ErrorCategory, QueryCache, Request};

/// Cache key namespace for persisted query records.
pub const APQ_KEY_PREFIX: &str = "apq:";

/// Persisted-query protocol version this handler implements.
pub const APQ_VERSION: u32 = 1;

/// Lowercase hex SHA-256 of query text, as used in the protocol envelope.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Cache key for a given query hash.
#[must_use]
pub fn cache_key(hash: &str) -> String {
    format!("{APQ_KEY_PREFIX}{hash}")
}

/// The outcome of persisted-query resolution: final query text plus the two
/// protocol flags surfaced to instrumentation at request start.
#[derive(Debug, Clone, Default)]
pub struct ResolvedQuery {
    /// Final query text. Empty when the request carried neither text nor a
    /// resolvable hash and no extension was present.
    pub query: String,
    /// The text was served from the cache for a hash-only request.
    pub hit: bool,
    /// The request carried both text and a matching hash; a write-back was
    /// scheduled.
    pub registered: bool,
}

/// Resolve a request's final query text.
///
/// Requests without a `persistedQuery` extension pass through unchanged with
/// both flags false. For requests with the extension, the full protocol from
/// the module docs applies.
///
/// # Errors
///
/// - [`ErrorCategory::PersistedQueryNotSupported`] when the extension is
///   present but no cache is configured.
/// - [`ErrorCategory::InvalidRequest`] on an unsupported protocol version or
///   a hash that does not match the provided text.
/// - [`ErrorCategory::PersistedQueryNotFound`] on a hash-only request whose
///   hash the cache does not know.
pub async fn resolve_query(
    request: &Request,
    cache: Option<&Arc<dyn QueryCache>>,
) -> Result<ResolvedQuery, ClassifiedError> {
    let Some(ext) = &request.extensions.persisted_query else {
        return Ok(ResolvedQuery {
            query: request.query.clone().unwrap_or_default(),
            ..ResolvedQuery::default()
        });
    };

    let Some(cache) = cache else {
        return Err(ClassifiedError::new(
            ErrorCategory::PersistedQueryNotSupported,
            "PersistedQueryNotSupported",
        ));
    };

    if ext.version != APQ_VERSION {
        return Err(ClassifiedError::new(
            ErrorCategory::InvalidRequest,
            "Unsupported persisted query version",
        ));
    }

    match &request.query {
        // Hash-only request: the text must already be registered.
        None => {
            let key = cache_key(&ext.sha256_hash);
            match cache.get(&key).await {
                Ok(Some(query)) => {
                    debug!(key = %key, "persisted query cache hit");
                    Ok(ResolvedQuery {
                        query,
                        hit: true,
                        registered: false,
                    })
                }
                Ok(None) => Err(ClassifiedError::new(
                    ErrorCategory::PersistedQueryNotFound,
                    "PersistedQueryNotFound",
                )),
                Err(err) => {
                    // A failing cache read is indistinguishable from a miss
                    // to the client; the protocol lets it retry with text.
                    warn!(key = %key, error = %err, "persisted query cache read failed");
                    Err(ClassifiedError::new(
                        ErrorCategory::PersistedQueryNotFound,
                        "PersistedQueryNotFound",
                    ))
                }
            }
        }

        // Registration request: verify the hash, then write back detached.
        Some(query) => {
            if sha256_hex(query) != ext.sha256_hash {
                return Err(ClassifiedError::new(
                    ErrorCategory::InvalidRequest,
                    "provided sha does not match query",
                ));
            }
            schedule_write_back(cache, cache_key(&ext.sha256_hash), query.clone());
            Ok(ResolvedQuery {
                query: query.clone(),
                hit: false,
                registered: true,
            })
        }
    }
}

/// Spawn the best-effort cache write for a freshly registered query. The
/// spawned future owns the entire `set` call, so errors the cache returns
/// immediately are caught the same way as late ones.
fn schedule_write_back(cache: &Arc<dyn QueryCache>, key: String, query: String) {
    let cache = Arc::clone(cache);
    tokio::spawn(async move {
        if let Err(err) = cache.set(&key, &query).await {
            warn!(key = %key, error = %err, "persisted query write-back failed");
        } else {
            debug!(key = %key, "persisted query registered");
        }
    });
}
