//! `QueryGate` Pipeline — the staged query-request processor.
//!
//! Sits between a transport adapter and a [`QueryEngine`]: resolves
//! persisted-query hashes against a pluggable cache, runs
//! parse → validate → resolve-operation → execute with instrumentation
//! hooks bracketing every stage, classifies failures into the stable error
//! taxonomy, and shapes everything into a [`Response`] before it leaves.
//!
//! Typical wiring:
//!
//! ```ignore
//! let config = Arc::new(PipelineConfig {
//!     persisted_query_cache: Some(Arc::new(MemoryQueryCache::new())),
//!     ..PipelineConfig::default()
//! });
//! let mut processor = RequestProcessor::new(engine, config).await?;
//! let response = processor.process_request(request).await;
//! ```
//!
//! [`QueryEngine`]: querygate_core::QueryEngine
//! [`Response`]: querygate_core::Response

pub mod cache;
pub mod config;
pub mod instrument;
pub mod persisted;
pub mod processor;

pub use cache::MemoryQueryCache;
pub use config::{Hooks, PipelineConfig};
pub use instrument::{
    CacheHintInstrument, CacheScope, Instrument, InstrumentStack, RequestInfo, TimingInstrument,
};
pub use persisted::{cache_key, sha256_hex, ResolvedQuery};
pub use processor::RequestProcessor;
