//! Instrumentation participants and their composition.
//!
//! An [`Instrument`] observes pipeline stage boundaries. Multiple
//! participants compose into one [`InstrumentStack`]: entry hooks fire in
//! registration order, exit hooks in reverse order, so participant A always
//! brackets participant B for every stage — including stages that fail. The
//! processor guarantees that every `*_start` it fires is matched by the
//! corresponding `*_end` on all exit paths.

mod cache_hint;
mod timing;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use cache_hint::{CacheHintInstrument, CacheScope};
pub use timing::TimingInstrument;

use querygate_core::{ClassifiedError, Response};

/// Request-level facts surfaced to participants at request start.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// The operation name the client asked for, if any.
    pub operation_name: Option<String>,
    /// The query text was served from the persisted-query cache.
    pub persisted_query_hit: bool,
    /// The request registered its text under a persisted-query hash.
    pub persisted_query_register: bool,
}

/// A pipeline observer. Every hook defaults to a no-op; participants
/// implement only the boundaries they care about.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Fired once per request, after persisted-query resolution.
    async fn request_start(&self, info: &RequestInfo) {
        let _ = info;
    }

    async fn parsing_start(&self) {}

    /// `error` is the classified syntax error when parsing failed.
    async fn parsing_end(&self, error: Option<&ClassifiedError>) {
        let _ = error;
    }

    async fn validation_start(&self) {}

    /// `errors` holds every classified violation; empty means valid.
    async fn validation_end(&self, errors: &[ClassifiedError]) {
        let _ = errors;
    }

    async fn execution_start(&self) {}

    /// `error` is the classified execution fault when the engine raised.
    /// Field-level errors inside a successful result do not appear here.
    async fn execution_end(&self, error: Option<&ClassifiedError>) {
        let _ = error;
    }

    /// A response extension to contribute, merged during formatting.
    fn response_extension(&self) -> Option<(String, Value)> {
        None
    }

    /// Last chance to observe or adjust the response before it is returned.
    async fn will_send_response(&self, response: &mut Response) {
        let _ = response;
    }

    /// Fired once per request, after the response is final. Always paired
    /// with `request_start`, success or failure.
    async fn request_end(&self, response: &Response) {
        let _ = response;
    }
}

/// An ordered stack of participants behaving as one logical participant.
#[derive(Clone, Default)]
pub struct InstrumentStack {
    instruments: Arc<Vec<Arc<dyn Instrument>>>,
}

impl InstrumentStack {
    /// Compose participants in registration order.
    #[must_use]
    pub fn new(instruments: Vec<Arc<dyn Instrument>>) -> Self {
        Self {
            instruments: Arc::new(instruments),
        }
    }

    /// Number of composed participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// True when no participant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub async fn request_start(&self, info: &RequestInfo) {
        for instrument in self.instruments.iter() {
            instrument.request_start(info).await;
        }
    }

    pub async fn parsing_start(&self) {
        for instrument in self.instruments.iter() {
            instrument.parsing_start().await;
        }
    }

    pub async fn parsing_end(&self, error: Option<&ClassifiedError>) {
        for instrument in self.instruments.iter().rev() {
            instrument.parsing_end(error).await;
        }
    }

    pub async fn validation_start(&self) {
        for instrument in self.instruments.iter() {
            instrument.validation_start().await;
        }
    }

    pub async fn validation_end(&self, errors: &[ClassifiedError]) {
        for instrument in self.instruments.iter().rev() {
            instrument.validation_end(errors).await;
        }
    }

    pub async fn execution_start(&self) {
        for instrument in self.instruments.iter() {
            instrument.execution_start().await;
        }
    }

    pub async fn execution_end(&self, error: Option<&ClassifiedError>) {
        for instrument in self.instruments.iter().rev() {
            instrument.execution_end(error).await;
        }
    }

    /// Merge every participant's contributed extension into the response.
    /// Nothing is added when no participant contributes.
    pub fn merge_extensions(&self, response: &mut Response) {
        for instrument in self.instruments.iter() {
            if let Some((key, value)) = instrument.response_extension() {
                response.insert_extension(key, value);
            }
        }
    }

    pub async fn will_send_response(&self, response: &mut Response) {
        for instrument in self.instruments.iter().rev() {
            instrument.will_send_response(response).await;
        }
    }

    pub async fn request_end(&self, response: &Response) {
        for instrument in self.instruments.iter().rev() {
            instrument.request_end(response).await;
        }
    }
}
