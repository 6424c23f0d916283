//! Stage-timing instrument.
//!
//! Records wall-clock durations for each stage and contributes them as a
//! `"timing"` response extension (microsecond fields). Also logs a summary
//! at debug level when the request completes.
//!
//! State is reset on `request_start`, so one instance observes one request
//! at a time. The processor constructs instruments fresh per request from
//! the configured factories, which is what keeps this sound.

use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

use querygate_core::{ClassifiedError, Response};

use super::{Instrument, RequestInfo};

/// Elapsed microseconds since `started`, saturating on overflow.
fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default)]
struct TimingState {
    request_started: Option<Instant>,
    parsing_started: Option<Instant>,
    parsing_us: Option<u64>,
    validation_started: Option<Instant>,
    validation_us: Option<u64>,
    execution_started: Option<Instant>,
    execution_us: Option<u64>,
}

/// Measures per-stage durations and exposes them as a response extension.
#[derive(Debug, Default)]
pub struct TimingInstrument {
    state: Mutex<TimingState>,
}

impl TimingInstrument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Instrument for TimingInstrument {
    async fn request_start(&self, _info: &RequestInfo) {
        *self.state.lock() = TimingState {
            request_started: Some(Instant::now()),
            ..TimingState::default()
        };
    }

    async fn parsing_start(&self) {
        self.state.lock().parsing_started = Some(Instant::now());
    }

    async fn parsing_end(&self, _error: Option<&ClassifiedError>) {
        let mut state = self.state.lock();
        state.parsing_us = state.parsing_started.map(elapsed_us);
    }

    async fn validation_start(&self) {
        self.state.lock().validation_started = Some(Instant::now());
    }

    async fn validation_end(&self, _errors: &[ClassifiedError]) {
        let mut state = self.state.lock();
        state.validation_us = state.validation_started.map(elapsed_us);
    }

    async fn execution_start(&self) {
        self.state.lock().execution_started = Some(Instant::now());
    }

    async fn execution_end(&self, _error: Option<&ClassifiedError>) {
        let mut state = self.state.lock();
        state.execution_us = state.execution_started.map(elapsed_us);
    }

    fn response_extension(&self) -> Option<(String, Value)> {
        let state = self.state.lock();
        let total_us = state.request_started.map(elapsed_us)?;
        let mut timing = serde_json::Map::new();
        timing.insert("totalUs".to_string(), json!(total_us));
        if let Some(us) = state.parsing_us {
            timing.insert("parsingUs".to_string(), json!(us));
        }
        if let Some(us) = state.validation_us {
            timing.insert("validationUs".to_string(), json!(us));
        }
        if let Some(us) = state.execution_us {
            timing.insert("executionUs".to_string(), json!(us));
        }
        Some(("timing".to_string(), Value::Object(timing)))
    }

    async fn request_end(&self, response: &Response) {
        let state = self.state.lock();
        if let Some(started) = state.request_started {
            debug!(
                total_us = elapsed_us(started),
                parsing_us = state.parsing_us,
                validation_us = state.validation_us,
                execution_us = state.execution_us,
                errored = response.errors.is_some(),
                "request processed"
            );
        }
    }
}
