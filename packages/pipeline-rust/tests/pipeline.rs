//! End-to-end pipeline tests against a stub engine.
//!
//! The stub recognizes a few markers in query text:
//! - `%%`      — parse failure
//! - `@bad`    — one validation violation per occurrence
//! - `@boom`   — execution-level fault
//! - `@partial`— successful execution with a field-level error
//! - `@touch`  — execution writes a context value

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use querygate_core::{
    ClassifiedError, EngineFault, EngineResponse, ErrorCategory, ExecuteRequest,
    OperationDescriptor, OperationKind, PathSegment, PersistedQueryExtension, QueryCache,
    QueryEngine, Request, Response,
};
use querygate_pipeline::{
    cache_key, sha256_hex, Instrument, MemoryQueryCache, PipelineConfig, RequestInfo,
    RequestProcessor, TimingInstrument,
};

// ---------------------------------------------------------------------------
// Stub engine
// ---------------------------------------------------------------------------

struct StubDocument {
    text: String,
    operations: Vec<OperationDescriptor>,
}

#[derive(Default)]
struct StubEngine {
    validations: AtomicUsize,
    executions: AtomicUsize,
}

impl StubEngine {
    fn resolve<'a>(
        document: &'a StubDocument,
        name: Option<&str>,
    ) -> Option<&'a OperationDescriptor> {
        match name {
            Some(name) => document
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name)),
            None if document.operations.len() == 1 => document.operations.first(),
            None => None,
        }
    }
}

#[async_trait]
impl QueryEngine for StubEngine {
    type Document = StubDocument;

    async fn parse(&self, query: &str) -> Result<StubDocument, EngineFault> {
        if query.contains("%%") {
            return Err(EngineFault::new("Syntax Error: Unexpected token").at(1, 1));
        }
        let mut operations: Vec<OperationDescriptor> = query
            .lines()
            .filter_map(|line| line.trim().strip_prefix("query "))
            .map(|rest| OperationDescriptor {
                name: rest
                    .split(|c: char| c.is_whitespace() || c == '{')
                    .next()
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                kind: OperationKind::Query,
            })
            .collect();
        if operations.is_empty() {
            operations.push(OperationDescriptor {
                name: None,
                kind: OperationKind::Query,
            });
        }
        Ok(StubDocument {
            text: query.to_string(),
            operations,
        })
    }

    async fn validate(
        &self,
        document: &StubDocument,
        _extra_rules: &[String],
    ) -> Vec<EngineFault> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        document
            .text
            .matches("@bad")
            .map(|_| EngineFault::new("Unknown directive \"@bad\""))
            .collect()
    }

    fn operation(
        &self,
        document: &StubDocument,
        name: Option<&str>,
    ) -> Option<OperationDescriptor> {
        Self::resolve(document, name).cloned()
    }

    async fn execute(
        &self,
        request: ExecuteRequest<'_, StubDocument>,
    ) -> Result<EngineResponse, EngineFault> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        if Self::resolve(request.document, request.operation_name).is_none() {
            return Err(EngineFault::new(
                "Must provide operation name if query contains multiple operations.",
            ));
        }
        if request.document.text.contains("@boom") {
            return Err(EngineFault::new("resolver exploded"));
        }
        if request.document.text.contains("@touch") {
            request.context.set_value("touched", json!(true));
        }
        if request.document.text.contains("@partial") {
            let mut fault = EngineFault::new("field failed");
            fault.path.push(PathSegment::Field("field".to_string()));
            return Ok(EngineResponse {
                data: Some(json!({ "field": null })),
                errors: vec![fault],
            });
        }
        Ok(EngineResponse {
            data: Some(json!({ "echo": request.document.text })),
            errors: Vec::new(),
        })
    }
}

async fn processor(
    engine: &Arc<StubEngine>,
    config: &Arc<PipelineConfig>,
) -> RequestProcessor<StubEngine> {
    RequestProcessor::new(Arc::clone(engine), Arc::clone(config))
        .await
        .expect("processor construction")
}

async fn process(query: &str) -> (Response, Arc<StubEngine>) {
    let engine = Arc::new(StubEngine::default());
    let config = Arc::new(PipelineConfig::default());
    let response = processor(&engine, &config).await.process_request(Request::new(query)).await;
    (response, engine)
}

fn persisted_request(query: Option<&str>, hash: &str) -> Request {
    let mut request = Request {
        query: query.map(str::to_string),
        ..Request::default()
    };
    request.extensions.persisted_query = Some(PersistedQueryExtension {
        version: 1,
        sha256_hash: hash.to_string(),
    });
    request
}

/// Poll until the detached APQ write-back lands.
async fn wait_for_key(cache: &Arc<dyn QueryCache>, key: &str) {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(Some(_)) = cache.get(key).await {
                return;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("write-back never completed");
}

// ---------------------------------------------------------------------------
// Stage semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_query_yields_data_and_no_protocol_errors() {
    let (response, _) = process("query Hero { hero { name } }").await;
    assert_eq!(response.data.unwrap()["echo"], json!("query Hero { hero { name } }"));
    assert!(response.errors.is_none());
}

#[tokio::test]
async fn syntax_failure_yields_exactly_one_syntax_error_and_skips_later_stages() {
    let (response, engine) = process("query %% {").await;
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, Some(ErrorCategory::SyntaxError));
    assert!(response.data.is_none());
    assert_eq!(engine.validations.load(Ordering::SeqCst), 0);
    assert_eq!(engine.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn all_validation_violations_are_reported_and_execution_never_runs() {
    let (response, engine) = process("{ a @bad b @bad }").await;
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| e.category == Some(ErrorCategory::ValidationError)));
    assert!(response.data.is_none());
    assert_eq!(engine.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn field_level_errors_pass_through_without_category() {
    let (response, _) = process("{ field @partial }").await;
    assert!(response.data.is_some());
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, None);
    assert_eq!(errors[0].message, "field failed");
    assert_eq!(
        errors[0].path.as_ref().unwrap()[0],
        PathSegment::Field("field".to_string())
    );
}

#[tokio::test]
async fn engine_raised_execution_fault_is_classified() {
    let (response, _) = process("{ kaboom @boom }").await;
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, Some(ErrorCategory::ExecutionError));
    assert_eq!(errors[0].message, "resolver exploded");
    assert!(response.data.is_none());
}

#[tokio::test]
async fn ambiguous_operation_is_deferred_to_the_engine() {
    let (response, engine) = process("query A { a }\nquery B { b }").await;
    let errors = response.errors.unwrap();
    assert_eq!(errors[0].category, Some(ErrorCategory::ExecutionError));
    assert!(errors[0].message.contains("operation name"));
    // Deferral means execution was reached, not short-circuited earlier.
    assert_eq!(engine.executions.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Persisted queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registered_query_round_trips_through_hash_only_request() {
    let query = "query Hero { hero { name } }";
    let hash = sha256_hex(query);
    let cache: Arc<dyn QueryCache> = Arc::new(MemoryQueryCache::new());
    let engine = Arc::new(StubEngine::default());
    let config = Arc::new(PipelineConfig {
        persisted_query_cache: Some(Arc::clone(&cache)),
        ..PipelineConfig::default()
    });

    let direct = processor(&engine, &config)
        .await
        .process_request(Request::new(query))
        .await;
    let registered = processor(&engine, &config)
        .await
        .process_request(persisted_request(Some(query), &hash))
        .await;
    assert_eq!(registered, direct);

    wait_for_key(&cache, &cache_key(&hash)).await;

    let hash_only = processor(&engine, &config)
        .await
        .process_request(persisted_request(None, &hash))
        .await;
    assert_eq!(hash_only, direct);
}

#[tokio::test]
async fn hash_mismatch_is_rejected_before_touching_the_cache() {
    /// Counts every cache access.
    #[derive(Default)]
    struct CountingCache {
        gets: AtomicUsize,
        sets: AtomicUsize,
    }

    #[async_trait]
    impl QueryCache for CountingCache {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let counting = Arc::new(CountingCache::default());
    let engine = Arc::new(StubEngine::default());
    let config = Arc::new(PipelineConfig {
        persisted_query_cache: Some(Arc::clone(&counting) as Arc<dyn QueryCache>),
        ..PipelineConfig::default()
    });

    let response = processor(&engine, &config)
        .await
        .process_request(persisted_request(Some("{ ok }"), "deadbeef"))
        .await;
    let errors = response.errors.unwrap();
    assert_eq!(errors[0].category, Some(ErrorCategory::InvalidRequest));
    assert_eq!(errors[0].message, "provided sha does not match query");

    // Give any stray spawned write a chance to run before asserting.
    tokio::task::yield_now().await;
    assert_eq!(counting.gets.load(Ordering::SeqCst), 0);
    assert_eq!(counting.sets.load(Ordering::SeqCst), 0);
    assert_eq!(engine.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_hash_without_text_is_not_found() {
    let engine = Arc::new(StubEngine::default());
    let config = Arc::new(PipelineConfig {
        persisted_query_cache: Some(Arc::new(MemoryQueryCache::new())),
        ..PipelineConfig::default()
    });
    let response = processor(&engine, &config)
        .await
        .process_request(persisted_request(None, &sha256_hex("{ never }")))
        .await;
    assert!(response.has_category(ErrorCategory::PersistedQueryNotFound));
}

#[tokio::test]
async fn persisted_query_without_cache_is_not_supported() {
    let query = "{ ok }";
    let engine = Arc::new(StubEngine::default());
    let config = Arc::new(PipelineConfig::default());
    // Even a perfectly valid hash is rejected when no cache is configured.
    let response = processor(&engine, &config)
        .await
        .process_request(persisted_request(Some(query), &sha256_hex(query)))
        .await;
    assert!(response.has_category(ErrorCategory::PersistedQueryNotSupported));
}

// ---------------------------------------------------------------------------
// Instrumentation
// ---------------------------------------------------------------------------

/// Records every hook invocation as `"<label>.<event>"` and captures the
/// request info it saw.
struct Recorder {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    info: Arc<Mutex<Option<RequestInfo>>>,
}

#[async_trait]
impl Instrument for Recorder {
    async fn request_start(&self, info: &RequestInfo) {
        *self.info.lock() = Some(info.clone());
        self.log.lock().push(format!("{}.request_start", self.label));
    }
    async fn parsing_start(&self) {
        self.log.lock().push(format!("{}.parsing_start", self.label));
    }
    async fn parsing_end(&self, _error: Option<&ClassifiedError>) {
        self.log.lock().push(format!("{}.parsing_end", self.label));
    }
    async fn validation_start(&self) {
        self.log.lock().push(format!("{}.validation_start", self.label));
    }
    async fn validation_end(&self, _errors: &[ClassifiedError]) {
        self.log.lock().push(format!("{}.validation_end", self.label));
    }
    async fn execution_start(&self) {
        self.log.lock().push(format!("{}.execution_start", self.label));
    }
    async fn execution_end(&self, _error: Option<&ClassifiedError>) {
        self.log.lock().push(format!("{}.execution_end", self.label));
    }
    async fn will_send_response(&self, _response: &mut Response) {
        self.log.lock().push(format!("{}.will_send_response", self.label));
    }
    async fn request_end(&self, _response: &Response) {
        self.log.lock().push(format!("{}.request_end", self.label));
    }
}

struct RecorderSet {
    log: Arc<Mutex<Vec<String>>>,
    info_a: Arc<Mutex<Option<RequestInfo>>>,
}

fn two_recorder_config(cache: Option<Arc<dyn QueryCache>>) -> (Arc<PipelineConfig>, RecorderSet) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let info_a = Arc::new(Mutex::new(None));
    let info_b = Arc::new(Mutex::new(None));
    let mut config = PipelineConfig {
        persisted_query_cache: cache,
        ..PipelineConfig::default()
    };
    let (log_a, captured_a) = (Arc::clone(&log), Arc::clone(&info_a));
    config.add_instrument(move || {
        Arc::new(Recorder {
            label: "a",
            log: Arc::clone(&log_a),
            info: Arc::clone(&captured_a),
        })
    });
    let (log_b, captured_b) = (Arc::clone(&log), Arc::clone(&info_b));
    config.add_instrument(move || {
        Arc::new(Recorder {
            label: "b",
            log: Arc::clone(&log_b),
            info: Arc::clone(&captured_b),
        })
    });
    (Arc::new(config), RecorderSet { log, info_a })
}

/// Assert `first` appears before `second` in the event log.
fn assert_ordered(log: &[String], first: &str, second: &str) {
    let mut events: VecDeque<&str> = log.iter().map(String::as_str).collect();
    while let Some(event) = events.pop_front() {
        if event == first {
            assert!(
                events.iter().any(|e| *e == second),
                "expected {second:?} after {first:?} in {log:?}"
            );
            return;
        }
        assert_ne!(event, second, "{second:?} preceded {first:?} in {log:?}");
    }
    panic!("{first:?} not found in {log:?}");
}

#[tokio::test]
async fn stack_discipline_holds_for_every_stage() {
    let engine = Arc::new(StubEngine::default());
    let (config, recorders) = two_recorder_config(None);
    processor(&engine, &config)
        .await
        .process_request(Request::new("{ ok }"))
        .await;

    let log = recorders.log.lock().clone();
    assert_eq!(
        log,
        vec![
            "a.request_start",
            "b.request_start",
            "a.parsing_start",
            "b.parsing_start",
            "b.parsing_end",
            "a.parsing_end",
            "a.validation_start",
            "b.validation_start",
            "b.validation_end",
            "a.validation_end",
            "a.execution_start",
            "b.execution_start",
            "b.execution_end",
            "a.execution_end",
            "b.will_send_response",
            "a.will_send_response",
            "b.request_end",
            "a.request_end",
        ]
    );
}

#[tokio::test]
async fn stack_discipline_holds_when_a_stage_errors() {
    let engine = Arc::new(StubEngine::default());
    let (config, recorders) = two_recorder_config(None);
    processor(&engine, &config)
        .await
        .process_request(Request::new("query %% {"))
        .await;

    let log = recorders.log.lock().clone();
    // The erroring stage is still bracketed in stack order.
    assert_ordered(&log, "a.parsing_start", "b.parsing_start");
    assert_ordered(&log, "b.parsing_start", "b.parsing_end");
    assert_ordered(&log, "b.parsing_end", "a.parsing_end");
    // Later stages never started, but finalization still ran in full.
    assert!(!log.iter().any(|e| e.contains("validation")));
    assert!(!log.iter().any(|e| e.contains("execution")));
    assert_ordered(&log, "a.parsing_end", "b.will_send_response");
    assert_ordered(&log, "b.request_end", "a.request_end");
}

#[tokio::test]
async fn persisted_query_flags_are_surfaced_at_request_start() {
    let query = "{ flagged }";
    let hash = sha256_hex(query);
    let cache: Arc<dyn QueryCache> = Arc::new(MemoryQueryCache::new());
    let engine = Arc::new(StubEngine::default());

    let (config, recorders) = two_recorder_config(Some(Arc::clone(&cache)));
    processor(&engine, &config)
        .await
        .process_request(persisted_request(Some(query), &hash))
        .await;
    let info = recorders.info_a.lock().clone().unwrap();
    assert!(info.persisted_query_register);
    assert!(!info.persisted_query_hit);

    wait_for_key(&cache, &cache_key(&hash)).await;

    let (config, recorders) = two_recorder_config(Some(cache));
    processor(&engine, &config)
        .await
        .process_request(persisted_request(None, &hash))
        .await;
    let info = recorders.info_a.lock().clone().unwrap();
    assert!(info.persisted_query_hit);
    assert!(!info.persisted_query_register);
}

#[tokio::test]
async fn timing_extension_is_merged_when_configured() {
    let engine = Arc::new(StubEngine::default());
    let mut config = PipelineConfig::default();
    config.add_instrument(|| Arc::new(TimingInstrument::new()));
    let response = processor(&engine, &Arc::new(config))
        .await
        .process_request(Request::new("{ ok }"))
        .await;
    let timing = &response.extensions.unwrap()["timing"];
    assert!(timing.get("totalUs").is_some());
    assert!(timing.get("executionUs").is_some());
}

#[tokio::test]
async fn responses_without_contributions_carry_no_extensions() {
    let (response, _) = process("{ ok }").await;
    assert!(response.extensions.is_none());
}

// ---------------------------------------------------------------------------
// Context isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sibling_processors_never_observe_each_others_context() {
    let engine = Arc::new(StubEngine::default());
    let mut config = PipelineConfig::default();
    config.set_context_value("tenant", json!("acme"));
    let config = Arc::new(config);

    let mut first = processor(&engine, &config).await;
    first.process_request(Request::new("{ a @touch }")).await;
    assert_eq!(first.context().value("touched"), Some(&json!(true)));

    let mut second = processor(&engine, &config).await;
    second.process_request(Request::new("{ b }")).await;
    assert_eq!(second.context().value("touched"), None);
    assert_eq!(second.context().value("tenant"), Some(&json!("acme")));
}
