//! The staged request processor.
//!
//! One [`RequestProcessor`] handles one logical request (a transport may
//! also reuse one across the requests of a batch, which then share an
//! execution context). Stages run strictly in order:
//!
//! `Start → Parsing → Validating → ResolvingOperation → Executing →
//! Formatting → Done`
//!
//! with an `Errored` path reachable from every stage. The first stage to
//! fail determines the response; later stages never run. Every stage is
//! bracketed by the instrument stack's start/end hooks on all exit paths,
//! and `request_end` always fires once `request_start` has.

use std::sync::Arc;

use tracing::debug;

use querygate_core::{
    ClassifiedError, ContextError, DataSourceEnv, ErrorCategory, ExecuteRequest,
    ExecutionContext, QueryEngine, Request, Response, ResponseError,
};

use crate::config::PipelineConfig;
use crate::instrument::{InstrumentStack, RequestInfo};
use crate::persisted::{resolve_query, ResolvedQuery};

/// Processes one request through the staged pipeline.
pub struct RequestProcessor<E: QueryEngine> {
    engine: Arc<E>,
    config: Arc<PipelineConfig>,
    instruments: InstrumentStack,
    context: ExecutionContext,
}

impl<E: QueryEngine> RequestProcessor<E> {
    /// Construct a processor for one request: value-copy the configured
    /// context, initialize data sources exactly once, and instantiate the
    /// instrument stack from the configured factories.
    ///
    /// # Errors
    ///
    /// Fails fast — before any request is processed — when the configured
    /// context already defines the reserved data-source key, or when a data
    /// source's `initialize` fails. Both indicate host misconfiguration.
    pub async fn new(engine: Arc<E>, config: Arc<PipelineConfig>) -> Result<Self, ContextError> {
        let mut context = ExecutionContext::new(config.context_values.clone())?;

        if let Some(factory) = &config.data_sources {
            let sources = factory();
            for (name, source) in &sources {
                source
                    .initialize(DataSourceEnv {
                        context: &context,
                        cache: config.persisted_query_cache.clone(),
                    })
                    .await
                    .map_err(|source_err| ContextError::DataSourceInit {
                        name: name.clone(),
                        source: source_err,
                    })?;
            }
            context.attach_data_sources(sources);
        }

        let instruments =
            InstrumentStack::new(config.instruments.iter().map(|factory| factory()).collect());

        Ok(Self {
            engine,
            config,
            instruments,
            context,
        })
    }

    /// The request's execution context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Process one request to completion. Never returns a raw engine fault;
    /// every failure is shaped into the standard [`Response`] first.
    pub async fn process_request(&mut self, request: Request) -> Response {
        let resolved = resolve_query(
            &request,
            self.config.persisted_query_cache.as_ref(),
        )
        .await;

        let info = RequestInfo {
            operation_name: request.operation_name.clone(),
            persisted_query_hit: matches!(&resolved, Ok(r) if r.hit),
            persisted_query_register: matches!(&resolved, Ok(r) if r.registered),
        };
        self.instruments.request_start(&info).await;
        debug!(
            operation = info.operation_name.as_deref(),
            persisted_hit = info.persisted_query_hit,
            persisted_register = info.persisted_query_register,
            "processing request"
        );

        let response = match self.run_stages(&request, resolved).await {
            Ok(response) => response,
            Err(errors) => Response::from_classified(errors),
        };
        self.finish(response).await
    }

    /// Run Start through Executing, early-returning the classified errors of
    /// the first failing stage. Formatting happens in [`Self::finish`].
    async fn run_stages(
        &mut self,
        request: &Request,
        resolved: Result<ResolvedQuery, ClassifiedError>,
    ) -> Result<Response, Vec<ClassifiedError>> {
        // Start: the resolved query text must be non-empty.
        let resolved = resolved.map_err(|err| vec![err])?;
        if resolved.query.trim().is_empty() {
            return Err(vec![ClassifiedError::new(
                ErrorCategory::InvalidRequest,
                "Must provide query string.",
            )]);
        }

        // Parsing. Syntax failure short-circuits with a single error.
        self.instruments.parsing_start().await;
        let document = match self.engine.parse(&resolved.query).await {
            Ok(document) => {
                self.instruments.parsing_end(None).await;
                document
            }
            Err(fault) => {
                let err = ClassifiedError::from_fault(ErrorCategory::SyntaxError, fault);
                self.instruments.parsing_end(Some(&err)).await;
                return Err(vec![err]);
            }
        };

        // Validating. All violations are reported together; none executes.
        self.instruments.validation_start().await;
        let violations: Vec<ClassifiedError> = self
            .engine
            .validate(&document, &self.config.validation_rules)
            .await
            .into_iter()
            .map(|fault| ClassifiedError::from_fault(ErrorCategory::ValidationError, fault))
            .collect();
        self.instruments.validation_end(&violations).await;
        if !violations.is_empty() {
            return Err(violations);
        }

        // ResolvingOperation. Ambiguous or missing resolution is deferred to
        // the engine's execute stage, which owns that error message.
        if let Some(operation) = self
            .engine
            .operation(&document, request.operation_name.as_deref())
        {
            if let Some(hook) = &self.config.hooks.will_execute_operation {
                hook(&self.context, &operation);
            }
        }

        // Executing. Field-level errors inside a successful result pass
        // through untouched; only an engine-raised fault is classified.
        self.instruments.execution_start().await;
        let engine = Arc::clone(&self.engine);
        let result = engine
            .execute(ExecuteRequest {
                document: &document,
                operation_name: request.operation_name.as_deref(),
                variables: &request.variables,
                context: &mut self.context,
            })
            .await;
        match result {
            Ok(engine_response) => {
                self.instruments.execution_end(None).await;
                let errors: Vec<ResponseError> = engine_response
                    .errors
                    .into_iter()
                    .map(ResponseError::from)
                    .collect();
                Ok(Response {
                    data: engine_response.data,
                    errors: (!errors.is_empty()).then_some(errors),
                    extensions: None,
                })
            }
            Err(fault) => {
                let err = ClassifiedError::from_fault(ErrorCategory::ExecutionError, fault);
                self.instruments.execution_end(Some(&err)).await;
                Err(vec![err])
            }
        }
    }

    /// Formatting and Done: merge instrument extensions, apply the optional
    /// format hook, give the stack its last look, and finalize.
    async fn finish(&mut self, mut response: Response) -> Response {
        self.instruments.merge_extensions(&mut response);
        if let Some(hook) = &self.config.hooks.format_response {
            response = hook(response, &self.context);
        }
        self.instruments.will_send_response(&mut response).await;
        self.instruments.request_end(&response).await;
        response
    }
}
