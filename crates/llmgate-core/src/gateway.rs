use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    CacheFingerprint, CacheStore, CapabilityTable, CompletionDispatcher, CompletionRequest,
    CompletionResult, CoreError, ModelCapabilities, ProviderClient,
    normalize::{ensure_compatible, normalize_request},
    reconstruct::reconstruct_tool_call,
    validate::parse_and_validate,
};

pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Start,
    CacheCheck,
    Normalize,
    Dispatch,
    Validate,
    Reconstruct,
    CacheWrite,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    pub caching: bool,
    pub default_retries: u32,
    pub background_cache_writes: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self { caching: true, default_retries: DEFAULT_RETRIES, background_cache_writes: true }
    }
}

struct AttemptContext<'a> {
    trace_id: &'a str,
    attempt: u32,
    capabilities: ModelCapabilities,
    state: GatewayState,
}

impl AttemptContext<'_> {
    fn transition(&mut self, next: GatewayState) {
        debug!(
            event = "gateway.state",
            category = "llm",
            trace_id = self.trace_id,
            attempt = self.attempt,
            from = ?self.state,
            to = ?next
        );
        self.state = next;
    }
}

pub struct CompletionGateway {
    dispatcher: CompletionDispatcher,
    cache: Option<Arc<dyn CacheStore>>,
    capabilities: CapabilityTable,
    options: GatewayOptions,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            dispatcher: CompletionDispatcher::new(provider),
            cache: None,
            capabilities: CapabilityTable::default(),
            options: GatewayOptions::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_options(mut self, options: GatewayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub async fn create_chat_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, CoreError> {
        self.create_chat_completion_with_retries(request, self.options.default_retries).await
    }

    /// Runs at most `retries_remaining + 1` attempts. Only output-shape failures are retried.
    pub async fn create_chat_completion_with_retries(
        &self,
        request: &CompletionRequest,
        retries_remaining: u32,
    ) -> Result<CompletionResult, CoreError> {
        let trace_id = Uuid::new_v4().to_string();
        let capabilities = self.capabilities.lookup(&request.model);
        let mut retries_remaining = retries_remaining;
        let mut attempt = 1u32;

        loop {
            let span = info_span!(
                "gateway_attempt",
                trace_id = %trace_id,
                model = %request.model,
                attempt,
                retries_remaining
            );
            let mut context =
                AttemptContext { trace_id: &trace_id, attempt, capabilities, state: GatewayState::Start };
            let outcome = self.run_attempt(&mut context, request).instrument(span).await;

            let error = match outcome {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };
            context.transition(GatewayState::Failed);

            if !error.is_retryable() {
                return Err(error);
            }
            if retries_remaining == 0 {
                error!(
                    event = "gateway.retry.exhausted",
                    category = "llm",
                    trace_id = %trace_id,
                    model = %request.model,
                    attempts = attempt,
                    error_kind = error.kind(),
                    error = %error
                );
                return Err(error);
            }
            retries_remaining -= 1;
            attempt += 1;
            warn!(
                event = "gateway.retry.scheduled",
                category = "llm",
                trace_id = %trace_id,
                model = %request.model,
                error_kind = error.kind(),
                retries_remaining
            );
        }
    }

    async fn run_attempt(
        &self,
        context: &mut AttemptContext<'_>,
        request: &CompletionRequest,
    ) -> Result<CompletionResult, CoreError> {
        ensure_compatible(request, context.capabilities)?;

        let fingerprint = self.cache_store().map(|_| CacheFingerprint::of(request));
        context.transition(GatewayState::CacheCheck);
        if let Some(hit) = self.read_cache(context.trace_id, fingerprint.as_ref()).await {
            context.transition(GatewayState::Done);
            return Ok(hit);
        }

        context.transition(GatewayState::Normalize);
        let normalized = normalize_request(request, context.capabilities);
        if !context.capabilities.is_full() {
            info!(
                event = "gateway.request.normalized",
                category = "llm",
                trace_id = context.trace_id,
                model = %request.model,
                tools_emulated = normalized.tools_emulated,
                schema_instructed = normalized.schema_instructed,
                messages_in = request.messages.len(),
                messages_out = normalized.request.messages.len()
            );
        }

        context.transition(GatewayState::Dispatch);
        let completion =
            self.dispatcher.dispatch(context.trace_id, &normalized, context.capabilities).await?;

        let result = if let Some(response_schema) = &request.response_schema {
            context.transition(GatewayState::Validate);
            let value = parse_and_validate(&completion, response_schema).inspect_err(|error| {
                warn!(
                    event = "gateway.validation.failed",
                    category = "llm",
                    trace_id = context.trace_id,
                    schema = %response_schema.name,
                    error_kind = error.kind(),
                    error = %error
                );
            })?;
            CompletionResult::Structured(value)
        } else if normalized.tools_emulated {
            context.transition(GatewayState::Reconstruct);
            let completion = reconstruct_tool_call(completion).inspect_err(|error| {
                warn!(
                    event = "gateway.tool_call.parse_failed",
                    category = "llm",
                    trace_id = context.trace_id,
                    error = %error
                );
            })?;
            info!(
                event = "gateway.tool_call.reconstructed",
                category = "llm",
                trace_id = context.trace_id,
                model = %request.model
            );
            CompletionResult::Completion(completion)
        } else {
            CompletionResult::Completion(completion)
        };

        context.transition(GatewayState::CacheWrite);
        if let Some(fingerprint) = fingerprint {
            self.write_cache(context.trace_id, fingerprint, &result).await;
        }
        context.transition(GatewayState::Done);
        Ok(result)
    }

    fn cache_store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache.as_ref().filter(|_| self.options.caching)
    }

    async fn read_cache(
        &self,
        trace_id: &str,
        fingerprint: Option<&CacheFingerprint>,
    ) -> Option<CompletionResult> {
        let (cache, fingerprint) = (self.cache_store()?, fingerprint?);
        match cache.get(fingerprint, trace_id).await {
            Ok(Some(entry)) => {
                info!(
                    event = "gateway.cache.hit",
                    category = "llm",
                    trace_id,
                    fingerprint = %fingerprint
                );
                Some(entry)
            }
            Ok(None) => {
                info!(
                    event = "gateway.cache.miss",
                    category = "llm",
                    trace_id,
                    fingerprint = %fingerprint
                );
                None
            }
            Err(error) => {
                warn!(
                    event = "gateway.cache.read.failed",
                    category = "llm",
                    trace_id,
                    fingerprint = %fingerprint,
                    error = %error
                );
                None
            }
        }
    }

    async fn write_cache(
        &self,
        trace_id: &str,
        fingerprint: CacheFingerprint,
        result: &CompletionResult,
    ) {
        let Some(cache) = self.cache_store() else {
            return;
        };
        if self.options.background_cache_writes {
            let cache = Arc::clone(cache);
            let entry = result.clone();
            let trace_id = trace_id.to_string();
            tokio::spawn(
                async move {
                    let outcome = cache.set(&fingerprint, &entry, &trace_id).await;
                    log_cache_write(&trace_id, &fingerprint, outcome);
                }
                .in_current_span(),
            );
        } else {
            let outcome = cache.set(&fingerprint, result, trace_id).await;
            log_cache_write(trace_id, &fingerprint, outcome);
        }
    }
}

fn log_cache_write(
    trace_id: &str,
    fingerprint: &CacheFingerprint,
    outcome: Result<(), crate::CacheError>,
) {
    match outcome {
        Ok(()) => debug!(
            event = "gateway.cache.write.ok",
            category = "llm",
            trace_id,
            fingerprint = %fingerprint
        ),
        Err(error) => warn!(
            event = "gateway.cache.write.failed",
            category = "llm",
            trace_id,
            fingerprint = %fingerprint,
            error = %error
        ),
    }
}
