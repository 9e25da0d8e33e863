use std::sync::Arc;

use llmgate_contracts::ChatCompletion;
use tracing::{info, warn};

use crate::{
    CoreError, ModelCapabilities, NormalizedRequest, ProviderClient, ProviderDispatchRequest,
    StructuredOutputDirective,
};

#[derive(Clone)]
pub struct CompletionDispatcher {
    provider: Arc<dyn ProviderClient>,
}

impl CompletionDispatcher {
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self { provider }
    }

    pub async fn dispatch(
        &self,
        trace_id: &str,
        normalized: &NormalizedRequest,
        capabilities: ModelCapabilities,
    ) -> Result<ChatCompletion, CoreError> {
        let directive = output_directive(normalized, capabilities);
        let request = &normalized.request;
        info!(
            event = "gateway.dispatch.started",
            category = "llm",
            trace_id,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(Vec::len).unwrap_or(0),
            structured_output = directive.is_some(),
            has_image = request.image.is_some()
        );

        self.provider
            .dispatch(ProviderDispatchRequest {
                trace_id,
                request,
                output_directive: directive.as_ref(),
            })
            .await
            .inspect_err(|error| {
                warn!(
                    event = "gateway.dispatch.failed",
                    category = "llm",
                    trace_id,
                    model = %request.model,
                    error = %error
                );
            })
    }
}

fn output_directive(
    normalized: &NormalizedRequest,
    capabilities: ModelCapabilities,
) -> Option<StructuredOutputDirective> {
    if !capabilities.structured_output || normalized.schema_instructed {
        return None;
    }
    let response_schema = normalized.request.response_schema.as_ref()?;
    Some(StructuredOutputDirective {
        name: response_schema.name.clone(),
        schema: response_schema.schema.to_portable_schema(),
    })
}
