use async_trait::async_trait;
use llmgate_contracts::{ChatCompletion, ChatMessage, ContentPart, ImageUrl, MessageContent};
use llmgate_core::{
    CompletionRequest, CoreError, ProviderClient, ProviderDispatchRequest,
    StructuredOutputDirective,
};
use reqwest::Client;
use serde_json::{Map, Value, json};

use crate::HttpRuntime;

pub struct OpenAiClient {
    runtime: HttpRuntime,
}

impl OpenAiClient {
    pub fn new(
        provider_id: String,
        base_url: Option<String>,
        api_key: Option<String>,
        http_client: Option<Client>,
        max_inflight: Option<usize>,
    ) -> Self {
        Self {
            runtime: HttpRuntime::new(provider_id, base_url, api_key, http_client, max_inflight),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn dispatch(
        &self,
        request: ProviderDispatchRequest<'_>,
    ) -> Result<ChatCompletion, CoreError> {
        let url = self.runtime.build_url("chat/completions")?;
        let payload = build_openai_payload(request.request, request.output_directive);
        self.runtime.post_chat_completions(request.trace_id, &url, &payload).await
    }
}

pub(crate) fn build_openai_payload(
    request: &CompletionRequest,
    directive: Option<&StructuredOutputDirective>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("model".to_string(), Value::String(request.model.clone()));

    let mut messages = request.messages.clone();
    if let Some(image) = &request.image {
        let mut parts = vec![ContentPart::ImageUrl {
            image_url: ImageUrl { url: image.to_data_url(), detail: None },
        }];
        if let Some(description) = image.description.as_deref().filter(|d| !d.trim().is_empty()) {
            parts.push(ContentPart::Text { text: description.to_string() });
        }
        messages.push(ChatMessage::user(MessageContent::Parts(parts)));
    }
    payload.insert(
        "messages".to_string(),
        serde_json::to_value(&messages).unwrap_or_else(|_| Value::Array(Vec::new())),
    );

    for (key, value) in [
        ("temperature", request.temperature),
        ("top_p", request.top_p),
        ("frequency_penalty", request.frequency_penalty),
        ("presence_penalty", request.presence_penalty),
    ] {
        if let Some(value) = value {
            payload.insert(key.to_string(), json!(value));
        }
    }

    if let Some(tools) = request.requested_tools()
        && let Ok(value) = serde_json::to_value(tools)
    {
        payload.insert("tools".to_string(), value);
        if let Some(choice) = &request.tool_choice
            && let Ok(value) = serde_json::to_value(choice)
        {
            payload.insert("tool_choice".to_string(), value);
        }
    }

    if let Some(directive) = directive {
        payload.insert(
            "response_format".to_string(),
            json!({
                "type": "json_schema",
                "json_schema": {"name": directive.name, "schema": directive.schema}
            }),
        );
    }

    payload.insert("stream".to_string(), Value::Bool(false));
    Value::Object(payload)
}
