use std::{sync::Arc, time::Duration};

use llmgate_contracts::{AssistantMessage, ChatChoice, ChatCompletion, Role, ToolCall, Usage};
use llmgate_core::CoreError;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

pub mod clients;

pub use clients::{MockProviderClient, OpenAiClient};

pub fn build_http_client(timeout_seconds: u64) -> Option<Client> {
    Client::builder().timeout(Duration::from_secs(timeout_seconds)).build().ok()
}

pub(crate) struct HttpRuntime {
    provider_id: String,
    base_url: Option<String>,
    api_key: Option<String>,
    http_client: Option<Client>,
    max_inflight: Option<Arc<Semaphore>>,
}

impl HttpRuntime {
    pub(crate) fn new(
        provider_id: String,
        base_url: Option<String>,
        api_key: Option<String>,
        http_client: Option<Client>,
        max_inflight: Option<usize>,
    ) -> Self {
        let max_inflight = max_inflight.map(Semaphore::new).map(Arc::new);
        Self { provider_id, base_url, api_key, http_client, max_inflight }
    }

    pub(crate) fn build_url(&self, path: &str) -> Result<String, CoreError> {
        let Some(base_url) = self.base_url.as_deref().filter(|v| !v.trim().is_empty()) else {
            return Err(CoreError::Transport("provider base_url is not configured".to_string()));
        };
        Ok(format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    pub(crate) async fn post_chat_completions(
        &self,
        trace_id: &str,
        url: &str,
        payload: &Value,
    ) -> Result<ChatCompletion, CoreError> {
        let _permit = self
            .max_inflight
            .as_ref()
            .map(|semaphore| {
                semaphore.clone().try_acquire_owned().map_err(|_| {
                    CoreError::Transport(format!(
                        "provider overloaded: max in-flight limit reached for {}",
                        self.provider_id
                    ))
                })
            })
            .transpose()?;
        let client = self
            .http_client
            .as_ref()
            .ok_or_else(|| CoreError::Transport("provider client init failed".to_string()))?;

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Request-Id", trace_id)
            .json(payload);
        if let Some(api_key) = self.api_key.as_deref().filter(|v| !v.trim().is_empty()) {
            request = request.bearer_auth(api_key);
        }

        debug!(
            event = "provider.request.sent",
            provider = %self.provider_id,
            trace_id,
            url
        );
        let response = request
            .send()
            .await
            .map_err(|err| CoreError::Transport(format!("provider request failed: {err}")))?;
        let response = response.error_for_status().map_err(|err| {
            CoreError::Transport(format!("provider returned error status: {err}"))
        })?;
        let payload = response.json::<ChatCompletionsResponse>().await.map_err(|err| {
            CoreError::Transport(format!("provider response parse failed: {err}"))
        })?;
        payload.into_completion()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionsResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    index: Option<u32>,
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireToolFunction,
}

#[derive(Debug, Deserialize)]
struct WireToolFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl ChatCompletionsResponse {
    pub(crate) fn into_completion(self) -> Result<ChatCompletion, CoreError> {
        if self.choices.is_empty() {
            return Err(CoreError::Transport("provider returned empty choices".to_string()));
        }
        let choices = self
            .choices
            .into_iter()
            .enumerate()
            .map(|(position, choice)| ChatChoice {
                index: choice.index.unwrap_or(position as u32),
                message: AssistantMessage {
                    role: Role::Assistant,
                    content: extract_message_content(&choice.message.content),
                    tool_calls: choice
                        .message
                        .tool_calls
                        .filter(|calls| !calls.is_empty())
                        .map(|calls| calls.into_iter().map(WireToolCall::into_tool_call).collect()),
                },
                finish_reason: choice.finish_reason,
            })
            .collect();
        let usage = self.usage.map(|usage| Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.prompt_tokens.saturating_add(usage.completion_tokens)),
        });

        Ok(ChatCompletion {
            id: self.id.unwrap_or_else(|| format!("chatcmpl-{}", uuid::Uuid::new_v4())),
            object: "chat.completion".to_string(),
            created: self.created.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            choices,
            usage,
        })
    }
}

impl WireToolCall {
    fn into_tool_call(self) -> ToolCall {
        // Some providers send arguments as an object instead of an encoded string.
        let arguments = match self.function.arguments {
            Value::String(text) => text,
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        ToolCall::function(self.id, self.function.name, arguments)
    }
}

fn extract_message_content(content: &Value) -> Option<String> {
    match content {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("");
            if text.is_empty() { None } else { Some(text) }
        }
        _ => None,
    }
}
