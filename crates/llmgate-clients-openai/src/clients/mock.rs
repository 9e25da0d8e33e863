use async_trait::async_trait;
use llmgate_contracts::{AssistantMessage, ChatChoice, ChatCompletion, Role, Usage};
use llmgate_core::{CoreError, ProviderClient, ProviderDispatchRequest};
use uuid::Uuid;

pub struct MockProviderClient {
    provider_id: String,
}

impl MockProviderClient {
    pub fn new(provider_id: String) -> Self {
        Self { provider_id }
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn dispatch(
        &self,
        request: ProviderDispatchRequest<'_>,
    ) -> Result<ChatCompletion, CoreError> {
        let content = request
            .request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.to_text())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                CoreError::Transport(format!("{} received no user message", self.provider_id))
            })?;

        let prompt_tokens = request
            .request
            .messages
            .iter()
            .map(|message| message.content.to_text().split_whitespace().count() as u32)
            .sum::<u32>();
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(ChatCompletion {
            id: format!("mock-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: 0,
            model: request.request.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: Role::Assistant,
                    content: Some(content),
                    tool_calls: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            }),
        })
    }
}
