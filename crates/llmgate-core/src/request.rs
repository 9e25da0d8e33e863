use std::sync::Arc;

use llmgate_contracts::{ChatCompletion, ChatMessage, ImageAttachment, ToolChoice, ToolDefinition};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::schema::{ResponseSchema, SchemaCapability};

/// A completion request as authored by the caller.
///
/// The gateway never mutates it; normalization derives a new value per attempt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub image: Option<ImageAttachment>,
    pub response_schema: Option<ResponseSchema>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            image: None,
            response_schema: None,
            tools: None,
            tool_choice: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f64) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    pub fn with_presence_penalty(mut self, penalty: f64) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_response_schema(
        mut self,
        name: impl Into<String>,
        schema: Arc<dyn SchemaCapability>,
    ) -> Self {
        self.response_schema = Some(ResponseSchema::new(name, schema));
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn requested_tools(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref().filter(|tools| !tools.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CompletionResult {
    Structured(Value),
    Completion(ChatCompletion),
}

impl CompletionResult {
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Completion(_) => None,
        }
    }

    pub fn as_completion(&self) -> Option<&ChatCompletion> {
        match self {
            Self::Completion(completion) => Some(completion),
            Self::Structured(_) => None,
        }
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> Option<Result<T, serde_json::Error>> {
        match self {
            Self::Structured(value) => Some(serde_json::from_value(value)),
            Self::Completion(_) => None,
        }
    }
}
