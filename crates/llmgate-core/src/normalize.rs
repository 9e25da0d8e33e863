use llmgate_contracts::{ChatMessage, Role, ToolDefinition};
use serde_json::Value;

use crate::{CompletionRequest, CoreError, ModelCapabilities};

#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub request: CompletionRequest,
    pub tools_emulated: bool,
    pub schema_instructed: bool,
}

pub fn ensure_compatible(
    request: &CompletionRequest,
    capabilities: ModelCapabilities,
) -> Result<(), CoreError> {
    if request.messages.is_empty() {
        return Err(CoreError::InvalidRequest("messages must not be empty".to_string()));
    }
    if !capabilities.native_tools
        && request.requested_tools().is_some()
        && request.response_schema.is_some()
    {
        return Err(CoreError::ConflictingOptions { model: request.model.clone() });
    }
    Ok(())
}

pub fn normalize_request(
    request: &CompletionRequest,
    capabilities: ModelCapabilities,
) -> NormalizedRequest {
    let mut normalized = request.clone();
    let mut tools_emulated = false;
    let mut schema_instructed = false;

    if !capabilities.system_role {
        for message in &mut normalized.messages {
            message.role = Role::User;
        }
    }

    if !capabilities.sampling_params {
        normalized.temperature = None;
        normalized.top_p = None;
        normalized.frequency_penalty = None;
        normalized.presence_penalty = None;
        normalized.tool_choice = None;
    }

    if !capabilities.native_tools {
        if let Some(tools) = request.requested_tools() {
            normalized.messages.push(ChatMessage::user(tool_instruction(tools)));
            tools_emulated = true;
        }
        normalized.tools = None;
        normalized.tool_choice = None;
    }

    if !capabilities.structured_output
        && let Some(response_schema) = &request.response_schema
    {
        let schema = response_schema.schema.to_portable_schema();
        normalized.messages.push(ChatMessage::user(schema_instruction(&schema)));
        schema_instructed = true;
    }

    NormalizedRequest { request: normalized, tools_emulated, schema_instructed }
}

fn tool_instruction(tools: &[ToolDefinition]) -> String {
    let rendered = serde_json::to_string(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You have the following tools available:\n{rendered}\n\n\
         To use a tool, respond with a JSON object of the form \
         {{\"name\": \"<tool_name>\", \"arguments\": <tool_arguments>}}.\n\
         Do not include any other text or formatting such as ``` in your response. \
         Only the JSON object."
    )
}

fn schema_instruction(schema: &Value) -> String {
    format!(
        "Respond with a JSON object matching this schema:\n{schema}\n\n\
         Do not include any other text, formatting or markdown in your output. \
         Do not wrap it in ``` or ```json. Only the JSON object itself."
    )
}
