use llmgate_contracts::{ChatCompletion, ToolCall};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::CoreError;

/// Call id given to reconstructed tool calls; the model never produced a native one.
pub const EMULATED_TOOL_CALL_ID: &str = "-1";

#[derive(Debug, Deserialize)]
struct EmulatedToolCall {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

pub fn reconstruct_tool_call(mut completion: ChatCompletion) -> Result<ChatCompletion, CoreError> {
    let Some(choice) = completion.choices.first_mut() else {
        return Err(CoreError::ToolCallParse {
            content: String::new(),
            reason: "reply has no choices".to_string(),
        });
    };
    let content = choice.message.content.clone().unwrap_or_default();
    let parsed: EmulatedToolCall = serde_json::from_str(content.trim())
        .map_err(|err| CoreError::ToolCallParse { content: content.clone(), reason: err.to_string() })?;
    if parsed.name.trim().is_empty() {
        return Err(CoreError::ToolCallParse { content, reason: "tool name is empty".to_string() });
    }

    let arguments = parsed.arguments.unwrap_or_else(|| Value::Object(Map::new()));
    let arguments = serde_json::to_string(&arguments)
        .map_err(|err| CoreError::ToolCallParse { content: content.clone(), reason: err.to_string() })?;

    choice.message.tool_calls =
        Some(vec![ToolCall::function(EMULATED_TOOL_CALL_ID, parsed.name, arguments)]);
    choice.message.content = None;
    choice.finish_reason = Some("tool_calls".to_string());
    Ok(completion)
}
