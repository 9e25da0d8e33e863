use llmgate_contracts::ChatCompletion;
use serde_json::Value;

use crate::{CoreError, ResponseSchema};

pub fn parse_and_validate(
    completion: &ChatCompletion,
    schema: &ResponseSchema,
) -> Result<Value, CoreError> {
    let content = completion.primary_content().unwrap_or_default();
    let value = parse_structured(content)?;
    if schema.schema.validate(&value) {
        return Ok(value);
    }
    let mut violations = schema.schema.violations(&value);
    if violations.is_empty() {
        violations.push("value does not match schema".to_string());
    }
    Err(CoreError::SchemaValidation { name: schema.name.clone(), violations })
}

fn parse_structured(content: &str) -> Result<Value, CoreError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CoreError::SchemaParse {
            content: content.to_string(),
            reason: "reply has no text content".to_string(),
        });
    }
    serde_json::from_str(trimmed).map_err(|err| CoreError::SchemaParse {
        content: content.to_string(),
        reason: err.to_string(),
    })
}
