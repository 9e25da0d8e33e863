use std::fmt;

use async_trait::async_trait;
use llmgate_contracts::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{CompletionRequest, CompletionResult};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache read failed: {0}")]
    Read(String),
    #[error("cache write failed: {0}")]
    Write(String),
    #[error("cache entry is corrupt: {0}")]
    Corrupt(String),
}

/// Key/value store for validated responses.
///
/// Implementations must tolerate concurrent `get`/`set`; last writer wins per fingerprint.
/// `trace_id` is for observability only and never part of the key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(
        &self,
        fingerprint: &CacheFingerprint,
        trace_id: &str,
    ) -> Result<Option<CompletionResult>, CacheError>;

    async fn set(
        &self,
        fingerprint: &CacheFingerprint,
        entry: &CompletionResult,
        trace_id: &str,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheFingerprint(String);

#[derive(Serialize)]
struct FingerprintMaterial<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageMaterial<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<SchemaMaterial<'a>>,
}

#[derive(Serialize)]
struct ImageMaterial<'a> {
    sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct SchemaMaterial<'a> {
    name: &'a str,
    schema: Value,
}

impl CacheFingerprint {
    pub fn of(request: &CompletionRequest) -> Self {
        let material = FingerprintMaterial {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            image: request.image.as_ref().map(|image| ImageMaterial {
                sha256: hex_digest(&image.buffer),
                description: image.description.as_deref(),
            }),
            response_schema: request.response_schema.as_ref().map(|schema| SchemaMaterial {
                name: &schema.name,
                schema: schema.schema.to_portable_schema(),
            }),
        };
        // Going through `Value` sorts every object's keys.
        let canonical = serde_json::to_value(&material)
            .map(|value| value.to_string())
            .unwrap_or_default();
        Self(hex_digest(canonical.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheFingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use llmgate_contracts::{ImageAttachment, ToolChoice, ToolChoiceMode, ToolDefinition};
    use serde_json::{Map, json};

    use super::*;
    use crate::JsonSchemaCapability;

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4o",
            vec![ChatMessage::system("extract"), ChatMessage::user("the page")],
        )
        .with_temperature(0.1)
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fingerprint = CacheFingerprint::of(&request());
        assert_eq!(fingerprint.as_str().len(), 64);
        assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fingerprint, CacheFingerprint::of(&request()));
    }

    #[test]
    fn fingerprint_ignores_tools_and_tool_choice() {
        let plain = request();
        let with_tools = request()
            .with_tools(vec![ToolDefinition::function("click", None, None)])
            .with_tool_choice(ToolChoice::Mode(ToolChoiceMode::Required));
        assert_eq!(CacheFingerprint::of(&plain), CacheFingerprint::of(&with_tools));
    }

    #[test]
    fn fingerprint_tracks_sampling_messages_and_image() {
        let base = CacheFingerprint::of(&request());
        assert_ne!(base, CacheFingerprint::of(&request().with_temperature(0.2)));
        assert_ne!(base, CacheFingerprint::of(&request().with_presence_penalty(0.5)));

        let mut other_messages = request();
        other_messages.messages.push(ChatMessage::assistant("ok"));
        assert_ne!(base, CacheFingerprint::of(&other_messages));

        let with_image = request().with_image(ImageAttachment::new(vec![1, 2, 3], None));
        let other_image = request().with_image(ImageAttachment::new(vec![1, 2, 4], None));
        assert_ne!(base, CacheFingerprint::of(&with_image));
        assert_ne!(CacheFingerprint::of(&with_image), CacheFingerprint::of(&other_image));
    }

    #[test]
    fn fingerprint_is_independent_of_schema_key_order() {
        let mut forward = Map::new();
        forward.insert("type".to_string(), json!("object"));
        forward.insert("required".to_string(), json!(["answer"]));
        forward.insert("properties".to_string(), json!({"answer": {"type": "string"}}));
        let mut backward = Map::new();
        backward.insert("properties".to_string(), json!({"answer": {"type": "string"}}));
        backward.insert("required".to_string(), json!(["answer"]));
        backward.insert("type".to_string(), json!("object"));

        let first = request().with_response_schema(
            "Answer",
            Arc::new(JsonSchemaCapability::new(Value::Object(forward)).expect("schema")),
        );
        let second = request().with_response_schema(
            "Answer",
            Arc::new(JsonSchemaCapability::new(Value::Object(backward)).expect("schema")),
        );
        assert_eq!(CacheFingerprint::of(&first), CacheFingerprint::of(&second));

        let renamed = request().with_response_schema(
            "Other",
            Arc::new(JsonSchemaCapability::new(json!({"type": "object"})).expect("schema")),
        );
        assert_ne!(CacheFingerprint::of(&first), CacheFingerprint::of(&renamed));
    }
}
