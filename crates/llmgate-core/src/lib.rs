use async_trait::async_trait;
use llmgate_contracts::ChatCompletion;
use serde_json::Value;

pub mod cache;
pub mod capabilities;
pub mod dispatch;
pub mod gateway;
pub mod normalize;
pub mod reconstruct;
pub mod request;
pub mod schema;
pub mod validate;

pub use cache::{CacheError, CacheFingerprint, CacheStore};
pub use capabilities::{CapabilityTable, DEFAULT_REDUCED_CAPABILITY_MODELS, ModelCapabilities};
pub use dispatch::CompletionDispatcher;
pub use gateway::{CompletionGateway, DEFAULT_RETRIES, GatewayOptions, GatewayState};
pub use normalize::{NormalizedRequest, normalize_request};
pub use reconstruct::{EMULATED_TOOL_CALL_ID, reconstruct_tool_call};
pub use request::{CompletionRequest, CompletionResult};
pub use schema::{JsonSchemaCapability, ResponseSchema, SchemaCapability, TypedSchema};
pub use validate::parse_and_validate;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("model {model} cannot combine tools with a response schema")]
    ConflictingOptions { model: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response is not valid JSON: {reason}")]
    SchemaParse { content: String, reason: String },
    #[error("response does not match schema {name}: {}", .violations.join("; "))]
    SchemaValidation { name: String, violations: Vec<String> },
    #[error("emulated tool call could not be parsed: {reason}")]
    ToolCallParse { content: String, reason: String },
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SchemaParse { .. } | Self::SchemaValidation { .. } | Self::ToolCallParse { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConflictingOptions { .. } => "ConflictingOptions",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Transport(_) => "Transport",
            Self::SchemaParse { .. } => "SchemaParse",
            Self::SchemaValidation { .. } => "SchemaValidation",
            Self::ToolCallParse { .. } => "ToolCallParse",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutputDirective {
    pub name: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderDispatchRequest<'a> {
    pub trace_id: &'a str,
    pub request: &'a CompletionRequest,
    pub output_directive: Option<&'a StructuredOutputDirective>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn dispatch(
        &self,
        request: ProviderDispatchRequest<'_>,
    ) -> Result<ChatCompletion, CoreError>;
}
