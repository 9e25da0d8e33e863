use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use llmgate_cache::{InMemoryCacheStore, JsonFileCacheStore};
use llmgate_clients_openai::{MockProviderClient, OpenAiClient, build_http_client};
use llmgate_contracts::{
    ChatCompletion, ChatCompletionRequestBody, ResponseFormat, StructuredOutputResponse,
};
use llmgate_core::{
    CacheStore, CapabilityTable, CompletionGateway, CompletionRequest, CompletionResult,
    CoreError, GatewayOptions, JsonSchemaCapability, ModelCapabilities, ProviderClient,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AppConfig, CacheBackend};

pub mod config;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct ModelEntry {
    id: String,
    object: String,
    created: i64,
    owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct ModelsResponse {
    object: String,
    data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
struct ErrorResponse {
    error: String,
    kind: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
enum ChatCompletionReply {
    Completion(ChatCompletion),
    Structured(StructuredOutputResponse),
}

impl From<CompletionResult> for ChatCompletionReply {
    fn from(result: CompletionResult) -> Self {
        match result {
            CompletionResult::Completion(completion) => Self::Completion(completion),
            CompletionResult::Structured(data) => Self::Structured(StructuredOutputResponse {
                object: "structured_output".to_string(),
                data,
            }),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(get_health, get_models, post_chat_completions),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            ModelEntry,
            ModelsResponse,
            ChatCompletionRequestBody,
            ChatCompletion,
            StructuredOutputResponse,
            ChatCompletionReply
        )
    ),
    tags(
        (name = "llmgate-app", description = "llmgate completion gateway API")
    )
)]
struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<CompletionGateway>,
    models: Vec<String>,
    max_retries: u32,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let provider: Arc<dyn ProviderClient> = if config.provider_mock {
            Arc::new(MockProviderClient::new("mock".to_string()))
        } else {
            Arc::new(OpenAiClient::new(
                "openai".to_string(),
                Some(config.provider_base_url.clone()),
                config.provider_api_key.clone(),
                build_http_client(config.provider_timeout_seconds),
                Some(config.provider_max_inflight),
            ))
        };
        let capabilities = CapabilityTable::new(ModelCapabilities::FULL)
            .with_reduced_models(config.reduced_capability_models.iter().cloned());
        let options = GatewayOptions {
            caching: config.cache_enabled,
            default_retries: config.default_retries,
            background_cache_writes: config.cache_background_writes,
        };

        let mut gateway =
            CompletionGateway::new(provider).with_capabilities(capabilities).with_options(options);
        if config.cache_enabled {
            let cache: Arc<dyn CacheStore> = match config.cache_backend {
                CacheBackend::Memory => Arc::new(InMemoryCacheStore::default()),
                CacheBackend::File => Arc::new(JsonFileCacheStore::new(config.cache_path.clone())),
            };
            gateway = gateway.with_cache(cache);
        }

        info!(
            event = "app.gateway.configured",
            mock_provider = config.provider_mock,
            cache_enabled = config.cache_enabled,
            cache_backend = ?config.cache_backend,
            default_retries = config.default_retries,
            max_retries = config.max_retries
        );

        Self::new(Arc::new(gateway), config.supported_models.clone(), config.max_retries)
    }

    pub fn new(gateway: Arc<CompletionGateway>, models: Vec<String>, max_retries: u32) -> Self {
        Self { gateway, models, max_retries }
    }

    // Caller-supplied budgets never exceed the configured ceiling.
    fn retry_budget(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.gateway.options().default_retries).min(self.max_retries)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/v1/models", get(get_models))
        .route("/v1/chat/completions", post(post_chat_completions))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "llmgate-app"
)]
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".to_string() })
}

#[utoipa::path(
    get,
    path = "/v1/models",
    responses((status = 200, description = "OpenAI-compatible model list", body = ModelsResponse)),
    tag = "llmgate-app"
)]
async fn get_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .models
        .iter()
        .map(|id| ModelEntry {
            id: id.clone(),
            object: "model".to_string(),
            created: 1_710_979_200,
            owned_by: id.split_once('/').map(|(owner, _)| owner).unwrap_or("openai").to_string(),
        })
        .collect::<Vec<_>>();
    Json(ModelsResponse { object: "list".to_string(), data })
}

#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    request_body = ChatCompletionRequestBody,
    responses(
        (status = 200, description = "Reply envelope, or structured output when a schema was requested", body = ChatCompletionReply),
        (status = 400, description = "Invalid or conflicting request", body = ErrorResponse),
        (status = 422, description = "Model output failed parsing or validation", body = ErrorResponse),
        (status = 502, description = "Provider transport failure", body = ErrorResponse)
    ),
    tag = "llmgate-app"
)]
#[instrument(skip(state, body), fields(model = %body.model))]
async fn post_chat_completions(
    State(state): State<AppState>,
    Json(body): Json<ChatCompletionRequestBody>,
) -> Response {
    let retries = state.retry_budget(body.retries);
    let request = match into_completion_request(body) {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };

    match state.gateway.create_chat_completion_with_retries(&request, retries).await {
        Ok(result) => Json(ChatCompletionReply::from(result)).into_response(),
        Err(err) => error_response(err),
    }
}

fn into_completion_request(
    body: ChatCompletionRequestBody,
) -> Result<CompletionRequest, CoreError> {
    let mut request = CompletionRequest::new(body.model, body.messages);
    request.temperature = body.temperature;
    request.top_p = body.top_p;
    request.frequency_penalty = body.frequency_penalty;
    request.presence_penalty = body.presence_penalty;
    request.tools = body.tools;
    request.tool_choice = body.tool_choice;

    if let Some(image) = body.image {
        let attachment = image.into_attachment().map_err(|err| {
            CoreError::InvalidRequest(format!("image.base64 is not valid base64: {err}"))
        })?;
        request = request.with_image(attachment);
    }
    if let Some(ResponseFormat::JsonSchema { json_schema }) = body.response_format {
        let capability = JsonSchemaCapability::new(json_schema.schema)?;
        request = request.with_response_schema(json_schema.name, Arc::new(capability));
    }
    Ok(request)
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::ConflictingOptions { .. } | CoreError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        CoreError::SchemaParse { .. }
        | CoreError::SchemaValidation { .. }
        | CoreError::ToolCallParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: CoreError) -> Response {
    let body = ErrorResponse { error: err.to_string(), kind: err.kind().to_string() };
    (status_for(&err), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use llmgate_contracts::{AssistantMessage, ChatChoice, Role};
    use llmgate_core::ProviderDispatchRequest;
    use serde_json::{Map, Value};
    use tower::ServiceExt;

    use super::*;

    #[derive(Debug)]
    struct AppFixture<'a> {
        name: &'a str,
        method: &'a str,
        path: &'a str,
        body: Option<&'a str>,
    }

    impl<'a> AppFixture<'a> {
        fn parse(raw: &'a str) -> Self {
            let mut fixture = Self { name: "unnamed", method: "GET", path: "/health", body: None };

            for line in raw.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    continue;
                };
                match key.trim() {
                    "name" => fixture.name = value.trim(),
                    "method" => fixture.method = value.trim(),
                    "path" => fixture.path = value.trim(),
                    "body" => fixture.body = Some(value.trim()),
                    other => panic!("unsupported fixture key: {other}"),
                }
            }

            fixture
        }
    }

    fn assert_snapshot(name: &str, actual: &str, expected: &str) {
        let actual = actual.trim();
        let expected = expected.trim();
        assert_eq!(
            actual, expected,
            "snapshot mismatch for fixture `{name}`\n\nactual:\n{actual}\n\nexpected:\n{expected}"
        );
    }

    fn summarize_json(value: Value) -> String {
        let Some(obj) = value.as_object() else {
            return format!("json={value}");
        };

        if let Some(status) = obj.get("status").and_then(Value::as_str)
            && obj.len() == 1
        {
            return format!("json.status={status}");
        }

        if let (Some(error), Some(kind)) =
            (obj.get("error").and_then(Value::as_str), obj.get("kind").and_then(Value::as_str))
        {
            // Messages carry provider or validator detail after the first colon.
            let headline = error.split(": ").next().unwrap_or(error);
            return format!("json.kind={kind}\njson.error={headline}");
        }

        match obj.get("object").and_then(Value::as_str) {
            Some("list") => {
                let data = obj.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
                let first_id = data
                    .first()
                    .and_then(|it| it.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or("<none>");
                format!("json.data_len={}\njson.first_id={first_id}", data.len())
            }
            Some("structured_output") => {
                let data = obj.get("data").cloned().unwrap_or(Value::Null);
                format!("json.object=structured_output\njson.data={data}")
            }
            Some("chat.completion") => {
                let content = obj
                    .get("choices")
                    .and_then(Value::as_array)
                    .and_then(|choices| choices.first())
                    .and_then(|choice| choice.get("message"))
                    .and_then(|message| message.get("content"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                format!("json.object=chat.completion\njson.choice0={}", content.trim_end())
            }
            _ => format!("json={}", to_ordered_json(obj)),
        }
    }

    fn to_ordered_json(map: &Map<String, Value>) -> Value {
        let ordered = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<BTreeMap<_, _>>();
        serde_json::to_value(ordered).expect("ordered json serialization must succeed")
    }

    async fn read_body(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body read must succeed");
        (status, String::from_utf8_lossy(&body).to_string())
    }

    async fn snapshot_response(response: Response) -> String {
        let (status, body) = read_body(response).await;
        let summary = match serde_json::from_str::<Value>(&body) {
            Ok(value) => summarize_json(value),
            Err(_) => format!("text.body={}", body.trim()),
        };
        format!("status={}\n{summary}", status.as_u16())
    }

    fn request_for(fixture: &AppFixture<'_>) -> Request<Body> {
        let mut builder = Request::builder().method(fixture.method).uri(fixture.path);
        let body = if let Some(body) = fixture.body {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        } else {
            Body::empty()
        };
        builder.body(body).expect("request must build")
    }

    async fn check_fixture(raw_fixture: &str, expected_snapshot: &str) {
        let fixture = AppFixture::parse(raw_fixture);
        let app = build_router(AppState::from_config(&AppConfig::for_tests()));
        let response = app.oneshot(request_for(&fixture)).await.expect("request must complete");
        let actual_snapshot = snapshot_response(response).await;
        assert_snapshot(fixture.name, &actual_snapshot, expected_snapshot);
    }

    #[tokio::test]
    async fn app_route_fixtures() {
        let fixtures = [
            (
                r#"
name=health
method=GET
path=/health
"#,
                r#"
status=200
json.status=healthy
"#,
            ),
            (
                r#"
name=models
method=GET
path=/v1/models
"#,
                r#"
status=200
json.data_len=6
json.first_id=gpt-4o
"#,
            ),
            (
                r#"
name=chat_plain_completion
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[{"role":"system","content":"be brief"},{"role":"user","content":"hello world"}],"temperature":0.2}
"#,
                r#"
status=200
json.object=chat.completion
json.choice0=hello world
"#,
            ),
            (
                r#"
name=chat_structured_output
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[{"role":"user","content":"{\"answer\":\"yes\"}"}],"response_format":{"type":"json_schema","json_schema":{"name":"Answer","schema":{"type":"object","properties":{"answer":{"type":"string"}},"required":["answer"]}}}}
"#,
                r#"
status=200
json.object=structured_output
json.data={"answer":"yes"}
"#,
            ),
            (
                r#"
name=chat_schema_validation_failure
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","retries":0,"messages":[{"role":"user","content":"{\"answer\":1}"}],"response_format":{"type":"json_schema","json_schema":{"name":"Answer","schema":{"type":"object","properties":{"answer":{"type":"string"}},"required":["answer"]}}}}
"#,
                r#"
status=422
json.kind=SchemaValidation
json.error=response does not match schema Answer
"#,
            ),
            (
                r#"
name=chat_schema_parse_failure
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","retries":1,"messages":[{"role":"user","content":"plain prose"}],"response_format":{"type":"json_schema","json_schema":{"name":"Answer","schema":{"type":"object"}}}}
"#,
                r#"
status=422
json.kind=SchemaParse
json.error=response is not valid JSON
"#,
            ),
            (
                r#"
name=chat_oversized_retry_budget_is_capped
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","retries":5000,"messages":[{"role":"user","content":"still prose"}],"response_format":{"type":"json_schema","json_schema":{"name":"Answer","schema":{"type":"object"}}}}
"#,
                r#"
status=422
json.kind=SchemaParse
json.error=response is not valid JSON
"#,
            ),
            (
                r#"
name=chat_reduced_model_conflict
method=POST
path=/v1/chat/completions
body={"model":"o1-mini","messages":[{"role":"user","content":"hi"}],"tools":[{"type":"function","function":{"name":"click"}}],"response_format":{"type":"json_schema","json_schema":{"name":"Answer","schema":{"type":"object"}}}}
"#,
                r#"
status=400
json.kind=ConflictingOptions
json.error=model o1-mini cannot combine tools with a response schema
"#,
            ),
            (
                r#"
name=chat_reduced_model_tool_emulation_unparseable
method=POST
path=/v1/chat/completions
body={"model":"o1-mini","retries":0,"messages":[{"role":"user","content":"click buy"}],"tools":[{"type":"function","function":{"name":"click"}}]}
"#,
                r#"
status=422
json.kind=ToolCallParse
json.error=emulated tool call could not be parsed
"#,
            ),
            (
                r#"
name=chat_empty_messages
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[]}
"#,
                r#"
status=400
json.kind=InvalidRequest
json.error=invalid request
"#,
            ),
            (
                r#"
name=chat_invalid_image
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[{"role":"user","content":"describe"}],"image":{"base64":"***"}}
"#,
                r#"
status=400
json.kind=InvalidRequest
json.error=invalid request
"#,
            ),
        ];

        for (fixture, expected) in fixtures {
            check_fixture(fixture, expected).await;
        }
    }

    #[tokio::test]
    async fn repeated_request_is_served_from_cache() {
        let app = build_router(AppState::from_config(&AppConfig::for_tests()));
        let fixture = AppFixture::parse(
            r#"
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[{"role":"user","content":"same question"}]}
"#,
        );

        let (first_status, first) =
            read_body(app.clone().oneshot(request_for(&fixture)).await.expect("first call")).await;
        let (second_status, second) =
            read_body(app.oneshot(request_for(&fixture)).await.expect("second call")).await;

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
        let first: Value = serde_json::from_str(&first).expect("json body");
        let second: Value = serde_json::from_str(&second).expect("json body");
        // The mock mints a fresh id per dispatch, so equal ids mean no second dispatch.
        assert_eq!(first["id"], second["id"]);
    }

    #[tokio::test]
    async fn disabled_cache_dispatches_every_time() {
        let mut config = AppConfig::for_tests();
        config.cache_enabled = false;
        let app = build_router(AppState::from_config(&config));
        let fixture = AppFixture::parse(
            r#"
method=POST
path=/v1/chat/completions
body={"model":"gpt-4o","messages":[{"role":"user","content":"same question"}]}
"#,
        );

        let (_, first) =
            read_body(app.clone().oneshot(request_for(&fixture)).await.expect("first call")).await;
        let (_, second) =
            read_body(app.oneshot(request_for(&fixture)).await.expect("second call")).await;

        let first: Value = serde_json::from_str(&first).expect("json body");
        let second: Value = serde_json::from_str(&second).expect("json body");
        assert_ne!(first["id"], second["id"]);
    }

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderClient for CountingProvider {
        async fn dispatch(
            &self,
            request: ProviderDispatchRequest<'_>,
        ) -> Result<ChatCompletion, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatCompletion {
                id: "chatcmpl-counting".to_string(),
                object: "chat.completion".to_string(),
                created: 0,
                model: request.request.model.clone(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: AssistantMessage {
                        role: Role::Assistant,
                        content: Some("never json".to_string()),
                        tool_calls: None,
                    },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }
    }

    fn counting_app(max_retries: u32) -> (Router, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider::default());
        let gateway = CompletionGateway::new(Arc::clone(&provider) as Arc<dyn ProviderClient>)
            .with_options(GatewayOptions {
                caching: false,
                default_retries: 3,
                background_cache_writes: false,
            });
        let state = AppState::new(Arc::new(gateway), vec!["gpt-4o".to_string()], max_retries);
        (build_router(state), provider)
    }

    fn prose_schema_request(retries: Option<u32>) -> Request<Body> {
        let retries = retries.map(|r| format!(r#""retries":{r},"#)).unwrap_or_default();
        let body = format!(
            r#"{{"model":"gpt-4o",{retries}"messages":[{{"role":"user","content":"q"}}],"response_format":{{"type":"json_schema","json_schema":{{"name":"Answer","schema":{{"type":"object"}}}}}}}}"#
        );
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request must build")
    }

    #[tokio::test]
    async fn requested_retries_are_clamped_to_configured_ceiling() {
        let (app, provider) = counting_app(10);

        let response =
            app.oneshot(prose_schema_request(Some(5000))).await.expect("request must complete");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn retry_budget_within_ceiling_is_honoured() {
        let (app, provider) = counting_app(10);
        app.oneshot(prose_schema_request(Some(2))).await.expect("request must complete");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        let (app, provider) = counting_app(1);
        app.oneshot(prose_schema_request(None)).await.expect("request must complete");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2, "default budget is capped too");
    }

    #[tokio::test]
    async fn openapi_documents_both_chat_reply_shapes() {
        let app = build_router(AppState::from_config(&AppConfig::for_tests()));
        let request = Request::builder()
            .uri("/openapi.json")
            .body(Body::empty())
            .expect("request must build");
        let (status, body) =
            read_body(app.oneshot(request).await.expect("request must complete")).await;
        assert_eq!(status, StatusCode::OK);

        let doc: Value = serde_json::from_str(&body).expect("openapi json");
        let reply = doc["paths"]["/v1/chat/completions"]["post"]["responses"]["200"]["content"]
            ["application/json"]["schema"]["$ref"]
            .as_str()
            .expect("200 reply schema ref");
        assert_eq!(reply, "#/components/schemas/ChatCompletionReply");
        let variants = doc["components"]["schemas"]["ChatCompletionReply"]["oneOf"].to_string();
        assert!(variants.contains("#/components/schemas/ChatCompletion"));
        assert!(variants.contains("#/components/schemas/StructuredOutputResponse"));
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (CoreError::InvalidRequest("x".to_string()), StatusCode::BAD_REQUEST),
            (CoreError::ConflictingOptions { model: "o1-mini".to_string() }, StatusCode::BAD_REQUEST),
            (
                CoreError::SchemaParse { content: String::new(), reason: "x".to_string() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::SchemaValidation { name: "A".to_string(), violations: Vec::new() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::ToolCallParse { content: String::new(), reason: "x".to_string() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (CoreError::Transport("down".to_string()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "status for {}", err.kind());
        }
    }
}
