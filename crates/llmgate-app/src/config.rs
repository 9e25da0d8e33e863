use std::env;
use std::path::PathBuf;

use llmgate_core::{DEFAULT_REDUCED_CAPABILITY_MODELS, DEFAULT_RETRIES};

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_CACHE_PATH: &str = "tmp/.cache/llm_calls.json";
pub const DEFAULT_SUPPORTED_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "o1-mini",
    "o1-preview",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    File,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub provider_base_url: String,
    pub provider_api_key: Option<String>,
    pub provider_timeout_seconds: u64,
    pub provider_max_inflight: usize,
    pub provider_mock: bool,
    pub cache_enabled: bool,
    pub cache_backend: CacheBackend,
    pub cache_path: PathBuf,
    pub cache_background_writes: bool,
    pub default_retries: u32,
    pub max_retries: u32,
    pub reduced_capability_models: Vec<String>,
    pub supported_models: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid LG_PORT value: {0}")]
    InvalidPort(String),
    #[error("invalid boolean value for {name}: {value}")]
    InvalidBool { name: &'static str, value: String },
    #[error("invalid LG_PROVIDER_TIMEOUT value: {0}")]
    InvalidProviderTimeout(String),
    #[error("invalid LG_PROVIDER_MAX_INFLIGHT value: {0}")]
    InvalidProviderMaxInflight(String),
    #[error("invalid LG_CACHE_BACKEND value: {0}")]
    InvalidCacheBackend(String),
    #[error("invalid LG_DEFAULT_RETRIES value: {0}")]
    InvalidDefaultRetries(String),
    #[error("invalid LG_MAX_RETRIES value: {0}")]
    InvalidMaxRetries(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let flag = |name: &'static str, default: bool| -> Result<bool, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidBool { name, value: raw }),
            }
        };

        let host = var("LG_HOST", "127.0.0.1");
        let port_raw = var("LG_PORT", "3000");
        let port = port_raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(port_raw))?;

        let provider_base_url = lookup("LG_PROVIDER_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string());
        let provider_api_key = lookup("LG_PROVIDER_API_KEY").filter(|v| !v.trim().is_empty());
        let timeout_raw = var("LG_PROVIDER_TIMEOUT", "60");
        let provider_timeout_seconds = timeout_raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidProviderTimeout(timeout_raw))?;
        let max_inflight_raw = var("LG_PROVIDER_MAX_INFLIGHT", "100");
        let provider_max_inflight = parse_positive_usize(&max_inflight_raw)
            .ok_or(ConfigError::InvalidProviderMaxInflight(max_inflight_raw))?;
        let provider_mock = flag("LG_PROVIDER_MOCK", false)?;

        let cache_enabled = flag("LG_CACHE_ENABLED", true)?;
        let backend_raw = var("LG_CACHE_BACKEND", "memory");
        let cache_backend = match backend_raw.trim().to_ascii_lowercase().as_str() {
            "memory" => CacheBackend::Memory,
            "file" => CacheBackend::File,
            _ => return Err(ConfigError::InvalidCacheBackend(backend_raw)),
        };
        let cache_path = PathBuf::from(var("LG_CACHE_PATH", DEFAULT_CACHE_PATH));
        let cache_background_writes = flag("LG_CACHE_BACKGROUND_WRITES", true)?;

        let retries_raw = var("LG_DEFAULT_RETRIES", &DEFAULT_RETRIES.to_string());
        let default_retries = retries_raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidDefaultRetries(retries_raw))?;
        let max_retries_raw = var("LG_MAX_RETRIES", &DEFAULT_MAX_RETRIES.to_string());
        let max_retries = max_retries_raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidMaxRetries(max_retries_raw))?;

        let reduced_capability_models = parse_string_list(
            lookup("LG_REDUCED_CAPABILITY_MODELS").unwrap_or_default().trim(),
            DEFAULT_REDUCED_CAPABILITY_MODELS,
        );
        let supported_models = parse_string_list(
            lookup("LG_SUPPORTED_MODELS").unwrap_or_default().trim(),
            DEFAULT_SUPPORTED_MODELS,
        );

        Ok(Self {
            host,
            port,
            provider_base_url,
            provider_api_key,
            provider_timeout_seconds,
            provider_max_inflight,
            provider_mock,
            cache_enabled,
            cache_backend,
            cache_path,
            cache_background_writes,
            default_retries,
            max_retries,
            reduced_capability_models,
            supported_models,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            provider_base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            provider_api_key: None,
            provider_timeout_seconds: 5,
            provider_max_inflight: 100,
            provider_mock: true,
            cache_enabled: true,
            cache_backend: CacheBackend::Memory,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_background_writes: false,
            default_retries: DEFAULT_RETRIES,
            max_retries: DEFAULT_MAX_RETRIES,
            reduced_capability_models: owned(DEFAULT_REDUCED_CAPABILITY_MODELS),
            supported_models: owned(DEFAULT_SUPPORTED_MODELS),
        }
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 { None } else { Some(parsed) }
}

fn parse_string_list(trimmed: &str, default: &[&str]) -> Vec<String> {
    if trimmed.is_empty() {
        return owned(default);
    }
    if trimmed.starts_with('[') {
        return match serde_json::from_str::<Vec<String>>(trimmed) {
            Ok(parsed) => parsed
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            Err(_) => owned(default),
        };
    }

    let parsed = trimmed
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>();
    if parsed.is_empty() { owned(default) } else { parsed }
}
