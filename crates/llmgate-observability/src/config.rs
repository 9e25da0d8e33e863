use std::env;

use crate::exporters::stdout::{LogExporterKind, LogFormat, parse_log_exporter_kind, parse_log_format};

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_span_events: bool,
    pub log_exporter: LogExporterKind,
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup("LG_LOG_LEVEL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_span_events = lookup("LG_LOG_SPAN_EVENTS").map(|v| is_truthy(&v)).unwrap_or(false);
        let log_exporter =
            parse_log_exporter_kind(&lookup("LG_LOG_EXPORTER").unwrap_or_else(|| "stdout".to_string()));
        let log_format =
            parse_log_format(&lookup("LG_LOG_FORMAT").unwrap_or_else(|| "compact".to_string()));

        Self { log_level, log_span_events, log_exporter, log_format }
    }

    pub fn fallback_filter(&self) -> String {
        format!(
            "{level},llmgate_app={level},llmgate_core={level},llmgate_cache={level},llmgate_clients_openai={level}",
            level = self.log_level
        )
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
