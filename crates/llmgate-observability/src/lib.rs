use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod exporters;

pub use config::ObservabilityConfig;
pub use exporters::stdout::{LogExporterKind, LogFormat};

use exporters::stdout::span_events_mask;

pub fn init_observability(service_name: &str) {
    init_with_config(service_name, &ObservabilityConfig::from_env());
}

pub fn init_with_config(service_name: &str, config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.fallback_filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_exporter {
        LogExporterKind::None => None,
        LogExporterKind::Stdout => Some(fmt_layer(config, std::io::stdout)),
        LogExporterKind::Stderr => Some(fmt_layer(config, std::io::stderr)),
    };

    let installed = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
    if installed.is_ok() {
        tracing::debug!(event = "observability.initialized", service = service_name);
    }
}

fn fmt_layer<S, W>(
    config: &ObservabilityConfig,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(writer)
        .with_span_events(span_events_mask(config.log_span_events));
    match config.log_format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
