//! Log output and optional span export.
//!
//! Every process logs to stdout through `tracing-subscriber`. Setting
//! `OTEL_EXPORTER_OTLP_ENDPOINT` also ships spans to an OTLP collector.

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, Result};

const DEFAULT_FILTER: &str = "viso_admin_backend=debug,tower_http=debug,sqlx::query=info";
const TRACER_NAME: &str = "viso-admin";

/// Flushes exported spans when dropped. Keep it alive in `main`.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("Failed to flush spans on shutdown: {e:?}");
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(otel_endpoint: Option<&str>, service_name: &str) -> Result<Option<OtelGuard>> {
    let provider = otel_endpoint
        .map(|endpoint| otlp_provider(endpoint, service_name))
        .transpose()?;
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Tracing already initialized: {}", e)))?;

    if let Some(endpoint) = otel_endpoint {
        tracing::info!(otel_endpoint = endpoint, service_name, "Exporting spans over OTLP");
    }
    Ok(provider.map(|provider| OtelGuard { provider }))
}

fn otlp_provider(endpoint: &str, service_name: &str) -> Result<SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::trace::BatchSpanProcessor;
    use opentelemetry_sdk::Resource;

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Config(format!("Invalid OTLP endpoint {}: {}", endpoint, e)))?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", service_name.to_owned()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
