//! Logging and optional OTLP export.
//!
//! Logs always go to stderr so that stdout stays clean for `query` and
//! `schema` output. Set `COMMS_BRIDGE_LOG_FORMAT=json` for JSON lines.
//! With the `otel` feature, setting `OTEL_EXPORTER_OTLP_ENDPOINT` also ships
//! spans and log events over OTLP/HTTP.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_NAME: &str = "comms-bridge";

/// Keeps exporters alive; flushes them when dropped.
pub struct Telemetry {
    #[cfg(feature = "otel")]
    otel: Option<otel::Providers>,
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(providers) = self.otel.take() {
                providers.shutdown();
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    // Exporter transports log through tracing too; keep them out of the pipeline.
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=off,reqwest=off,opentelemetry=off"))
}

fn json_requested() -> bool {
    std::env::var("COMMS_BRIDGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init() -> Telemetry {
    let fmt_layer = if json_requested() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter());

    #[cfg(feature = "otel")]
    {
        let providers = otel::Providers::from_env();
        let trace_layer = providers
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer()));
        let log_layer = providers.as_ref().map(|p| {
            opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
                &p.logger_provider,
            )
        });
        let _ = registry.with(trace_layer).with(log_layer).try_init();
        Telemetry { otel: providers }
    }

    #[cfg(not(feature = "otel"))]
    {
        let _ = registry.try_init();
        Telemetry {}
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::{LogExporter, SpanExporter};
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::logs::SdkLoggerProvider;
    use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};

    use super::SERVICE_NAME;

    pub struct Providers {
        pub tracer_provider: SdkTracerProvider,
        pub logger_provider: SdkLoggerProvider,
    }

    impl Providers {
        /// Build exporters only when an OTLP endpoint is configured.
        pub fn from_env() -> Option<Self> {
            let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
            if endpoint.trim().is_empty() {
                return None;
            }

            let resource = Resource::builder().with_service_name(SERVICE_NAME).build();

            let span_exporter = match SpanExporter::builder().with_http().build() {
                Ok(exporter) => exporter,
                Err(e) => {
                    eprintln!("Warning: OTLP span exporter disabled: {e}");
                    return None;
                }
            };
            let log_exporter = match LogExporter::builder().with_http().build() {
                Ok(exporter) => exporter,
                Err(e) => {
                    eprintln!("Warning: OTLP log exporter disabled: {e}");
                    return None;
                }
            };

            let tracer_provider = SdkTracerProvider::builder()
                .with_batch_exporter(span_exporter)
                .with_resource(resource.clone())
                .build();
            let logger_provider = SdkLoggerProvider::builder()
                .with_batch_exporter(log_exporter)
                .with_resource(resource)
                .build();

            opentelemetry::global::set_tracer_provider(tracer_provider.clone());

            Some(Self {
                tracer_provider,
                logger_provider,
            })
        }

        pub fn tracer(&self) -> Tracer {
            self.tracer_provider.tracer(SERVICE_NAME)
        }

        pub fn shutdown(self) {
            let _ = self.tracer_provider.shutdown();
            let _ = self.logger_provider.shutdown();
        }
    }
}
