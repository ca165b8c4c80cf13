//! Process-wide subscriber for the gateway.
//!
//! Logs go to stderr as human-readable lines, or as one JSON object per
//! event when `json` is set (for log shippers). Span export through
//! OpenTelemetry is opt-in and tags every span with the service name and
//! version so gateway traces can be told apart from their callers'.
//!
//! ```no_run
//! use tollgate_observe::tracing_setup::{TracingOptions, init_tracing};
//!
//! let options = TracingOptions::new("tollgate", env!("CARGO_PKG_VERSION"))
//!     .with_default_filter("info")
//!     .with_json(true);
//! init_tracing(&options).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

const SERVICE_NAME: &str = "service.name";
const SERVICE_VERSION: &str = "service.version";

/// How the subscriber is put together.
#[derive(Debug, Clone)]
pub struct TracingOptions {
    pub service_name: String,
    pub service_version: String,
    /// Used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
    pub json: bool,
    pub otel: bool,
}

impl TracingOptions {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            default_filter: "warn".to_string(),
            json: false,
            otel: false,
        }
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_otel(mut self, otel: bool) -> Self {
        self.otel = otel;
        self
    }

    /// `rust_log` wins when it holds a valid directive.
    fn env_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        rust_log
            .filter(|directives| !directives.trim().is_empty())
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(&self.default_filter))
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_attributes([
                KeyValue::new(SERVICE_NAME, self.service_name.clone()),
                KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
            ])
            .build()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = options.env_filter(rust_log.as_deref());

    let text_layer = (!options.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    });
    let json_layer = options.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
    });

    let otel_layer = if options.otel {
        let provider = SdkTracerProvider::builder()
            .with_resource(options.resource())
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer(options.service_name.clone());
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

/// Flush buffered spans. No-op when export was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        eprintln!("tollgate: span exporter shutdown failed: {e}");
    }
}
