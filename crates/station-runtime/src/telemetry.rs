//! Tracing initialisation for the weather station binary.
//!
//! Call [`init_tracing`] once at process startup. Spans created with
//! `#[instrument]` on the presence state machine, the listener and the router
//! are exported when an OTLP collector is configured.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). Activates the OTLP HTTP exporter. |
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `WEATHERSTATION_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = station_runtime::telemetry::init_tracing("weatherstation");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FORMAT_VAR: &str = "WEATHERSTATION_LOG_FORMAT";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const DEFAULT_FILTER: &str = "info";

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// What the subscriber should look like, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `RUST_LOG` directives.
    pub filter: String,
    pub json: bool,
    /// Collector URL; `None` keeps spans local.
    pub otlp_endpoint: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            filter: var("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            json: var(LOG_FORMAT_VAR).is_some_and(|f| f.trim().eq_ignore_ascii_case("json")),
            otlp_endpoint: var(OTLP_ENDPOINT_VAR),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!("[weatherstation] bad log filter {:?}: {e}", self.filter);
            EnvFilter::new(DEFAULT_FILTER)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber described by the environment.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes all pending span batches.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let settings = LogSettings::from_env();
    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(service_name, endpoint));

    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("weatherstation")));
    let json = settings.json.then(|| fmt::layer().json());
    let compact = (!settings.json).then(|| fmt::layer().compact());

    let installed = tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(otel)
        .with(json)
        .with(compact)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[weatherstation] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel [`SdkTracerProvider`] down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[weatherstation] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

/// `None` when the exporter cannot be built.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[weatherstation] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Tracing is initialised before the Tokio runtime exists.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(
            settings(&[]),
            LogSettings {
                filter: "info".to_string(),
                json: false,
                otlp_endpoint: None,
            }
        );
    }

    #[test]
    fn json_format_is_case_insensitive() {
        assert!(settings(&[(LOG_FORMAT_VAR, "JSON")]).json);
        assert!(settings(&[(LOG_FORMAT_VAR, " json ")]).json);
        assert!(!settings(&[(LOG_FORMAT_VAR, "compact")]).json);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[("RUST_LOG", "  "), (OTLP_ENDPOINT_VAR, "")]);
        assert_eq!(s.filter, "info");
        assert_eq!(s.otlp_endpoint, None);
    }

    #[test]
    fn endpoint_and_filter_pass_through() {
        let s = settings(&[
            ("RUST_LOG", "station_hal=debug"),
            (OTLP_ENDPOINT_VAR, "http://localhost:4318"),
        ]);
        assert_eq!(s.filter, "station_hal=debug");
        assert_eq!(s.otlp_endpoint.as_deref(), Some("http://localhost:4318"));
    }

    #[test]
    fn unparsable_filter_falls_back() {
        let s = settings(&[("RUST_LOG", "station_hal=loud")]);
        // Still yields a usable filter.
        let _ = s.env_filter();
    }

    #[test]
    fn empty_guard_drops_quietly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
