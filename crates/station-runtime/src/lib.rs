//! `station-runtime` – the event-routing engine of the weather station.
//!
//! # Modules
//!
//! - [`context`] – [`StationContext`], the bus, registry, sinks and
//!   configuration shared by every task, and the frozen [`StationConfig`].
//! - [`listener`] – [`EnumerationListener`], the long-lived task applying
//!   presence notifications to the registry in arrival order.
//! - [`router`] – [`Router`], one dispatch per reading: display line,
//!   console echo, chip temperature fallback and backlight toggle.
//! - [`station`] – [`Station`], startup and the orderly shutdown sequence.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable export.

pub mod context;
pub mod listener;
pub mod router;
pub mod station;
pub mod telemetry;

pub use context::{StationConfig, StationContext};
pub use listener::EnumerationListener;
pub use router::{RouteOutcome, Router, format_reading};
pub use station::{SHUTDOWN_GRACE, Station};
pub use telemetry::{LogSettings, TracerProviderGuard, init_tracing};
