//! [`StationContext`] – everything the listener and the router share.
//!
//! The context is cheap to clone (all `Arc`s plus a channel sender) and is
//! handed explicitly to each task; there is no process-wide state.

use std::sync::Arc;

use station_bus::{BusClient, DeliverySender, READING_CAPACITY, ReadingStream};
use station_hal::{
    ConsoleSink, DEFAULT_PERIOD_MS, DisplaySink, LcdDisplay, Registry, StreamConsole,
};

/// Process configuration, frozen when the station starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationConfig {
    /// Echo every displayed line on the console as well.
    pub console_echo: bool,
    pub callback_period_ms: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            console_echo: false,
            callback_period_ms: DEFAULT_PERIOD_MS,
        }
    }
}

#[derive(Clone)]
pub struct StationContext {
    pub bus: Arc<dyn BusClient>,
    pub registry: Arc<Registry>,
    pub display: Arc<dyn DisplaySink>,
    pub console: Arc<dyn ConsoleSink>,
    pub config: StationConfig,
    /// Handler installed with every device subscription.
    pub readings: DeliverySender,
}

impl StationContext {
    /// Build a context for the weather station kit together with the stream
    /// its device subscriptions deliver to.
    ///
    /// The display is the bus-backed LCD and the console is stdout; replace
    /// them with [`with_display`][Self::with_display] and
    /// [`with_console`][Self::with_console].
    pub fn channel(bus: Arc<dyn BusClient>, config: StationConfig) -> (Self, ReadingStream) {
        let (readings, stream) = ReadingStream::channel(READING_CAPACITY);
        let registry = Arc::new(Registry::weather_station(config.callback_period_ms));
        let display = Arc::new(LcdDisplay::new(bus.clone(), registry.clone()));
        let ctx = Self {
            bus,
            registry,
            display,
            console: Arc::new(StreamConsole::stdout()),
            config,
            readings,
        };
        (ctx, stream)
    }

    pub fn with_display(mut self, display: Arc<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }
}
