//! [`Router`] – turns readings into display lines and follow-up requests.
//!
//! Every reading is one independent dispatch:
//!
//! | Reading | Line | Text | Side effect |
//! |---|---|---|---|
//! | `Temperature`, `ChipTemperature` | 0 | `Tem.: 21.50 °C` | – |
//! | `Humidity` | 1 | `Hum.: 55.25 %RH` | – |
//! | `AirPressure` | 2 | `Air.: 1013.25 mbar` | chip temperature request while no temperature bricklet is attached |
//! | `Illuminance` | 3 | `Ill.: 250.00 lx` | – |
//! | `ButtonPressed` | – | – | backlight toggle |
//! | `Unrecognized` | – | – | – |
//!
//! Text goes to the display while an LCD is attached and to the console when
//! echo is enabled. The chip temperature answer is fed back into the reading
//! queue and routed on its own. Sink failures are logged and never retried.

use station_types::{DeviceKind, Payload, Reading, Request, Response};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::context::StationContext;

/// What one dispatch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOutcome {
    pub line: Option<u8>,
    pub text: Option<String>,
    pub display_written: bool,
    pub console_written: bool,
    pub secondary_request: Option<Request>,
}

/// Display line and text for a reading, `None` when nothing is shown.
pub fn format_reading(reading: &Reading) -> Option<(u8, String)> {
    match *reading {
        Reading::Temperature(celsius) | Reading::ChipTemperature(celsius) => {
            Some((0, format!("Tem.: {celsius:5.2} °C")))
        }
        Reading::Humidity(rh) => Some((1, format!("Hum.: {rh:5.2} %RH      "))),
        Reading::AirPressure(mbar) => Some((2, format!("Air.: {mbar:7.2} mbar"))),
        Reading::Illuminance(lux) => Some((3, format!("Ill.: {lux:6.2} lx"))),
        Reading::ButtonPressed(_) | Reading::Unrecognized { .. } => None,
    }
}

#[derive(Clone)]
pub struct Router {
    ctx: StationContext,
}

impl Router {
    pub fn new(ctx: StationContext) -> Self {
        Self { ctx }
    }

    /// Route `reading` on its own task in `tasks`.
    pub fn spawn(&self, tasks: &mut JoinSet<RouteOutcome>, reading: Reading) {
        let router = self.clone();
        tasks.spawn(async move { router.route(reading).await });
    }

    /// Route one reading to completion.
    #[instrument(skip(self))]
    pub async fn route(&self, reading: Reading) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();

        if let Some((line, text)) = format_reading(&reading) {
            outcome.display_written = self.write_display(line, &text).await;
            outcome.console_written = self.write_console(&text);
            outcome.line = Some(line);
            outcome.text = Some(text);
        }

        match reading {
            Reading::AirPressure(_) => {
                outcome.secondary_request = self.request_chip_temperature().await;
            }
            Reading::ButtonPressed(button) => self.toggle_backlight(button).await,
            Reading::Unrecognized {
                device_identifier,
                function_id,
            } => debug!(device_identifier, function_id, "unrecognized reading ignored"),
            Reading::Temperature(_)
            | Reading::ChipTemperature(_)
            | Reading::Humidity(_)
            | Reading::Illuminance(_) => {}
        }
        outcome
    }

    async fn write_display(&self, line: u8, text: &str) -> bool {
        if !self.ctx.registry.is_present(DeviceKind::Lcd20x4) {
            return false;
        }
        match self.ctx.display.write_line(line, 0, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(line, error = %e, "display write failed");
                false
            }
        }
    }

    fn write_console(&self, text: &str) -> bool {
        if !self.ctx.config.console_echo {
            return false;
        }
        match self.ctx.console.write_line(text) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "console write failed");
                false
            }
        }
    }

    /// Without a temperature bricklet the barometer's chip temperature fills
    /// line 0.
    async fn request_chip_temperature(&self) -> Option<Request> {
        if self.ctx.registry.is_present(DeviceKind::Temperature) {
            return None;
        }
        let Some(uid) = self.ctx.registry.uid(DeviceKind::Barometer) else {
            debug!("barometer gone before chip temperature request");
            return None;
        };

        let request = Request::GetChipTemperature { uid };
        match self.ctx.bus.request(request.clone()).await {
            Ok(Response::Reading(reading)) => {
                if self
                    .ctx
                    .readings
                    .send(Ok(Payload::Reading(reading)))
                    .await
                    .is_err()
                {
                    debug!("reading queue closed; chip temperature dropped");
                }
            }
            Ok(other) => warn!(response = ?other, "unexpected chip temperature response"),
            Err(e) => warn!(error = %e, "chip temperature request failed"),
        }
        Some(request)
    }

    /// Read-modify-write of the backlight. Two presses racing each other may
    /// both read the same state.
    async fn toggle_backlight(&self, button: u8) {
        let display = &self.ctx.display;
        let result = match display.is_backlight_on().await {
            Ok(true) => display.backlight_off().await,
            Ok(false) => display.backlight_on().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(button, "backlight toggled"),
            Err(e) => warn!(button, error = %e, "backlight toggle failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use station_bus::ReadingStream;
    use station_bus::sim::SimBus;
    use station_hal::{ConsoleSink, DisplaySink};
    use station_types::{StationError, Uid};

    use super::*;
    use crate::context::StationConfig;

    // ── Test doubles ─────────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum DisplayCall {
        Write(u8, u8, String),
        Clear,
        On,
        Off,
        Query,
    }

    #[derive(Default)]
    struct RecordingDisplay {
        calls: Mutex<Vec<DisplayCall>>,
        backlight: Mutex<bool>,
    }

    impl RecordingDisplay {
        fn lit() -> Self {
            let display = Self::default();
            *display.backlight.lock().unwrap() = true;
            display
        }

        fn calls(&self) -> Vec<DisplayCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: DisplayCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DisplaySink for RecordingDisplay {
        async fn write_line(&self, line: u8, column: u8, text: &str) -> Result<(), StationError> {
            self.record(DisplayCall::Write(line, column, text.to_string()));
            Ok(())
        }

        async fn clear(&self) -> Result<(), StationError> {
            self.record(DisplayCall::Clear);
            Ok(())
        }

        async fn backlight_on(&self) -> Result<(), StationError> {
            self.record(DisplayCall::On);
            *self.backlight.lock().unwrap() = true;
            Ok(())
        }

        async fn backlight_off(&self) -> Result<(), StationError> {
            self.record(DisplayCall::Off);
            *self.backlight.lock().unwrap() = false;
            Ok(())
        }

        async fn is_backlight_on(&self) -> Result<bool, StationError> {
            self.record(DisplayCall::Query);
            Ok(*self.backlight.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct RecordingConsole {
        lines: Mutex<Vec<String>>,
    }

    impl ConsoleSink for RecordingConsole {
        fn write_line(&self, text: &str) -> Result<(), StationError> {
            self.lines.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Fixture {
        bus: Arc<SimBus>,
        ctx: StationContext,
        readings: ReadingStream,
        display: Arc<RecordingDisplay>,
        console: Arc<RecordingConsole>,
    }

    impl Fixture {
        async fn new(echo: bool, attached: &[DeviceKind]) -> Self {
            Self::with_display(echo, attached, RecordingDisplay::default()).await
        }

        async fn with_display(
            echo: bool,
            attached: &[DeviceKind],
            display: RecordingDisplay,
        ) -> Self {
            let bus = Arc::new(SimBus::new());
            let config = StationConfig {
                console_echo: echo,
                ..StationConfig::default()
            };
            let display = Arc::new(display);
            let console = Arc::new(RecordingConsole::default());
            let (ctx, readings) = StationContext::channel(bus.clone(), config);
            let ctx = ctx
                .with_display(display.clone())
                .with_console(console.clone());

            for kind in attached {
                ctx.registry
                    .get(*kind)
                    .unwrap()
                    .apply_presence(
                        bus.as_ref(),
                        &ctx.readings,
                        Uid::new(u32::from(kind.identifier())),
                        true,
                    )
                    .await
                    .unwrap();
            }
            Self {
                bus,
                ctx,
                readings,
                display,
                console,
            }
        }

        fn router(&self) -> Router {
            Router::new(self.ctx.clone())
        }

        fn chip_requests(&self) -> usize {
            self.bus
                .requests()
                .iter()
                .filter(|r| matches!(r, Request::GetChipTemperature { .. }))
                .count()
        }
    }

    // ── Formatting ───────────────────────────────────────────────────────────

    #[test]
    fn formats_every_displayed_kind() {
        assert_eq!(
            format_reading(&Reading::Humidity(55.25)),
            Some((1, "Hum.: 55.25 %RH      ".to_string()))
        );
        assert_eq!(
            format_reading(&Reading::AirPressure(1013.25)),
            Some((2, "Air.: 1013.25 mbar".to_string()))
        );
        assert_eq!(
            format_reading(&Reading::AirPressure(987.5)),
            Some((2, "Air.:  987.50 mbar".to_string()))
        );
        assert_eq!(
            format_reading(&Reading::Illuminance(12.3)),
            Some((3, "Ill.:  12.30 lx".to_string()))
        );
        assert_eq!(
            format_reading(&Reading::Temperature(21.5)),
            Some((0, "Tem.: 21.50 °C".to_string()))
        );
        assert_eq!(
            format_reading(&Reading::ChipTemperature(24.5)),
            Some((0, "Tem.: 24.50 °C".to_string()))
        );
        assert_eq!(format_reading(&Reading::ButtonPressed(1)), None);
    }

    // ── Sinks ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn humidity_without_echo_goes_to_display_only() {
        let f = Fixture::new(false, &[DeviceKind::Lcd20x4]).await;
        let outcome = f.router().route(Reading::Humidity(55.25)).await;

        assert!(outcome.display_written);
        assert!(!outcome.console_written);
        assert_eq!(
            f.display.calls(),
            vec![DisplayCall::Write(1, 0, "Hum.: 55.25 %RH      ".into())]
        );
        assert!(f.console.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn humidity_with_echo_goes_to_both() {
        let f = Fixture::new(true, &[DeviceKind::Lcd20x4]).await;
        let outcome = f.router().route(Reading::Humidity(55.25)).await;

        assert!(outcome.display_written);
        assert!(outcome.console_written);
        assert_eq!(
            *f.console.lines.lock().unwrap(),
            vec!["Hum.: 55.25 %RH      ".to_string()]
        );
    }

    #[tokio::test]
    async fn absent_lcd_skips_display() {
        let f = Fixture::new(true, &[]).await;
        let outcome = f.router().route(Reading::Illuminance(250.0)).await;

        assert!(!outcome.display_written);
        assert!(outcome.console_written);
        assert!(f.display.calls().is_empty());
    }

    #[tokio::test]
    async fn unrecognized_reading_writes_nothing() {
        let f = Fixture::new(true, &[DeviceKind::Lcd20x4]).await;
        let outcome = f
            .router()
            .route(Reading::Unrecognized {
                device_identifier: 13,
                function_id: 8,
            })
            .await;

        assert_eq!(outcome, RouteOutcome::default());
        assert!(f.display.calls().is_empty());
        assert!(f.console.lines.lock().unwrap().is_empty());
    }

    // ── Air pressure ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn air_pressure_without_temperature_requests_chip_temperature() {
        let mut f = Fixture::new(false, &[DeviceKind::Lcd20x4, DeviceKind::Barometer]).await;
        let outcome = f.router().route(Reading::AirPressure(1013.25)).await;

        assert_eq!(
            outcome.secondary_request,
            Some(Request::GetChipTemperature { uid: Uid::new(221) })
        );
        assert_eq!(f.chip_requests(), 1);
        assert_eq!(f.readings.recv().await, Some(Reading::ChipTemperature(24.5)));
    }

    #[tokio::test]
    async fn air_pressure_with_temperature_requests_nothing() {
        let f = Fixture::new(
            false,
            &[DeviceKind::Lcd20x4, DeviceKind::Barometer, DeviceKind::Temperature],
        )
        .await;
        let outcome = f.router().route(Reading::AirPressure(1013.25)).await;

        assert_eq!(outcome.secondary_request, None);
        assert_eq!(f.chip_requests(), 0);
    }

    #[tokio::test]
    async fn chip_temperature_never_requests_again() {
        let f = Fixture::new(false, &[DeviceKind::Lcd20x4, DeviceKind::Barometer]).await;
        let outcome = f.router().route(Reading::ChipTemperature(24.5)).await;

        assert_eq!(outcome.line, Some(0));
        assert_eq!(outcome.secondary_request, None);
        assert_eq!(f.chip_requests(), 0);
    }

    // ── Button ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn button_turns_lit_backlight_off() {
        let f = Fixture::with_display(false, &[DeviceKind::Lcd20x4], RecordingDisplay::lit()).await;
        f.router().route(Reading::ButtonPressed(0)).await;

        assert_eq!(f.display.calls(), vec![DisplayCall::Query, DisplayCall::Off]);
    }

    #[tokio::test]
    async fn button_turns_dark_backlight_on() {
        let f = Fixture::new(false, &[DeviceKind::Lcd20x4]).await;
        f.router().route(Reading::ButtonPressed(2)).await;

        assert_eq!(f.display.calls(), vec![DisplayCall::Query, DisplayCall::On]);
    }

    #[tokio::test]
    async fn spawned_dispatches_complete() {
        let f = Fixture::new(true, &[DeviceKind::Lcd20x4]).await;
        let router = f.router();
        let mut tasks = JoinSet::new();
        router.spawn(&mut tasks, Reading::Humidity(40.0));
        router.spawn(&mut tasks, Reading::Illuminance(100.0));

        let mut lines = Vec::new();
        while let Some(done) = tasks.join_next().await {
            lines.push(done.unwrap().line.unwrap());
        }
        lines.sort();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(f.console.lines.lock().unwrap().len(), 2);
    }
}
