//! Output sinks for routed readings.
//!
//! | Sink | Backed by | Unavailable when |
//! |---|---|---|
//! | [`LcdDisplay`] | LCD 20x4 requests on the bus | the LCD slot is absent |
//! | [`StreamConsole`] | any [`Write`], stdout by default | the writer fails |
//!
//! Sinks never retry. Callers log the error and move on.

use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use station_bus::BusClient;
use station_types::{DeviceKind, LcdTextLine, Request, Response, StationError, Uid};

use crate::registry::Registry;

/// A character display addressed by line and column.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn write_line(&self, line: u8, column: u8, text: &str) -> Result<(), StationError>;

    async fn clear(&self) -> Result<(), StationError>;

    async fn backlight_on(&self) -> Result<(), StationError>;

    async fn backlight_off(&self) -> Result<(), StationError>;

    async fn is_backlight_on(&self) -> Result<bool, StationError>;
}

/// Line-oriented text output.
pub trait ConsoleSink: Send + Sync {
    /// Write `text` followed by a newline.
    fn write_line(&self, text: &str) -> Result<(), StationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LcdDisplay
// ────────────────────────────────────────────────────────────────────────────

/// The LCD 20x4 bricklet currently attached to the registry.
///
/// Every call resolves the LCD uid from the slot snapshot, so the sink
/// follows the display as it is plugged in and out.
pub struct LcdDisplay {
    bus: Arc<dyn BusClient>,
    registry: Arc<Registry>,
}

impl LcdDisplay {
    pub fn new(bus: Arc<dyn BusClient>, registry: Arc<Registry>) -> Self {
        Self { bus, registry }
    }

    fn uid(&self) -> Result<Uid, StationError> {
        self.registry
            .uid(DeviceKind::Lcd20x4)
            .ok_or_else(|| StationError::SinkUnavailable("no LCD 20x4 attached".into()))
    }

    async fn send(&self, request: Request) -> Result<Response, StationError> {
        self.bus.request(request).await
    }
}

#[async_trait]
impl DisplaySink for LcdDisplay {
    async fn write_line(&self, line: u8, column: u8, text: &str) -> Result<(), StationError> {
        let uid = self.uid()?;
        let line = LcdTextLine::new(line, column, text);
        self.send(Request::WriteLine { uid, line }).await.map(drop)
    }

    async fn clear(&self) -> Result<(), StationError> {
        let uid = self.uid()?;
        self.send(Request::ClearDisplay { uid }).await.map(drop)
    }

    async fn backlight_on(&self) -> Result<(), StationError> {
        let uid = self.uid()?;
        self.send(Request::BacklightOn { uid }).await.map(drop)
    }

    async fn backlight_off(&self) -> Result<(), StationError> {
        let uid = self.uid()?;
        self.send(Request::BacklightOff { uid }).await.map(drop)
    }

    async fn is_backlight_on(&self) -> Result<bool, StationError> {
        let request = Request::IsBacklightOn { uid: self.uid()? };
        match self.send(request.clone()).await? {
            Response::Backlight(on) => Ok(on),
            other => Err(StationError::request(
                &request,
                format!("unexpected response {other:?}"),
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StreamConsole
// ────────────────────────────────────────────────────────────────────────────

/// Console sink over a locked writer, flushed after every line.
pub struct StreamConsole<W> {
    out: Mutex<W>,
}

impl StreamConsole<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StreamConsole<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ConsoleSink for StreamConsole<W> {
    fn write_line(&self, text: &str) -> Result<(), StationError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{text}")
            .and_then(|()| out.flush())
            .map_err(|e| StationError::Stream(e.to_string()))
    }
}
