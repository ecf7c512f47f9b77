//! Shared vocabulary of the weather station: bricklet kinds, enumeration
//! notices, readings, bus requests and the crate-wide [`StationError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod lcd;
pub mod uid;

pub use lcd::{LCD_COLUMNS, LCD_LINES, LcdTextLine};
pub use uid::Uid;

/// Bricklet categories the station knows how to drive.
///
/// A `DeviceKind` identifies a *category* of hardware, not a physical unit;
/// the unit itself is identified by its [`Uid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// LCD 20x4 display with four buttons.
    Lcd20x4,
    Humidity,
    /// Barometer; also carries a chip-internal temperature sensor.
    Barometer,
    AmbientLight,
    Temperature,
}

impl DeviceKind {
    /// Every supported kind, in registry construction order.
    pub const ALL: [DeviceKind; 5] = [
        DeviceKind::Lcd20x4,
        DeviceKind::Humidity,
        DeviceKind::Barometer,
        DeviceKind::AmbientLight,
        DeviceKind::Temperature,
    ];

    /// Device identifier reported by the brick daemon for this kind.
    pub fn identifier(self) -> u16 {
        match self {
            DeviceKind::Lcd20x4 => 212,
            DeviceKind::Humidity => 27,
            DeviceKind::Barometer => 221,
            DeviceKind::AmbientLight => 21,
            DeviceKind::Temperature => 216,
        }
    }

    /// Resolve a raw device identifier; `None` for bricklets the station
    /// does not manage.
    pub fn from_identifier(identifier: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.identifier() == identifier)
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Lcd20x4 => "lcd20x4",
            DeviceKind::Humidity => "humidity",
            DeviceKind::Barometer => "barometer",
            DeviceKind::AmbientLight => "ambient_light",
            DeviceKind::Temperature => "temperature",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enumeration
// ─────────────────────────────────────────────────────────────────────────────

/// Why an enumeration notice was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationType {
    /// Answer to an explicit enumerate request.
    Available,
    /// The device was (re)connected, e.g. after a power cycle.
    Connected,
    Disconnected,
}

/// A presence notification for one physical bricklet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enumeration {
    pub uid: Uid,
    #[serde(default)]
    pub connected_uid: Uid,
    #[serde(default = "default_position")]
    pub position: char,
    #[serde(default)]
    pub hardware_version: [u8; 3],
    #[serde(default)]
    pub firmware_version: [u8; 3],
    pub device_identifier: u16,
    pub enumeration_type: EnumerationType,
}

fn default_position() -> char {
    '0'
}

impl Enumeration {
    /// Minimal notice carrying only what the station acts upon.
    pub fn new(device_identifier: u16, uid: Uid, enumeration_type: EnumerationType) -> Self {
        Self {
            uid,
            connected_uid: Uid::NONE,
            position: default_position(),
            hardware_version: [0; 3],
            firmware_version: [0; 3],
            device_identifier,
            enumeration_type,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.enumeration_type == EnumerationType::Disconnected
    }

    /// The identity the station should record for this notice:
    /// [`Uid::NONE`] when the device went away.
    pub fn effective_uid(&self) -> Uid {
        if self.is_disconnected() {
            Uid::NONE
        } else {
            self.uid
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Readings and deliveries
// ─────────────────────────────────────────────────────────────────────────────

/// One measurement delivered asynchronously by a subscribed bricklet.
///
/// Values are already in their display unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// Relative humidity in %RH.
    Humidity(f64),
    /// Illuminance in lx.
    Illuminance(f64),
    /// Air pressure in mbar.
    AirPressure(f64),
    /// Barometer chip temperature in °C.
    ChipTemperature(f64),
    /// Temperature in °C.
    Temperature(f64),
    /// Index of the LCD button that was pressed.
    ButtonPressed(u8),
    /// A callback the station has no formatting for.
    Unrecognized { device_identifier: u16, function_id: u8 },
}

/// Everything a subscription handler can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Enumeration(Enumeration),
    Reading(Reading),
}

/// A single handler invocation: a payload or the error the bus reported.
pub type Delivery = Result<Payload, StationError>;

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions and requests
// ─────────────────────────────────────────────────────────────────────────────

/// A callback registration on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "callback", content = "uid", rename_all = "snake_case")]
pub enum Subscription {
    /// Presence notifications for every bricklet on the stack.
    Enumerate,
    HumidityPeriod(Uid),
    IlluminancePeriod(Uid),
    AirPressurePeriod(Uid),
    TemperaturePeriod(Uid),
    ButtonPressed(Uid),
}

impl Subscription {
    /// Target unit, `None` for stack-wide subscriptions.
    pub fn uid(&self) -> Option<Uid> {
        match self {
            Subscription::Enumerate => None,
            Subscription::HumidityPeriod(uid)
            | Subscription::IlluminancePeriod(uid)
            | Subscription::AirPressurePeriod(uid)
            | Subscription::TemperaturePeriod(uid)
            | Subscription::ButtonPressed(uid) => Some(*uid),
        }
    }

    /// Same callback, pointed at another unit.
    pub fn rebind(&self, uid: Uid) -> Self {
        match self {
            Subscription::Enumerate => Subscription::Enumerate,
            Subscription::HumidityPeriod(_) => Subscription::HumidityPeriod(uid),
            Subscription::IlluminancePeriod(_) => Subscription::IlluminancePeriod(uid),
            Subscription::AirPressurePeriod(_) => Subscription::AirPressurePeriod(uid),
            Subscription::TemperaturePeriod(_) => Subscription::TemperaturePeriod(uid),
            Subscription::ButtonPressed(_) => Subscription::ButtonPressed(uid),
        }
    }

    /// Whether a reading emitted by unit `uid` belongs to this callback.
    pub fn accepts(&self, uid: Uid, reading: &Reading) -> bool {
        match (self, reading) {
            (Subscription::HumidityPeriod(u), Reading::Humidity(_))
            | (Subscription::IlluminancePeriod(u), Reading::Illuminance(_))
            | (Subscription::AirPressurePeriod(u), Reading::AirPressure(_))
            | (Subscription::TemperaturePeriod(u), Reading::Temperature(_))
            | (Subscription::ButtonPressed(u), Reading::ButtonPressed(_)) => *u == uid,
            _ => false,
        }
    }

    pub fn callback_name(&self) -> &'static str {
        match self {
            Subscription::Enumerate => "enumerate",
            Subscription::HumidityPeriod(_) => "humidity_period",
            Subscription::IlluminancePeriod(_) => "illuminance_period",
            Subscription::AirPressurePeriod(_) => "air_pressure_period",
            Subscription::TemperaturePeriod(_) => "temperature_period",
            Subscription::ButtonPressed(_) => "button_pressed",
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid() {
            Some(uid) => write!(f, "{}({uid})", self.callback_name()),
            None => f.write_str(self.callback_name()),
        }
    }
}

/// Ownership token for an active subscription.
///
/// Deliberately not `Clone`: whoever holds the handle is the only party that
/// can give the subscription back via `BusClient::unsubscribe`.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    subscription: Subscription,
}

impl SubscriptionHandle {
    pub fn new(id: u64, subscription: Subscription) -> Self {
        Self { id, subscription }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

/// One-shot commands sent to a bricklet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    /// Period of a sensor's value callback; `0` disables it.
    SetCallbackPeriod { kind: DeviceKind, uid: Uid, period_ms: u32 },
    ClearDisplay { uid: Uid },
    BacklightOn { uid: Uid },
    BacklightOff { uid: Uid },
    IsBacklightOn { uid: Uid },
    WriteLine { uid: Uid, line: LcdTextLine },
    GetChipTemperature { uid: Uid },
    GetTemperature { uid: Uid },
}

impl Request {
    pub fn uid(&self) -> Uid {
        match self {
            Request::SetCallbackPeriod { uid, .. }
            | Request::ClearDisplay { uid }
            | Request::BacklightOn { uid }
            | Request::BacklightOff { uid }
            | Request::IsBacklightOn { uid }
            | Request::WriteLine { uid, .. }
            | Request::GetChipTemperature { uid }
            | Request::GetTemperature { uid } => *uid,
        }
    }

    /// Short command name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Request::SetCallbackPeriod { .. } => "set_callback_period",
            Request::ClearDisplay { .. } => "clear_display",
            Request::BacklightOn { .. } => "backlight_on",
            Request::BacklightOff { .. } => "backlight_off",
            Request::IsBacklightOn { .. } => "is_backlight_on",
            Request::WriteLine { .. } => "write_line",
            Request::GetChipTemperature { .. } => "get_chip_temperature",
            Request::GetTemperature { .. } => "get_temperature",
        }
    }
}

/// Answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum Response {
    /// The command was accepted and carries no data.
    Done,
    Backlight(bool),
    Reading(Reading),
}

/// Result of applying a presence update to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Subscribed,
    Unsubscribed,
    Unchanged,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared by every station crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StationError {
    /// The bus cannot be reached. Fatal at startup.
    #[error("Connection Error: {0}")]
    Connection(String),

    #[error("Subscription Error on {subscription}: {details}")]
    Subscription { subscription: String, details: String },

    #[error("Unknown device type: {0}")]
    UnknownType(u16),

    #[error("Sink Unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Stream Error: {0}")]
    Stream(String),

    #[error("Request Error on {request}: {details}")]
    Request { request: String, details: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Config Error: {0}")]
    Config(String),
}

impl StationError {
    pub fn subscription(subscription: &Subscription, details: impl Into<String>) -> Self {
        StationError::Subscription {
            subscription: subscription.to_string(),
            details: details.into(),
        }
    }

    pub fn request(request: &Request, details: impl Into<String>) -> Self {
        StationError::Request {
            request: request.name().to_string(),
            details: details.into(),
        }
    }
}
