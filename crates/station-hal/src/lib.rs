//! # station-hal
//!
//! Device-side state of the weather station.
//!
//! | Module | Contents |
//! |---|---|
//! | [`behavior`] | per-kind subscribe/setup/teardown strategies |
//! | [`slot`] | [`DeviceSlot`] and its published [`SlotSnapshot`] |
//! | [`presence`] | the subscription state machine on [`DeviceSlot`] |
//! | [`registry`] | [`Registry`], the slot arena keyed by device kind |
//! | [`sink`] | display and console sinks |

pub mod behavior;
pub mod presence;
pub mod registry;
pub mod sink;
pub mod slot;

pub use behavior::{
    DEFAULT_PERIOD_MS, DeviceBehavior, LcdBehavior, PeriodicSensor, weather_station_behaviors,
};
pub use registry::Registry;
pub use sink::{ConsoleSink, DisplaySink, LcdDisplay, StreamConsole};
pub use slot::{DeviceSlot, SlotSnapshot};
