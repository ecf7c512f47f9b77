//! [`Registry`] – one [`DeviceSlot`] per supported device kind.
//!
//! The registry is built once at startup and shared read-only afterwards;
//! slots carry their own synchronisation. Lookups by raw device identifier
//! are how the enumeration listener finds its slot, and an identifier
//! without a slot is reported as [`StationError::UnknownType`].

use std::collections::HashMap;

use station_types::{DeviceKind, StationError, Uid};

use crate::behavior::{DeviceBehavior, weather_station_behaviors};
use crate::slot::{DeviceSlot, SlotSnapshot};

#[derive(Debug, Default)]
pub struct Registry {
    slots: HashMap<DeviceKind, DeviceSlot>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the weather station kit with every sensor reporting
    /// each `period_ms`.
    pub fn weather_station(period_ms: u32) -> Self {
        let mut registry = Self::new();
        for behavior in weather_station_behaviors(period_ms) {
            registry.register(behavior);
        }
        registry
    }

    /// Register a behaviour. Any slot previously registered for the same
    /// kind is replaced.
    pub fn register(&mut self, behavior: Box<dyn DeviceBehavior>) {
        let kind = behavior.kind();
        self.slots.insert(kind, DeviceSlot::new(behavior));
    }

    pub fn get(&self, kind: DeviceKind) -> Result<&DeviceSlot, StationError> {
        self.slots
            .get(&kind)
            .ok_or(StationError::UnknownType(kind.identifier()))
    }

    /// Resolve a raw device identifier as announced on the bus.
    pub fn get_by_identifier(&self, identifier: u16) -> Result<&DeviceSlot, StationError> {
        DeviceKind::from_identifier(identifier)
            .and_then(|kind| self.slots.get(&kind))
            .ok_or(StationError::UnknownType(identifier))
    }

    /// Last published state of a slot; absent for unregistered kinds.
    pub fn snapshot(&self, kind: DeviceKind) -> SlotSnapshot {
        self.slots
            .get(&kind)
            .map(DeviceSlot::snapshot)
            .unwrap_or_default()
    }

    pub fn is_present(&self, kind: DeviceKind) -> bool {
        self.snapshot(kind).present
    }

    /// Uid of the attached unit of `kind`, if any.
    pub fn uid(&self, kind: DeviceKind) -> Option<Uid> {
        self.slots.get(&kind).and_then(DeviceSlot::uid)
    }

    pub fn slots(&self) -> impl Iterator<Item = &DeviceSlot> {
        self.slots.values()
    }

    /// Kinds whose slot is currently present, in [`DeviceKind::ALL`] order.
    pub fn present_kinds(&self) -> Vec<DeviceKind> {
        DeviceKind::ALL
            .into_iter()
            .filter(|kind| self.is_present(*kind))
            .collect()
    }
}
