//! Per-device-type behaviour attached to each registry slot.
//!
//! A [`DeviceBehavior`] tells the subscription state machine *what* to
//! install for its kind of bricklet and which follow-up commands to send
//! when a unit appears or disappears. The state machine itself stays
//! generic; drivers can be added without touching it.

use station_types::{DeviceKind, Request, Subscription, Uid};

/// Default callback period for the sensor bricklets.
pub const DEFAULT_PERIOD_MS: u32 = 1000;

/// Strategy object for one device kind.
///
/// Every request returned by [`setup_requests`][Self::setup_requests] and
/// [`teardown_requests`][Self::teardown_requests] must be idempotent; the
/// state machine may send them more than once over the lifetime of a unit.
pub trait DeviceBehavior: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// The callback to install for unit `uid`.
    fn subscription(&self, uid: Uid) -> Subscription;

    /// Requests sent, in order, right after the subscription was accepted.
    fn setup_requests(&self, uid: Uid) -> Vec<Request>;

    /// Requests sent, in order, right after the subscription was given back.
    fn teardown_requests(&self, _uid: Uid) -> Vec<Request> {
        Vec::new()
    }
}

/// LCD 20x4: listens for button presses, starts with a blank, lit display.
#[derive(Debug, Default, Clone, Copy)]
pub struct LcdBehavior;

impl DeviceBehavior for LcdBehavior {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Lcd20x4
    }

    fn subscription(&self, uid: Uid) -> Subscription {
        Subscription::ButtonPressed(uid)
    }

    fn setup_requests(&self, uid: Uid) -> Vec<Request> {
        vec![Request::ClearDisplay { uid }, Request::BacklightOn { uid }]
    }
}

/// A sensor bricklet reporting its value through a periodic callback.
///
/// The period is enabled on attach and set back to zero on detach.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicSensor {
    kind: DeviceKind,
    callback: fn(Uid) -> Subscription,
    period_ms: u32,
}

impl PeriodicSensor {
    pub fn humidity(period_ms: u32) -> Self {
        Self {
            kind: DeviceKind::Humidity,
            callback: Subscription::HumidityPeriod,
            period_ms,
        }
    }

    pub fn ambient_light(period_ms: u32) -> Self {
        Self {
            kind: DeviceKind::AmbientLight,
            callback: Subscription::IlluminancePeriod,
            period_ms,
        }
    }

    pub fn barometer(period_ms: u32) -> Self {
        Self {
            kind: DeviceKind::Barometer,
            callback: Subscription::AirPressurePeriod,
            period_ms,
        }
    }

    pub fn temperature(period_ms: u32) -> Self {
        Self {
            kind: DeviceKind::Temperature,
            callback: Subscription::TemperaturePeriod,
            period_ms,
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    fn period_request(&self, uid: Uid, period_ms: u32) -> Request {
        Request::SetCallbackPeriod {
            kind: self.kind,
            uid,
            period_ms,
        }
    }
}

impl DeviceBehavior for PeriodicSensor {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn subscription(&self, uid: Uid) -> Subscription {
        (self.callback)(uid)
    }

    fn setup_requests(&self, uid: Uid) -> Vec<Request> {
        vec![self.period_request(uid, self.period_ms)]
    }

    fn teardown_requests(&self, uid: Uid) -> Vec<Request> {
        vec![self.period_request(uid, 0)]
    }
}

/// The behaviours of the weather station kit, one per supported kind.
pub fn weather_station_behaviors(period_ms: u32) -> Vec<Box<dyn DeviceBehavior>> {
    vec![
        Box::new(LcdBehavior),
        Box::new(PeriodicSensor::humidity(period_ms)),
        Box::new(PeriodicSensor::barometer(period_ms)),
        Box::new(PeriodicSensor::ambient_light(period_ms)),
        Box::new(PeriodicSensor::temperature(period_ms)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcd_clears_then_lights_up() {
        let uid = Uid::new(212);
        let lcd = LcdBehavior;
        assert_eq!(lcd.subscription(uid), Subscription::ButtonPressed(uid));
        assert_eq!(
            lcd.setup_requests(uid),
            vec![Request::ClearDisplay { uid }, Request::BacklightOn { uid }]
        );
        assert!(lcd.teardown_requests(uid).is_empty());
    }

    #[test]
    fn sensor_enables_and_disables_period() {
        let uid = Uid::new(27);
        let sensor = PeriodicSensor::humidity(DEFAULT_PERIOD_MS);
        assert_eq!(sensor.subscription(uid), Subscription::HumidityPeriod(uid));
        assert_eq!(
            sensor.setup_requests(uid),
            vec![Request::SetCallbackPeriod {
                kind: DeviceKind::Humidity,
                uid,
                period_ms: 1000
            }]
        );
        assert_eq!(
            sensor.teardown_requests(uid),
            vec![Request::SetCallbackPeriod {
                kind: DeviceKind::Humidity,
                uid,
                period_ms: 0
            }]
        );
    }

    #[test]
    fn kit_covers_every_kind_once() {
        let kinds: Vec<DeviceKind> = weather_station_behaviors(500)
            .iter()
            .map(|b| b.kind())
            .collect();
        for kind in DeviceKind::ALL {
            assert_eq!(kinds.iter().filter(|k| **k == kind).count(), 1);
        }
    }

    #[test]
    fn barometer_subscribes_to_air_pressure() {
        let uid = Uid::new(221);
        assert_eq!(
            PeriodicSensor::barometer(1000).subscription(uid),
            Subscription::AirPressurePeriod(uid)
        );
    }
}
