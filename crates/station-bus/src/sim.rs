//! In-process simulated brick stack.
//!
//! [`SimBus`] implements [`BusClient`] without touching real hardware. It
//! records every call in a journal, keeps just enough device state to answer
//! requests (backlight, callback periods, temperatures) and lets callers
//! inject presence changes and readings. The test suites use it as their bus
//! double; `weatherstation --simulate` runs the whole station against it.
//!
//! # Stub behaviour
//!
//! | Call | Behaviour |
//! |---|---|
//! | `subscribe(Enumerate)` | Announces every attached device as `Available`. |
//! | `request(SetCallbackPeriod)` | Stores the period; `0` removes it. |
//! | `request(IsBacklightOn)` | Answers the last backlight command (default off). |
//! | `request(GetChipTemperature)` | Answers the configured chip temperature. |
//! | anything else | Succeeds with [`Response::Done`]. |
//!
//! # Example
//!
//! ```rust
//! use station_bus::sim::SimBus;
//! use station_types::{DeviceKind, Uid};
//!
//! let bus = SimBus::new()
//!     .with_device(DeviceKind::Lcd20x4, Uid::new(212))
//!     .with_device(DeviceKind::Humidity, Uid::new(27));
//! assert!(bus.journal().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use station_types::{
    DeviceKind, Enumeration, EnumerationType, Payload, Reading, Request, Response, StationError,
    Subscription, SubscriptionHandle, Uid,
};
use tracing::{debug, info};

use crate::client::BusClient;
use crate::delivery::DeliverySender;

/// One call made against the simulated stack, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    Request(Request),
}

struct SimState {
    devices: Vec<(DeviceKind, Uid)>,
    subscriptions: HashMap<u64, (Subscription, DeliverySender)>,
    journal: Vec<BusCall>,
    periods: HashMap<(DeviceKind, Uid), u32>,
    backlight: HashMap<Uid, bool>,
    chip_temperature: f64,
    temperature: f64,
    reject_subscribe: bool,
    reject_unsubscribe: bool,
    reject_requests: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            subscriptions: HashMap::new(),
            journal: Vec::new(),
            periods: HashMap::new(),
            backlight: HashMap::new(),
            chip_temperature: 24.5,
            temperature: 21.5,
            reject_subscribe: false,
            reject_unsubscribe: false,
            reject_requests: false,
        }
    }
}

/// Simulated brick stack. Share it behind an `Arc`.
#[derive(Default)]
pub struct SimBus {
    state: Mutex<SimState>,
    next_id: AtomicU64,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device before anyone has subscribed. It is announced to
    /// each `Enumerate` subscriber.
    pub fn with_device(self, kind: DeviceKind, uid: Uid) -> Self {
        self.state().devices.push((kind, uid));
        self
    }

    /// The full simulated weather station kit.
    pub fn weather_station_kit() -> Self {
        DeviceKind::ALL
            .into_iter()
            .fold(Self::new(), |bus, kind| {
                bus.with_device(kind, Uid::new(10_000 + u32::from(kind.identifier())))
            })
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Stack-side events
    // -----------------------------------------------------------------------

    /// Plug a device in while the station is running.
    pub async fn attach(&self, kind: DeviceKind, uid: Uid) -> usize {
        self.state().devices.push((kind, uid));
        self.announce(Enumeration::new(kind.identifier(), uid, EnumerationType::Connected))
            .await
    }

    /// Unplug a device while the station is running.
    pub async fn detach(&self, kind: DeviceKind, uid: Uid) -> usize {
        self.state().devices.retain(|d| *d != (kind, uid));
        self.announce(Enumeration::new(kind.identifier(), uid, EnumerationType::Disconnected))
            .await
    }

    /// Send an arbitrary enumeration notice to every `Enumerate` subscriber.
    /// Returns the number of handlers that accepted it.
    pub async fn announce(&self, enumeration: Enumeration) -> usize {
        let handlers = self.handlers_where(|sub| *sub == Subscription::Enumerate);
        deliver(handlers, Payload::Enumeration(enumeration)).await
    }

    /// Emit a reading from unit `uid` to every subscription that accepts it.
    pub async fn emit(&self, uid: Uid, reading: Reading) -> usize {
        let handlers = self.handlers_where(|sub| sub.accepts(uid, &reading));
        deliver(handlers, Payload::Reading(reading)).await
    }

    /// Produce periodic readings for every enabled callback period until the
    /// stack is dropped by all other owners.
    pub async fn run_sensors(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        let mut last_emit: HashMap<(DeviceKind, Uid), Instant> = HashMap::new();
        let started = Instant::now();
        info!(tick_ms = tick.as_millis() as u64, "simulated sensors running");

        loop {
            interval.tick().await;
            if Arc::strong_count(&self) == 1 {
                break;
            }
            let due: Vec<(DeviceKind, Uid)> = {
                let state = self.state();
                state
                    .periods
                    .iter()
                    .filter(|(key, period)| {
                        last_emit.get(*key).is_none_or(|t| {
                            t.elapsed() >= Duration::from_millis(u64::from(**period))
                        })
                    })
                    .map(|(key, _)| *key)
                    .collect()
            };
            let t = started.elapsed().as_secs_f64();
            for (kind, uid) in due {
                last_emit.insert((kind, uid), Instant::now());
                if let Some(reading) = synthetic_reading(kind, t) {
                    self.emit(uid, reading).await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inspection and fault injection
    // -----------------------------------------------------------------------

    /// Every call made so far.
    pub fn journal(&self) -> Vec<BusCall> {
        self.state().journal.clone()
    }

    /// Only the one-shot requests made so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state()
            .journal
            .iter()
            .filter_map(|c| match c {
                BusCall::Request(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn active_subscriptions(&self) -> Vec<Subscription> {
        self.state()
            .subscriptions
            .values()
            .map(|(sub, _)| sub.clone())
            .collect()
    }

    /// Current callback period for a unit; `0` when disabled.
    pub fn callback_period(&self, kind: DeviceKind, uid: Uid) -> u32 {
        self.state().periods.get(&(kind, uid)).copied().unwrap_or(0)
    }

    pub fn backlight(&self, uid: Uid) -> bool {
        self.state().backlight.get(&uid).copied().unwrap_or(false)
    }

    pub fn set_backlight(&self, uid: Uid, on: bool) {
        self.state().backlight.insert(uid, on);
    }

    pub fn set_chip_temperature(&self, celsius: f64) {
        self.state().chip_temperature = celsius;
    }

    /// Make every following `subscribe` fail.
    pub fn set_reject_subscribe(&self, reject: bool) {
        self.state().reject_subscribe = reject;
    }

    /// Make every following `unsubscribe` fail.
    pub fn set_reject_unsubscribe(&self, reject: bool) {
        self.state().reject_unsubscribe = reject;
    }

    /// Make every following one-shot request fail.
    pub fn set_reject_requests(&self, reject: bool) {
        self.state().reject_requests = reject;
    }

    fn handlers_where(&self, pred: impl Fn(&Subscription) -> bool) -> Vec<DeliverySender> {
        self.state()
            .subscriptions
            .values()
            .filter(|(sub, _)| pred(sub))
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

async fn deliver(handlers: Vec<DeliverySender>, payload: Payload) -> usize {
    let mut delivered = 0;
    for handler in handlers {
        if handler.send(Ok(payload.clone())).await.is_ok() {
            delivered += 1;
        }
    }
    delivered
}

fn synthetic_reading(kind: DeviceKind, t: f64) -> Option<Reading> {
    let wobble = (t / 30.0).sin();
    match kind {
        DeviceKind::Humidity => Some(Reading::Humidity(45.0 + 5.0 * wobble)),
        DeviceKind::AmbientLight => Some(Reading::Illuminance(250.0 + 40.0 * wobble)),
        DeviceKind::Barometer => Some(Reading::AirPressure(1013.25 + 2.0 * wobble)),
        DeviceKind::Temperature => Some(Reading::Temperature(21.5 + 0.5 * wobble)),
        DeviceKind::Lcd20x4 => None,
    }
}

#[async_trait]
impl BusClient for SimBus {
    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: DeliverySender,
    ) -> Result<SubscriptionHandle, StationError> {
        let (id, announce) = {
            let mut state = self.state();
            state.journal.push(BusCall::Subscribe(subscription.clone()));
            if state.reject_subscribe {
                return Err(StationError::subscription(
                    &subscription,
                    "rejected by simulated stack",
                ));
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            state
                .subscriptions
                .insert(id, (subscription.clone(), handler.clone()));
            let announce = if subscription == Subscription::Enumerate {
                state.devices.clone()
            } else {
                Vec::new()
            };
            (id, announce)
        };
        debug!(id, %subscription, "sim subscribe");

        // Announce from a separate task: the consumer of `handler` may not be
        // running yet and the queue is bounded.
        if !announce.is_empty() {
            tokio::spawn(async move {
                for (kind, uid) in announce {
                    let notice =
                        Enumeration::new(kind.identifier(), uid, EnumerationType::Available);
                    if handler.send(Ok(Payload::Enumeration(notice))).await.is_err() {
                        break;
                    }
                }
            });
        }
        Ok(SubscriptionHandle::new(id, subscription))
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), StationError> {
        let mut state = self.state();
        state
            .journal
            .push(BusCall::Unsubscribe(handle.subscription().clone()));
        if state.reject_unsubscribe {
            return Err(StationError::subscription(
                handle.subscription(),
                "rejected by simulated stack",
            ));
        }
        match state.subscriptions.remove(&handle.id()) {
            Some(_) => Ok(()),
            None => Err(StationError::subscription(
                handle.subscription(),
                "unknown subscription handle",
            )),
        }
    }

    async fn request(&self, request: Request) -> Result<Response, StationError> {
        let mut state = self.state();
        state.journal.push(BusCall::Request(request.clone()));
        if !request.uid().is_valid() {
            return Err(StationError::request(&request, "no device with uid 0"));
        }
        if state.reject_requests {
            return Err(StationError::request(&request, "rejected by simulated stack"));
        }
        let response = match request {
            Request::SetCallbackPeriod {
                kind,
                uid,
                period_ms,
            } => {
                if period_ms == 0 {
                    state.periods.remove(&(kind, uid));
                } else {
                    state.periods.insert((kind, uid), period_ms);
                }
                Response::Done
            }
            Request::BacklightOn { uid } => {
                state.backlight.insert(uid, true);
                Response::Done
            }
            Request::BacklightOff { uid } => {
                state.backlight.insert(uid, false);
                Response::Done
            }
            Request::IsBacklightOn { uid } => {
                Response::Backlight(state.backlight.get(&uid).copied().unwrap_or(false))
            }
            Request::GetChipTemperature { .. } => {
                Response::Reading(Reading::ChipTemperature(state.chip_temperature))
            }
            Request::GetTemperature { .. } => {
                Response::Reading(Reading::Temperature(state.temperature))
            }
            Request::ClearDisplay { .. } | Request::WriteLine { .. } => Response::Done,
        };
        Ok(response)
    }
}
