//! The subscription state machine.
//!
//! Each presence notification for a slot lands in exactly one of three
//! outcomes:
//!
//! | Slot | Notification | Action | Result |
//! |---|---|---|---|
//! | absent | present | subscribe, then setup requests | `Subscribed` |
//! | present | absent | unsubscribe, then teardown requests | `Unsubscribed` |
//! | absent | absent | nothing | `Unchanged` |
//! | present | present | nothing, recorded uid kept | `Unchanged` |
//!
//! A notification carrying uid zero always counts as absent. The slot only
//! changes state once the bus accepted the (un)subscribe, so a failed call
//! leaves it where it was and the next notification retries. Failures of
//! setup or teardown requests are logged and never roll a transition back.

use station_bus::{BusClient, DeliverySender};
use station_types::{Request, StationError, Transition, Uid};
use tracing::{debug, info, instrument, warn};

use crate::slot::{DeviceSlot, SlotState};

impl DeviceSlot {
    /// Apply one presence notification for this slot.
    ///
    /// Readings of the installed subscription are delivered to `handler`.
    #[instrument(skip(self, bus, handler), fields(kind = %self.kind()))]
    pub async fn apply_presence(
        &self,
        bus: &dyn BusClient,
        handler: &DeliverySender,
        uid: Uid,
        is_present: bool,
    ) -> Result<Transition, StationError> {
        let is_present = is_present && uid.is_valid();
        let mut state = self.state.lock().await;

        match (state.present, is_present) {
            (false, true) => self.attach(&mut state, bus, handler, uid).await,
            (true, false) => self.detach(&mut state, bus).await,
            (true, true) => {
                if state.uid != uid {
                    debug!(recorded = %state.uid, announced = %uid, "second unit ignored");
                }
                Ok(Transition::Unchanged)
            }
            (false, false) => Ok(Transition::Unchanged),
        }
    }

    /// Give back the subscription of a present slot. Used at shutdown.
    pub async fn release(&self, bus: &dyn BusClient) -> Result<Transition, StationError> {
        let mut state = self.state.lock().await;
        if state.present {
            self.detach(&mut state, bus).await
        } else {
            Ok(Transition::Unchanged)
        }
    }

    async fn attach(
        &self,
        state: &mut SlotState,
        bus: &dyn BusClient,
        handler: &DeliverySender,
        uid: Uid,
    ) -> Result<Transition, StationError> {
        let subscription = match state.subscription.take() {
            Some(previous) => previous.rebind(uid),
            None => self.behavior.subscription(uid),
        };
        state.subscription = Some(subscription.clone());

        let handle = bus.subscribe(subscription, handler.clone()).await?;
        state.present = true;
        state.uid = uid;
        state.handle = Some(handle);
        self.publish(state);
        info!(%uid, "subscribed");

        send_all(bus, self.behavior.setup_requests(uid)).await;
        Ok(Transition::Subscribed)
    }

    async fn detach(
        &self,
        state: &mut SlotState,
        bus: &dyn BusClient,
    ) -> Result<Transition, StationError> {
        let uid = state.uid;
        if let Some(handle) = &state.handle {
            bus.unsubscribe(handle).await?;
        }
        state.handle = None;
        state.present = false;
        state.uid = Uid::NONE;
        self.publish(state);
        info!(%uid, "unsubscribed");

        send_all(bus, self.behavior.teardown_requests(uid)).await;
        Ok(Transition::Unsubscribed)
    }
}

async fn send_all(bus: &dyn BusClient, requests: Vec<Request>) {
    for request in requests {
        let name = request.name();
        if let Err(e) = bus.request(request).await {
            warn!(request = name, error = %e, "device request failed");
        }
    }
}
