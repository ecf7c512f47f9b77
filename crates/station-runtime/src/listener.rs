//! [`EnumerationListener`] – feeds presence notifications to the registry.
//!
//! One long-lived task consumes the `Enumerate` feed strictly in arrival
//! order and applies each notice to the slot of its device kind. A notice
//! that cannot be applied is logged and dropped; the loop only ends on
//! shutdown or when the feed closes.

use station_bus::EnumerationFeed;
use station_types::{Enumeration, StationError, Transition};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::context::StationContext;

pub struct EnumerationListener {
    ctx: StationContext,
    feed: EnumerationFeed,
    shutdown: watch::Receiver<bool>,
}

impl EnumerationListener {
    pub fn new(ctx: StationContext, feed: EnumerationFeed, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            ctx,
            feed,
            shutdown,
        }
    }

    /// Consume notices until shutdown is signalled or the feed closes.
    /// Returns the number of notices handled.
    pub async fn run(mut self) -> usize {
        let mut handled = 0;
        while !*self.shutdown.borrow() {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                next = self.feed.recv() => {
                    let Some(enumeration) = next else {
                        debug!("enumeration feed closed");
                        break;
                    };
                    handled += 1;
                    match apply(&self.ctx, &enumeration).await {
                        Ok(Transition::Unchanged) => {}
                        Ok(transition) => debug!(?transition, "slot changed"),
                        Err(StationError::UnknownType(id)) => {
                            debug!(device_identifier = id, uid = %enumeration.uid, "unsupported device ignored");
                        }
                        Err(e) => warn!(error = %e, "presence update failed"),
                    }
                }
            }
        }
        self.feed.close();
        info!(handled, "enumeration listener stopped");
        handled
    }
}

/// Apply one notice to its slot.
#[instrument(skip(ctx, enumeration), fields(
    device_identifier = enumeration.device_identifier,
    uid = %enumeration.uid,
    kind = ?enumeration.enumeration_type,
))]
pub async fn apply(
    ctx: &StationContext,
    enumeration: &Enumeration,
) -> Result<Transition, StationError> {
    let slot = ctx.registry.get_by_identifier(enumeration.device_identifier)?;
    slot.apply_presence(
        ctx.bus.as_ref(),
        &ctx.readings,
        enumeration.effective_uid(),
        !enumeration.is_disconnected(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use station_bus::sim::SimBus;
    use station_bus::{BusClient, FEED_CAPACITY};
    use station_types::{DeviceKind, EnumerationType, Payload, Subscription, Uid};

    use super::*;
    use crate::context::StationConfig;

    fn notice(kind: DeviceKind, uid: u32, enumeration_type: EnumerationType) -> Enumeration {
        Enumeration::new(kind.identifier(), Uid::new(uid), enumeration_type)
    }

    #[tokio::test]
    async fn connected_then_disconnected() {
        let bus = Arc::new(SimBus::new());
        let (ctx, _readings) = StationContext::channel(bus.clone(), StationConfig::default());

        let t = apply(&ctx, &notice(DeviceKind::Humidity, 27, EnumerationType::Connected))
            .await
            .unwrap();
        assert_eq!(t, Transition::Subscribed);
        let t = apply(&ctx, &notice(DeviceKind::Humidity, 27, EnumerationType::Disconnected))
            .await
            .unwrap();
        assert_eq!(t, Transition::Unsubscribed);
        assert!(bus.active_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn unknown_device_is_reported() {
        let bus = Arc::new(SimBus::new());
        let (ctx, _readings) = StationContext::channel(bus, StationConfig::default());
        let stepper = Enumeration::new(19, Uid::new(5), EnumerationType::Available);
        assert_eq!(
            apply(&ctx, &stepper).await.unwrap_err(),
            StationError::UnknownType(19)
        );
    }

    #[tokio::test]
    async fn run_survives_bad_notices_and_stops_on_shutdown() {
        let bus = Arc::new(SimBus::new());
        let (ctx, _readings) = StationContext::channel(bus.clone(), StationConfig::default());
        let (tx, feed) = EnumerationFeed::channel(FEED_CAPACITY);
        let (stop, shutdown) = watch::channel(false);
        let registry = ctx.registry.clone();
        let task = tokio::spawn(EnumerationListener::new(ctx, feed, shutdown).run());

        let stepper = Enumeration::new(19, Uid::new(5), EnumerationType::Available);
        tx.send(Ok(Payload::Enumeration(stepper))).await.unwrap();
        tx.send(Err(StationError::Stream("garbled".into()))).await.unwrap();
        let barometer = notice(DeviceKind::Barometer, 221, EnumerationType::Available);
        tx.send(Ok(Payload::Enumeration(barometer))).await.unwrap();

        for _ in 0..100 {
            if registry.is_present(DeviceKind::Barometer) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(registry.is_present(DeviceKind::Barometer));
        assert_eq!(
            bus.active_subscriptions(),
            vec![Subscription::AirPressurePeriod(Uid::new(221))]
        );

        stop.send(true).unwrap();
        let handled = task.await.unwrap();
        assert_eq!(handled, 2);
    }

    #[tokio::test]
    async fn run_ends_when_feed_closes() {
        let bus = Arc::new(SimBus::new().with_device(DeviceKind::Lcd20x4, Uid::new(212)));
        let (ctx, _readings) = StationContext::channel(bus.clone(), StationConfig::default());
        let (tx, feed) = EnumerationFeed::channel(FEED_CAPACITY);
        let (_stop, shutdown) = watch::channel(false);
        let handle = bus.subscribe(Subscription::Enumerate, tx).await.unwrap();
        let registry = ctx.registry.clone();
        let task = tokio::spawn(EnumerationListener::new(ctx, feed, shutdown).run());

        for _ in 0..100 {
            if registry.is_present(DeviceKind::Lcd20x4) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bus.unsubscribe(&handle).await.unwrap();
        assert_eq!(task.await.unwrap(), 1);
        assert!(registry.is_present(DeviceKind::Lcd20x4));
    }
}
