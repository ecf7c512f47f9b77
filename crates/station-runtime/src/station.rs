//! [`Station`] – start and orderly shutdown of the whole engine.
//!
//! # Startup
//!
//! 1. Subscribe to enumeration; the stack announces every attached device.
//! 2. Spawn the [`EnumerationListener`].
//! 3. Spawn the reading pump, which routes each reading on its own task.
//!
//! # Shutdown
//!
//! 1. Signal the listener and the pump to stop.
//! 2. Switch the LCD backlight off if a display is attached.
//! 3. Release every present slot, including its teardown requests.
//! 4. Release the enumeration subscription.
//! 5. Give in-flight router tasks [`SHUTDOWN_GRACE`] to finish, then abort
//!    the rest.

use std::time::Duration;

use station_bus::{EnumerationFeed, FEED_CAPACITY, ReadingStream};
use station_types::{DeviceKind, StationError, Subscription, SubscriptionHandle};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::context::StationContext;
use crate::listener::EnumerationListener;
use crate::router::{RouteOutcome, Router};

/// How long in-flight dispatches may run after the slots were released.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub struct Station {
    ctx: StationContext,
    enumerate: SubscriptionHandle,
    stop: watch::Sender<bool>,
    listener: JoinHandle<usize>,
    pump: JoinHandle<JoinSet<RouteOutcome>>,
}

impl Station {
    /// Subscribe to enumeration and start routing readings from `readings`,
    /// the stream paired with `ctx` by [`StationContext::channel`].
    pub async fn start(ctx: StationContext, readings: ReadingStream) -> Result<Self, StationError> {
        let (feed_tx, feed) = EnumerationFeed::channel(FEED_CAPACITY);
        let enumerate = ctx.bus.subscribe(Subscription::Enumerate, feed_tx).await?;
        info!(
            echo = ctx.config.console_echo,
            period_ms = ctx.config.callback_period_ms,
            "station started"
        );

        let (stop, shutdown) = watch::channel(false);
        let listener = tokio::spawn(
            EnumerationListener::new(ctx.clone(), feed, shutdown.clone()).run(),
        );
        let pump = tokio::spawn(pump(Router::new(ctx.clone()), readings, shutdown));

        Ok(Self {
            ctx,
            enumerate,
            stop,
            listener,
            pump,
        })
    }

    pub fn context(&self) -> &StationContext {
        &self.ctx
    }

    /// Stop everything and hand every subscription back to the bus.
    ///
    /// Failures along the way are logged; shutdown always runs to the end.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.listener.await {
            error!(error = %e, "enumeration listener panicked");
        }
        let mut in_flight = match self.pump.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "reading pump panicked");
                JoinSet::new()
            }
        };

        let ctx = &self.ctx;
        if ctx.registry.is_present(DeviceKind::Lcd20x4) {
            if let Err(e) = ctx.display.backlight_off().await {
                warn!(error = %e, "backlight off failed");
            }
        }
        for slot in ctx.registry.slots() {
            if let Err(e) = slot.release(ctx.bus.as_ref()).await {
                warn!(kind = %slot.kind(), error = %e, "release failed");
            }
        }
        if let Err(e) = ctx.bus.unsubscribe(&self.enumerate).await {
            warn!(error = %e, "enumeration release failed");
        }

        let pending = in_flight.len();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!(pending = in_flight.len(), "aborting in-flight dispatches");
            in_flight.abort_all();
        }
        info!(pending, "station stopped");
    }
}

async fn pump(
    router: Router,
    mut readings: ReadingStream,
    mut shutdown: watch::Receiver<bool>,
) -> JoinSet<RouteOutcome> {
    let mut tasks = JoinSet::new();
    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = done {
                    warn!(error = %e, "router task failed");
                }
            }
            next = readings.recv() => match next {
                Some(reading) => router.spawn(&mut tasks, reading),
                None => break,
            },
        }
    }
    readings.close();
    tasks
}
