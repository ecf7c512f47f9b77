//! Bounded delivery channels between bus handlers and station consumers.
//!
//! A subscription handler is just the sending half of a Tokio `mpsc`
//! channel. The receiving half is wrapped in a typed consumer that filters
//! out what it cannot use:
//!
//! | Consumer | Yields | Typical source |
//! |---|---|---|
//! | [`EnumerationFeed`] | [`Enumeration`] | the `Enumerate` subscription |
//! | [`ReadingStream`] | [`Reading`] | sensor and button subscriptions |

use station_types::{Delivery, Enumeration, Payload, Reading};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the presence notification queue.
pub const FEED_CAPACITY: usize = 4;

/// Capacity of the shared reading queue.
pub const READING_CAPACITY: usize = 64;

/// The handler half handed to [`BusClient::subscribe`][crate::BusClient::subscribe].
pub type DeliverySender = mpsc::Sender<Delivery>;

/// Presence notifications, in arrival order.
pub struct EnumerationFeed {
    receiver: mpsc::Receiver<Delivery>,
}

impl EnumerationFeed {
    /// Create a feed with the given queue capacity and the handler that
    /// fills it.
    pub fn channel(capacity: usize) -> (DeliverySender, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }

    /// Wait for the next enumeration notice.
    ///
    /// Error deliveries and non-enumeration payloads are logged and skipped.
    /// Returns `None` once every handler has been dropped or the feed was
    /// closed.
    pub async fn recv(&mut self) -> Option<Enumeration> {
        loop {
            match self.receiver.recv().await? {
                Ok(Payload::Enumeration(e)) => return Some(e),
                Ok(Payload::Reading(r)) => {
                    warn!(reading = ?r, "reading delivered on the enumeration feed; dropped");
                }
                Err(e) => {
                    warn!(error = %e, "enumeration delivery failed; dropped");
                }
            }
        }
    }

    /// Stop accepting new notices. Already queued notices can still be
    /// drained with [`recv`][Self::recv].
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Readings from every sensor subscription, merged.
pub struct ReadingStream {
    receiver: mpsc::Receiver<Delivery>,
}

impl ReadingStream {
    pub fn channel(capacity: usize) -> (DeliverySender, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }

    /// Wait for the next reading; error deliveries are logged and skipped.
    pub async fn recv(&mut self) -> Option<Reading> {
        loop {
            match self.receiver.recv().await? {
                Ok(Payload::Reading(r)) => return Some(r),
                Ok(Payload::Enumeration(e)) => {
                    debug!(uid = %e.uid, "enumeration delivered on the reading stream; dropped");
                }
                Err(e) => {
                    warn!(error = %e, "reading delivery failed; dropped");
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}
