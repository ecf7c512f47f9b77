//! [`DeviceSlot`] – subscription state for one device kind.
//!
//! A slot has a single writer, the subscription state machine in
//! [`presence`][crate::presence], which serialises transitions through an
//! async mutex. Everybody else reads the last published [`SlotSnapshot`],
//! which never waits on bus I/O.

use std::sync::{PoisonError, RwLock};

use station_types::{DeviceKind, Subscription, SubscriptionHandle, Uid};
use tokio::sync::Mutex;

use crate::behavior::DeviceBehavior;

/// What readers may know about a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub present: bool,
    /// [`Uid::NONE`] unless `present`.
    pub uid: Uid,
}

pub(crate) struct SlotState {
    pub(crate) present: bool,
    pub(crate) uid: Uid,
    /// Built on first attach and rebound on later ones.
    pub(crate) subscription: Option<Subscription>,
    /// `Some` exactly while a subscribe has been accepted and not reversed.
    pub(crate) handle: Option<SubscriptionHandle>,
}

/// One managed device kind.
pub struct DeviceSlot {
    pub(crate) behavior: Box<dyn DeviceBehavior>,
    pub(crate) state: Mutex<SlotState>,
    published: RwLock<SlotSnapshot>,
}

impl DeviceSlot {
    pub fn new(behavior: Box<dyn DeviceBehavior>) -> Self {
        Self {
            behavior,
            state: Mutex::new(SlotState {
                present: false,
                uid: Uid::NONE,
                subscription: None,
                handle: None,
            }),
            published: RwLock::new(SlotSnapshot::default()),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.behavior.kind()
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        *self.published.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_present(&self) -> bool {
        self.snapshot().present
    }

    /// The unit currently attached, if any.
    pub fn uid(&self) -> Option<Uid> {
        let snapshot = self.snapshot();
        snapshot.present.then_some(snapshot.uid)
    }

    /// Whether the slot currently owns a subscription handle. Waits for an
    /// in-flight transition to finish.
    pub async fn has_handle(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    pub(crate) fn publish(&self, state: &SlotState) {
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = SlotSnapshot {
            present: state.present,
            uid: state.uid,
        };
    }
}

impl std::fmt::Debug for DeviceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSlot")
            .field("kind", &self.kind())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
