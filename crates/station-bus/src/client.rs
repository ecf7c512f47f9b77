//! The bus client seam.
//!
//! The station never talks to a brick daemon directly. Everything it needs
//! from the stack goes through [`BusClient`], so the simulated stack
//! ([`SimBus`][crate::sim::SimBus]) and the WebSocket gateway
//! ([`GatewayClient`][crate::gateway::GatewayClient]) are interchangeable.

use async_trait::async_trait;
use station_types::{Request, Response, StationError, Subscription, SubscriptionHandle};

use crate::delivery::DeliverySender;

/// Every bus transport must implement this trait.
///
/// # Contract
///
/// * `subscribe` – registers a callback. Deliveries for it are pushed to
///   `handler` asynchronously, zero or more times, until the subscription is
///   given back.
/// * `unsubscribe` – reverses a subscription. On error the caller keeps the
///   handle so it can try again later.
/// * `request` – a one-shot command with a single response.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: DeliverySender,
    ) -> Result<SubscriptionHandle, StationError>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), StationError>;

    async fn request(&self, request: Request) -> Result<Response, StationError>;
}
