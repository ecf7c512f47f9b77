//! WebSocket gateway client.
//!
//! [`GatewayClient`] speaks to a brick gateway that exposes the stack as
//! JSON text frames over a WebSocket. Every outbound frame carries an `id`;
//! the gateway answers with a `response` or `error` frame carrying the same
//! id, and pushes `delivery` frames tagged with the id of the `subscribe`
//! frame that registered the callback.
//!
//! ```text
//! → {"op":"subscribe","id":1,"subscription":{"callback":"enumerate"}}
//! ← {"op":"response","id":1,"response":{"result":"done"}}
//! ← {"op":"delivery","id":1,"payload":{"type":"enumeration","data":{…}}}
//! → {"op":"request","id":2,"request":{"command":"is_backlight_on","uid":"dXj"}}
//! ← {"op":"response","id":2,"response":{"result":"backlight","value":true}}
//! ```
//!
//! Each subscription gets its own forwarding task fed by an unbounded
//! queue, so a consumer that stops draining its bounded channel never
//! stalls the reader or the response frames behind it.
//!
//! The client does not reconnect. When the socket closes every pending
//! request fails and every handler is dropped, which ends the station's
//! consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use station_types::{
    Delivery, Payload, Request, Response, StationError, Subscription, SubscriptionHandle,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::client::BusClient;
use crate::delivery::DeliverySender;

/// How long a request waits for its response frame.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum OutboundFrame {
    Subscribe { id: u64, subscription: Subscription },
    Unsubscribe { id: u64, subscription_id: u64 },
    Request { id: u64, request: Request },
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum InboundFrame {
    Delivery { id: u64, payload: Payload },
    Response { id: u64, response: Response },
    Error { id: u64, message: String },
}

type Pending = oneshot::Sender<Result<Response, String>>;

#[derive(Default)]
struct Routing {
    pending: HashMap<u64, Pending>,
    handlers: HashMap<u64, mpsc::UnboundedSender<Delivery>>,
    closed: bool,
}

impl Routing {
    /// Route deliveries tagged `id` to `handler` through a forwarding task.
    ///
    /// The task ends once the queue entry is removed and drained, or when
    /// the consumer hangs up.
    fn forward(&mut self, id: u64, handler: DeliverySender) {
        let (queue, mut queued) = mpsc::unbounded_channel::<Delivery>();
        tokio::spawn(async move {
            while let Some(delivery) = queued.recv().await {
                if handler.send(delivery).await.is_err() {
                    debug!(id, "subscription consumer gone");
                    break;
                }
            }
        });
        self.handlers.insert(id, queue);
    }
}

fn lock(routing: &Mutex<Routing>) -> MutexGuard<'_, Routing> {
    routing.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bus client backed by a WebSocket gateway.
pub struct GatewayClient {
    url: String,
    outbound: mpsc::UnboundedSender<Message>,
    routing: Arc<Mutex<Routing>>,
    next_id: AtomicU64,
    timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl GatewayClient {
    /// Connect to the gateway at `addr` (`host:port` or a full `ws://` URL).
    ///
    /// # Errors
    ///
    /// Returns [`StationError::Connection`] when the WebSocket handshake
    /// fails.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, StationError> {
        let url = gateway_url(addr);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StationError::Connection(format!("{url}: {e}")))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(error = %e, "gateway write failed");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let routing = Arc::new(Mutex::new(Routing::default()));
        let reader_routing = Arc::clone(&routing);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => route_inbound(&reader_routing, text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "gateway read failed");
                        break;
                    }
                }
            }
            close_routing(&reader_routing);
            info!("gateway connection closed");
        });

        info!(%url, "connected to gateway");
        Ok(Self {
            url,
            outbound,
            routing,
            next_id: AtomicU64::new(1),
            timeout,
            tasks: vec![writer, reader],
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `frame` and wait for the response frame with the same id.
    async fn round_trip(&self, id: u64, frame: &OutboundFrame) -> Result<Response, String> {
        let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
        let (tx, rx) = oneshot::channel();
        {
            let mut routing = lock(&self.routing);
            if routing.closed {
                return Err("connection closed".to_string());
            }
            routing.pending.insert(id, tx);
        }
        if self.outbound.send(Message::Text(text.into())).is_err() {
            lock(&self.routing).pending.remove(&id);
            return Err("connection closed".to_string());
        }
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("connection closed".to_string()),
            Err(_) => {
                lock(&self.routing).pending.remove(&id);
                Err(format!("timed out after {} ms", self.timeout.as_millis()))
            }
        }
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl BusClient for GatewayClient {
    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: DeliverySender,
    ) -> Result<SubscriptionHandle, StationError> {
        let id = self.next_id();
        // Register first: deliveries may follow the acknowledgement closely.
        lock(&self.routing).forward(id, handler);
        let frame = OutboundFrame::Subscribe {
            id,
            subscription: subscription.clone(),
        };
        match self.round_trip(id, &frame).await {
            Ok(_) => Ok(SubscriptionHandle::new(id, subscription)),
            Err(details) => {
                lock(&self.routing).handlers.remove(&id);
                Err(StationError::subscription(&subscription, details))
            }
        }
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), StationError> {
        let id = self.next_id();
        let frame = OutboundFrame::Unsubscribe {
            id,
            subscription_id: handle.id(),
        };
        self.round_trip(id, &frame)
            .await
            .map_err(|details| StationError::subscription(handle.subscription(), details))?;
        lock(&self.routing).handlers.remove(&handle.id());
        Ok(())
    }

    async fn request(&self, request: Request) -> Result<Response, StationError> {
        let id = self.next_id();
        let frame = OutboundFrame::Request {
            id,
            request: request.clone(),
        };
        self.round_trip(id, &frame)
            .await
            .map_err(|details| StationError::request(&request, details))
    }
}

/// `host:port` → `ws://host:port`; full URLs pass through.
pub fn gateway_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("ws://{addr}")
    }
}

fn route_inbound(routing: &Mutex<Routing>, text: &str) {
    let frame = match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "malformed gateway frame; dropped");
            return;
        }
    };

    match frame {
        InboundFrame::Delivery { id, payload } => {
            let routing = lock(routing);
            match routing.handlers.get(&id) {
                Some(queue) => {
                    let _ = queue.send(Ok(payload));
                }
                None => debug!(id, "delivery for unknown subscription"),
            }
        }
        InboundFrame::Response { id, response } => {
            if let Some(tx) = lock(routing).pending.remove(&id) {
                let _ = tx.send(Ok(response));
            }
        }
        InboundFrame::Error { id, message } => {
            let mut routing = lock(routing);
            if let Some(tx) = routing.pending.remove(&id) {
                let _ = tx.send(Err(message));
                return;
            }
            if let Some(queue) = routing.handlers.get(&id) {
                let err = StationError::Subscription {
                    subscription: format!("#{id}"),
                    details: message,
                };
                let _ = queue.send(Err(err));
            }
        }
    }
}

fn close_routing(routing: &Mutex<Routing>) {
    let mut routing = lock(routing);
    routing.closed = true;
    for (_, tx) in routing.pending.drain() {
        let _ = tx.send(Err("connection closed".to_string()));
    }
    routing.handlers.clear();
}
