//! `station-bus` – the station's view of the brick stack.
//!
//! Routes requests and callback deliveries between the station and the
//! hardware without caring what the readings mean.
//!
//! # Modules
//!
//! - [`client`] – the [`BusClient`] trait every transport implements.
//! - [`delivery`] – bounded delivery channels and the typed consumers built
//!   on them ([`EnumerationFeed`], [`ReadingStream`]).
//! - [`sim`] – [`SimBus`], an in-process simulated stack used by tests and
//!   by `weatherstation --simulate`.
//! - [`gateway`] – [`GatewayClient`], JSON frames over a WebSocket.

pub mod client;
pub mod delivery;
pub mod gateway;
pub mod sim;

pub use client::BusClient;
pub use delivery::{DeliverySender, EnumerationFeed, FEED_CAPACITY, READING_CAPACITY, ReadingStream};
pub use gateway::GatewayClient;
pub use sim::{BusCall, SimBus};
