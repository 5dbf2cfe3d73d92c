//! Client-side service for the tandem real-time messaging gateway.
//!
//! [`ChatClient`] is an explicitly constructed, dependency-injected handle
//! with an explicit lifecycle: create it at session start with
//! [`ChatClient::start`], pass it by reference to consumers, and tear it down
//! at logout with [`ChatClient::shutdown`]. It owns exactly one transport
//! loop; reconnection, re-authentication, heartbeats and the typing quiet
//! period are handled internally.
//!
//! ```rust,ignore
//! let connector = WsConnector::new("wss://tandem.example/ws");
//! let (client, mut events) = ChatClient::start(connector, ClientConfig::new(token));
//!
//! client.join_room("P1")?;
//! client.send_text("P1", "hello")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChatEvent::Event(ServerEvent::NewMessage { message }) => { /* … */ }
//!         ChatEvent::ConnectionFailed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod transport;

pub use client::{ChatClient, ClientConfig, ReconnectPolicy};
pub use error::ClientError;
pub use events::{ChatEvent, EventBus, Subscription, SubscriptionToken};
pub use transport::{Connector, Transport, WsConnector, WsTransport};
