use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use tandem_types::events::ServerEvent;

/// Everything a consumer can observe from the client: connection lifecycle
/// plus the server's event stream.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Transport established and identity re-announced. `attempt` is 0 for
    /// the initial connect and counts reconnects within an outage after that.
    Connected { attempt: u32 },

    /// The transport dropped. The client reconnects on its own unless the
    /// disconnect was client-initiated.
    Disconnected { reason: Option<String> },

    /// The reconnect cap was exceeded; the client gave up. Terminal.
    ConnectionFailed { attempts: u32 },

    /// An event from the server.
    Event(ServerEvent),
}

/// Handle for cancelling a subscription explicitly. Dropping the
/// [`Subscription`] has the same effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

/// Multi-subscriber event fan-out.
///
/// Every subscriber receives every event; slow subscribers buffer
/// independently and never block the transport loop or each other.
/// Unsubscribing (by token or by drop) detaches cleanly, so components that
/// come and go — UI views, in particular — cannot leak dead observers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<ChatEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        Subscription {
            token: SubscriptionToken(id),
            rx,
            bus: self.clone(),
        }
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .remove(&token.0);
    }

    pub(crate) fn publish(&self, event: ChatEvent) {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        // Prune subscribers whose receiving half is gone
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .len()
    }
}

/// One subscriber's view of the event stream.
pub struct Subscription {
    token: SubscriptionToken,
    rx: mpsc::UnboundedReceiver<ChatEvent>,
    bus: EventBus,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }

    pub fn token(&self) -> SubscriptionToken {
        self.token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(ChatEvent::Connected { attempt: 0 });

        assert!(matches!(
            a.recv().await,
            Some(ChatEvent::Connected { attempt: 0 })
        ));
        assert!(matches!(
            b.recv().await,
            Some(ChatEvent::Connected { attempt: 0 })
        ));
    }

    #[tokio::test]
    async fn explicit_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let token = sub.token();

        bus.publish(ChatEvent::Connected { attempt: 0 });
        assert!(sub.try_recv().is_some() || sub.recv().await.is_some());

        bus.unsubscribe(token);
        bus.publish(ChatEvent::Connected { attempt: 1 });
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_a_subscription_detaches_it() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        // Publishing with no subscribers is fine
        bus.publish(ChatEvent::Disconnected { reason: None });
    }
}
