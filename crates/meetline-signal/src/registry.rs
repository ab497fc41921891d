//! Connection registry for the signal relay
//!
//! Maps each live connection id to the queue feeding its socket writer.
//! Owned by the server and shared with every connection task.

use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use meetline_core::{ConnectionId, RelayError};

use crate::messages::OutboundEvent;

/// Events buffered per peer before new ones are dropped
pub const PEER_QUEUE_CAPACITY: usize = 256;

/// Queue of events waiting to be written to one peer
pub type EventReceiver = mpsc::Receiver<OutboundEvent>;

type EventSender = mpsc::Sender<OutboundEvent>;

/// A connected peer
struct Peer {
    sender: EventSender,
    connected_at: Instant,
}

/// Registry of currently connected peers
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: DashMap<ConnectionId, Peer>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted peer
    ///
    /// The `connected` greeting is the first event on the returned queue;
    /// it is queued before the peer becomes reachable for broadcast.
    pub fn connect(&self) -> Result<(ConnectionId, EventReceiver), RelayError> {
        let (sender, receiver) = mpsc::channel(PEER_QUEUE_CAPACITY);

        loop {
            let id = ConnectionId::try_generate()?;
            match self.peers.entry(id.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let greeting = OutboundEvent::Connected {
                        connection_id: id.clone(),
                    };
                    if let Err(e) = sender.try_send(greeting) {
                        debug!(connection_id = %id, "greeting not queued: {}", e);
                    }
                    slot.insert(Peer {
                        sender,
                        connected_at: Instant::now(),
                    });
                    info!(connection_id = %id, "peer connected");
                    return Ok((id, receiver));
                }
            }
        }
    }

    /// Remove a peer; returns false if it was already gone
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        match self.peers.remove(id) {
            Some((_, peer)) => {
                info!(
                    connection_id = %id,
                    connected_secs = peer.connected_at.elapsed().as_secs(),
                    "peer disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Queue an event for one peer
    ///
    /// Returns false when the id is unknown, its socket has gone away, or
    /// its queue is full. Never waits.
    pub fn send_to(&self, id: &ConnectionId, event: OutboundEvent) -> bool {
        match self.peers.get(id) {
            Some(peer) => enqueue(id, &peer.sender, event),
            None => false,
        }
    }

    /// Queue an event for every peer except `sender`
    ///
    /// Peers whose queue is full or closed are skipped and not counted.
    pub fn broadcast_except(&self, sender: &ConnectionId, event: &OutboundEvent) -> usize {
        let mut delivered = 0;
        for peer in self.peers.iter() {
            if peer.key() == sender {
                continue;
            }
            if enqueue(peer.key(), &peer.value().sender, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Remove every peer, closing their queues
    pub fn drain(&self) -> usize {
        let count = self.peers.len();
        self.peers.clear();
        if count > 0 {
            info!("Drained {} connections", count);
        }
        count
    }
}

/// Non-blocking push; a stalled peer loses events instead of growing its queue
fn enqueue(id: &ConnectionId, sender: &EventSender, event: OutboundEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(connection_id = %id, "peer queue full, dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection_id = %id, "skipping closed peer queue");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetline_core::RoomId;

    fn invitation(room: &str) -> OutboundEvent {
        OutboundEvent::Invitation { room: RoomId::from(room) }
    }

    /// Connect and consume the greeting
    fn connect(registry: &ConnectionRegistry) -> (ConnectionId, EventReceiver) {
        let (id, mut rx) = registry.connect().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            OutboundEvent::Connected { connection_id: id.clone() }
        );
        (id, rx)
    }

    #[test]
    fn test_connect_assigns_unique_ids() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, _rx_b) = connect(&registry);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&a));
        assert!(registry.contains(&b));
    }

    #[test]
    fn test_greeting_precedes_broadcasts() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, mut rx_b) = registry.connect().unwrap();

        registry.broadcast_except(&a, &invitation("abc123"));

        assert_eq!(rx_b.try_recv().unwrap(), OutboundEvent::Connected { connection_id: b });
        assert_eq!(rx_b.try_recv().unwrap(), invitation("abc123"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_stalled_peer_queue_is_capped() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, mut stalled) = connect(&registry);

        let floods = PEER_QUEUE_CAPACITY + 50;
        let delivered: usize = (0..floods)
            .map(|_| registry.broadcast_except(&a, &invitation("r")))
            .sum();
        assert_eq!(delivered, PEER_QUEUE_CAPACITY);

        // Full queue: unicast is refused too, without blocking
        assert!(!registry.send_to(&b, invitation("r")));

        let mut queued = 0;
        while stalled.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, PEER_QUEUE_CAPACITY);

        // Draining frees room again
        assert!(registry.send_to(&b, invitation("r")));
    }

    #[test]
    fn test_disconnect_removes_entry() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = connect(&registry);

        assert!(registry.disconnect(&a));
        assert!(!registry.contains(&a));
        assert!(registry.is_empty());

        // Second disconnect is a no-op
        assert!(!registry.disconnect(&a));
    }

    #[test]
    fn test_send_to_unknown_is_silent() {
        let registry = ConnectionRegistry::new();
        let (a, _rx) = connect(&registry);
        registry.disconnect(&a);

        assert!(!registry.send_to(&a, invitation("abc123")));
        assert!(!registry.send_to(&ConnectionId::from("nope"), invitation("abc123")));
    }

    #[test]
    fn test_send_to_reaches_only_target() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);

        assert!(registry.send_to(&a, invitation("abc123")));
        assert_eq!(rx_a.try_recv().unwrap(), invitation("abc123"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);
        let (_c, mut rx_c) = connect(&registry);

        let event = invitation("abc123");
        assert_eq!(registry.broadcast_except(&a, &event), 2);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), event);
        assert_eq!(rx_c.try_recv().unwrap(), event);
    }

    #[test]
    fn test_closed_queue_not_counted() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry);
        let (b, rx_b) = connect(&registry);
        drop(rx_b);

        assert_eq!(registry.broadcast_except(&a, &invitation("r")), 0);
        assert!(!registry.send_to(&b, invitation("r")));
    }

    #[test]
    fn test_drain_closes_queues() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = connect(&registry);
        let (_b, _rx_b) = connect(&registry);

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        assert!(matches!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
