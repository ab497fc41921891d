//! Signaling router
//!
//! Stateless dispatch of inbound events. `invite` goes to the addressed
//! peer only; `offer`, `answer` and `candidate` go to every connected
//! peer except the sender. There is no room scoping, so two calls on one
//! relay see each other's signaling.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use meetline_core::{ConnectionId, DropReason, Invitation, RoomId, SignalKind};

use crate::messages::{is_empty_payload, InboundEvent, OutboundEvent};
use crate::registry::ConnectionRegistry;

/// Outcome of routing one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued for this many peers (zero when the sender is alone)
    Delivered(usize),
    /// Rejected before routing
    Dropped(DropReason),
    /// The invite target was missing, not connected, or not accepting events
    Unroutable(Option<ConnectionId>),
}

/// Routes events between peers in a [`ConnectionRegistry`]
#[derive(Clone)]
pub struct SignalRouter {
    registry: Arc<ConnectionRegistry>,
}

impl SignalRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Parse and route one text frame received from `sender`
    pub fn handle_frame(&self, sender: &ConnectionId, text: &str) -> Dispatch {
        match InboundEvent::from_json(text) {
            Ok(event) => self.dispatch(sender, event),
            Err(e) => {
                warn!(connection_id = %sender, error = %e, "dropping malformed frame");
                Dispatch::Dropped(DropReason::Malformed(e.to_string()))
            }
        }
    }

    /// Route one parsed event from `sender`
    pub fn dispatch(&self, sender: &ConnectionId, event: InboundEvent) -> Dispatch {
        match event {
            InboundEvent::Invite {
                room,
                participant_id,
            } => self.invite(sender, room, participant_id),
            InboundEvent::Offer { payload } => self.relay(sender, SignalKind::Offer, payload),
            InboundEvent::Answer { payload } => self.relay(sender, SignalKind::Answer, payload),
            InboundEvent::Candidate { payload } => {
                self.relay(sender, SignalKind::Candidate, payload)
            }
        }
    }

    fn invite(
        &self,
        sender: &ConnectionId,
        room: Option<RoomId>,
        target: Option<ConnectionId>,
    ) -> Dispatch {
        let room = match room.filter(|r| !r.is_empty()) {
            Some(room) => room,
            None => {
                warn!(connection_id = %sender, "dropping invite without room");
                return Dispatch::Dropped(DropReason::EmptyRoom);
            }
        };

        let target = match target.filter(|t| !t.is_empty()) {
            Some(target) => target,
            None => {
                warn!(connection_id = %sender, room = %room, "invite has no participant id");
                return Dispatch::Unroutable(None);
            }
        };

        self.deliver(sender, Invitation::new(room, target))
    }

    fn deliver(&self, sender: &ConnectionId, invitation: Invitation) -> Dispatch {
        let Invitation { room, target } = invitation;
        if self
            .registry
            .send_to(&target, OutboundEvent::Invitation { room: room.clone() })
        {
            debug!(from = %sender, to = %target, room = %room, "invitation routed");
            Dispatch::Delivered(1)
        } else {
            warn!(from = %sender, to = %target, room = %room, "invite target unreachable");
            Dispatch::Unroutable(Some(target))
        }
    }

    fn relay(&self, sender: &ConnectionId, kind: SignalKind, payload: Value) -> Dispatch {
        if is_empty_payload(&payload) {
            warn!(connection_id = %sender, event = %kind, "dropping event without payload");
            return Dispatch::Dropped(DropReason::EmptyPayload(kind));
        }

        let event = OutboundEvent::signal(kind, payload);
        let delivered = self.registry.broadcast_except(sender, &event);
        debug!(from = %sender, event = %kind, recipients = delivered, "signal relayed");
        Dispatch::Delivered(delivered)
    }
}
