//! Meetline Signal Server
//!
//! Relays WebRTC signaling between browser peers over WebSocket and sends
//! meeting invitations by email.
//!
//! # Protocol
//!
//! 1. Peer opens `/ws` and receives `connected` with its own id
//! 2. `offer`, `answer` and `candidate` go to every other connected peer
//! 3. `invite` delivers an `invitation` to one peer, addressed by id
//! 4. On disconnect the peer's id stops being addressable
//!
//! Signaling is not scoped to rooms: one relay instance carries one call
//! at a time, concurrent calls see each other's messages.

pub mod http;
pub mod mailer;
pub mod messages;
pub mod registry;
pub mod router;
pub mod server;

pub use mailer::{InvitationEmail, MailError, MailReceipt, Mailer, SmtpMailer};
pub use messages::{InboundEvent, OutboundEvent};
pub use registry::ConnectionRegistry;
pub use router::{Dispatch, SignalRouter};
pub use server::{ServerError, SignalServer};

pub use meetline_core::DEFAULT_PORT;
