//! Delivery channels for notifications.
//!
//! - Realtime: JSON envelopes published over Redis pub/sub, consumed by the
//!   websocket gateway that fronts the web and mobile clients
//! - Email: Resend HTTP API
//!
//! Channels that are not configured are disabled and turn every send into a
//! logged no-op, so callers never branch on configuration.

pub mod dispatcher;
pub mod email;
pub mod realtime;

pub use dispatcher::{DeliveryError, DeliveryOutcome, NotificationDispatcher};
pub use email::EmailSender;
pub use realtime::{RealtimeBroadcaster, RealtimeMessage};
