//! Publishes session notifications on the bus.

use turnstile_protocol::{ChangeEvent, TokenEvent, subject};
use turnstile_session::{Notification, Notifier};

use crate::Bus;

/// A [`Notifier`] that turns notifications into bus events:
///
/// - `Token` → `conn.{cid}.token` with `{"token": ...}`
/// - `UserChanged` → `event.session.user.{cid}.change` with `{"values": ...}`
///
/// Publishing is synchronous, so the events are on the bus before the
/// session service replies to the request that caused them.
#[derive(Debug, Clone)]
pub struct BusNotifier {
    bus: Bus,
}

impl BusNotifier {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn notify(&self, notification: Notification) {
        let result = match &notification {
            Notification::Token { cid, token } => self.bus.publish_json(
                &subject::token(cid),
                None,
                &TokenEvent {
                    token: token.clone(),
                },
            ),
            Notification::UserChanged { cid, values } => self.bus.publish_json(
                &subject::user_change(cid),
                None,
                &ChangeEvent {
                    values: values.clone(),
                },
            ),
        };
        if let Err(e) = result {
            tracing::warn!(cid = %notification.cid(), error = %e, "failed to publish notification");
        }
    }
}
