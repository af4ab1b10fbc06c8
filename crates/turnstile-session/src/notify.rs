//! Outbound notifications about connection identity.
//!
//! Whenever a session is bound to or removed from a connection, the
//! connection's access token and its user model change. The session
//! layer reports these through a [`Notifier`]; what carries them (a bus,
//! a channel, a test recorder) is up to the implementation.

use tokio::sync::mpsc;
use turnstile_protocol::{AccessToken, ConnectionId, UserView};

/// A change to publish for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Set the connection's access token, or clear it with `None`.
    Token {
        cid: ConnectionId,
        token: Option<AccessToken>,
    },

    /// The connection's user model changed. Anonymous when logged out.
    UserChanged { cid: ConnectionId, values: UserView },
}

impl Notification {
    /// The connection this notification is about.
    pub fn cid(&self) -> &ConnectionId {
        match self {
            Self::Token { cid, .. } | Self::UserChanged { cid, .. } => cid,
        }
    }
}

/// Receives notifications from the session manager.
///
/// Delivery is fire-and-forget: `notify` must not block, and a failed
/// delivery is logged by the implementation, never reported back.
pub trait Notifier: Send + 'static {
    /// Publishes one notification.
    fn notify(&self, notification: Notification);
}

/// A [`Notifier`] that forwards notifications into an unbounded channel.
///
/// Handy when something else owns the outbound side, and in tests to
/// assert on exactly what was published.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}
