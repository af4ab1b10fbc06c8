//! In-process publish/subscribe bus.
//!
//! Everything in a Turnstile server talks through the [`Bus`]: the
//! responder listens for auth requests on it, the session notifier
//! publishes token and user-model events on it, and each WebSocket peer
//! is bridged onto it.
//!
//! Delivery is synchronous and ordered: `publish` pushes into every
//! matching subscriber's unbounded channel before it returns, so one
//! subscriber sees messages in the order they were published.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use turnstile_protocol::{ProtocolError, subject};

use crate::TurnstileError;

/// Prefix of generated reply subjects.
pub const INBOX_PREFIX: &str = "_INBOX";

/// A message as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub data: Value,
}

/// A message delivered into a shared channel, with the tag given at
/// subscription time.
pub type Tagged = (u64, Message);

enum Sink {
    Own(mpsc::UnboundedSender<Message>),
    Shared(u64, mpsc::UnboundedSender<Tagged>),
}

impl Sink {
    /// Returns `false` if the receiving end is gone.
    fn deliver(&self, message: Message) -> bool {
        match self {
            Sink::Own(tx) => tx.send(message).is_ok(),
            Sink::Shared(tag, tx) => tx.send((*tag, message)).is_ok(),
        }
    }
}

struct Entry {
    pattern: String,
    sink: Sink,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        // Entries are only inserted or removed whole; a poisoned map is
        // still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        self.entries().remove(&id);
    }
}

/// Cloneable handle to the bus. All clones share the same routes.
#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl Bus {
    /// Creates a bus with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `pattern` with a channel of its own. Dropping the
    /// returned [`Subscription`] unsubscribes.
    ///
    /// # Errors
    /// Returns [`TurnstileError::Protocol`] if `pattern` is malformed.
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, TurnstileError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let registration = self.register(pattern, Sink::Own(tx))?;
        Ok(Subscription { registration, rx })
    }

    /// Subscribes to `pattern`, delivering `(tag, message)` into a channel
    /// shared with other subscriptions. Messages from all subscriptions on
    /// that channel arrive in publish order. Dropping the returned
    /// [`Registration`] unsubscribes.
    ///
    /// # Errors
    /// Returns [`TurnstileError::Protocol`] if `pattern` is malformed.
    pub fn subscribe_tagged(
        &self,
        pattern: &str,
        tag: u64,
        tx: mpsc::UnboundedSender<Tagged>,
    ) -> Result<Registration, TurnstileError> {
        self.register(pattern, Sink::Shared(tag, tx))
    }

    fn register(&self, pattern: &str, sink: Sink) -> Result<Registration, TurnstileError> {
        subject::validate(pattern, true)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries().insert(
            id,
            Entry {
                pattern: pattern.to_owned(),
                sink,
            },
        );
        tracing::trace!(pattern, id, "subscribed");
        Ok(Registration {
            id,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Publishes `data` on `subject`. Returns how many subscribers got it;
    /// zero is not an error.
    ///
    /// # Errors
    /// Returns [`TurnstileError::Protocol`] if `subject` is malformed or
    /// contains wildcards.
    pub fn publish(
        &self,
        subject: &str,
        reply: Option<String>,
        data: Value,
    ) -> Result<usize, TurnstileError> {
        subject::validate(subject, false)?;
        if let Some(reply) = &reply {
            subject::validate(reply, false)?;
        }

        let message = Message {
            subject: subject.to_owned(),
            reply,
            data,
        };

        let mut entries = self.inner.entries();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, entry) in entries.iter() {
            if !subject::matches(&entry.pattern, subject) {
                continue;
            }
            if entry.sink.deliver(message.clone()) {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            entries.remove(&id);
        }

        tracing::trace!(subject, delivered, "published");
        Ok(delivered)
    }

    /// Serializes `value` and publishes it.
    pub fn publish_json<T: Serialize>(
        &self,
        subject: &str,
        reply: Option<String>,
        value: &T,
    ) -> Result<usize, TurnstileError> {
        let data = serde_json::to_value(value).map_err(ProtocolError::Encode)?;
        self.publish(subject, reply, data)
    }

    /// Publishes a request with a fresh inbox as reply subject and waits
    /// for the first reply.
    ///
    /// # Errors
    /// - [`TurnstileError::RequestTimeout`] if nothing replies within
    ///   `timeout` (including when nobody is subscribed to `subject`)
    /// - [`TurnstileError::Protocol`] if `subject` is malformed
    pub async fn request(
        &self,
        subject: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, TurnstileError> {
        let inbox = self.new_inbox();
        let mut sub = self.subscribe(&inbox)?;
        self.publish(subject, Some(inbox), data)?;

        match tokio::time::timeout(timeout, sub.recv()).await {
            Ok(Some(message)) => Ok(message.data),
            Ok(None) | Err(_) => Err(TurnstileError::RequestTimeout(subject.to_owned())),
        }
    }

    /// A reply subject unique to this bus.
    pub fn new_inbox(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{INBOX_PREFIX}.{n}")
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.entries().len()
    }
}

/// Keeps a subscription alive. Unsubscribes on drop.
pub struct Registration {
    id: u64,
    inner: Arc<Inner>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.remove(self.id);
    }
}

/// A subscription with its own receiving channel.
pub struct Subscription {
    registration: Registration,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    /// Waits for the next message. Never returns `None` while the
    /// subscription is alive.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Returns a message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// The subscription's id on the bus.
    pub fn id(&self) -> u64 {
        self.registration.id
    }
}
