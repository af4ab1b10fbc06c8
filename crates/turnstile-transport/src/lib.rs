//! Peer transport layer for Turnstile.
//!
//! A "peer" is a process that talks to the Turnstile message bus from the
//! outside: a gateway forwarding client requests, a resource service, or
//! a test harness. Peers exchange text frames; what those frames mean is
//! the protocol crate's business.
//!
//! Provides the [`Transport`] and [`Connection`] traits so the bus bridge
//! does not depend on a concrete socket type.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a peer link.
///
/// Not to be confused with the client connection ids (`cid`) that travel
/// inside auth requests; a single gateway peer carries many clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Accepts new incoming peer links.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single peer link that can send and receive frames.
///
/// `send` and `recv` may be awaited concurrently from different tasks:
/// the bridge reads requests while bus deliveries are written out.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this peer link.
    fn id(&self) -> PeerId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_new_and_into_inner() {
        let id = PeerId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_peer_id_display() {
        assert_eq!(PeerId::new(7).to_string(), "peer-7");
    }

    #[test]
    fn test_peer_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PeerId::new(1), "gateway");
        map.insert(PeerId::new(2), "ticker");
        assert_eq!(map[&PeerId::new(1)], "gateway");
    }
}
