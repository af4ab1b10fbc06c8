//! Frames exchanged between the bus and its WebSocket peers.
//!
//! The framing is deliberately small, modeled on the classic
//! publish/subscribe text protocols: a peer subscribes to patterns,
//! publishes messages (optionally naming a reply subject), and receives
//! `msg` frames for every bus message matching one of its subscriptions.
//!
//! ```text
//! peer → bus   {"op":"sub","sid":1,"subject":"conn.*.token"}
//! peer → bus   {"op":"pub","subject":"auth.session.login","reply":"_INBOX.7","data":{...}}
//! bus  → peer  {"op":"msg","sid":2,"subject":"_INBOX.7","data":{"result":{...}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single bus frame. Tagged by `op` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Frame {
    /// Peer → bus: start receiving messages matching `subject`.
    /// `sid` is chosen by the peer and echoed in `msg` frames.
    Sub { sid: u64, subject: String },

    /// Peer → bus: stop the subscription with this `sid`.
    Unsub { sid: u64 },

    /// Peer → bus: publish `data` on `subject`.
    Pub {
        subject: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply: Option<String>,
        #[serde(default)]
        data: Value,
    },

    /// Bus → peer: a message delivered for subscription `sid`.
    Msg {
        sid: u64,
        subject: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply: Option<String>,
        data: Value,
    },

    /// Bus → peer: the previous frame was rejected. The link stays open.
    Err { message: String },
}
