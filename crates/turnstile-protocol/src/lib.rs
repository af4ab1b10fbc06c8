//! Wire protocol for Turnstile.
//!
//! This crate defines what travels on the bus:
//!
//! - **Types** ([`AuthRequest`], [`Reply`], [`TokenEvent`], etc.):
//!   request bodies, replies, and identity events.
//! - **Subjects** ([`subject`]): the subject names the session service
//!   listens on and publishes to, and wildcard matching.
//! - **Frames** ([`Frame`]): how WebSocket peers talk to the bus.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): bytes in, types out.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (typed payloads) → Session (lifecycle)
//! ```

mod codec;
mod error;
mod frame;
pub mod subject;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::Frame;
pub use types::{
    AccessRequest, AccessResult, AccessToken, AuthRequest, ChangeEvent,
    ConnectionId, GetResult, LoginParams, LoginResult, ReloginKey, Reply,
    ResError, SessionId, TokenEvent, User, UserView, parse_relogin_key,
};
