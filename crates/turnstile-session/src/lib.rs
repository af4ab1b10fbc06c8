//! Login session management for Turnstile.
//!
//! This crate owns the lifecycle of login sessions:
//!
//! 1. **Authentication**: checking a username and password against a
//!    [`UserDirectory`]
//! 2. **Session tracking**: which session is bound to which connection
//!    ([`SessionStore`], [`SessionManager`])
//! 3. **Relogin**: single-use rotating keys that let a client resume its
//!    session from a new connection. Presenting a superseded key disposes
//!    the session.
//! 4. **Expiry**: a session whose latest key isn't redeemed within
//!    [`SessionConfig::expire_duration`] is disposed ([`Scheduler`])
//!
//! Token and user-model changes are reported through a [`Notifier`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Service facade (above)  ← routes bus requests to a SessionHandle
//!     ↕
//! Session Layer (this crate)  ← one task owns every session
//!     ↕
//! Protocol Layer (below)  ← ConnectionId, ReloginKey, UserView, ...
//! ```

mod auth;
mod error;
mod issuer;
mod manager;
mod notify;
mod service;
mod session;
mod store;
mod timer;

pub use auth::{StaticDirectory, UserDirectory};
pub use error::SessionError;
pub use issuer::generate_id;
pub use manager::{SessionManager, authorize};
pub use notify::{ChannelNotifier, Notification, Notifier};
pub use service::{SessionHandle, SessionService};
pub use session::{Session, SessionConfig};
pub use store::SessionStore;
pub use timer::{Expiry, ManualScheduler, Scheduler, TimerId, TokioScheduler};
