//! # Turnstile
//!
//! Session authentication over a publish/subscribe bus.
//!
//! Clients log in with a username and password and get back a single-use
//! relogin key. Presenting the key from a new connection moves the
//! session there and rotates the key; presenting an old key again is
//! treated as theft and kills the session. The connection's access token
//! and user model are published on the bus whenever that binding changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turnstile::prelude::*;
//!
//! # async fn start() -> Result<(), TurnstileError> {
//! let server = TurnstileServer::builder()
//!     .bind("127.0.0.1:8080")
//!     .build()
//!     .await?;
//!
//! let reply = server
//!     .request(
//!         "auth.session.login",
//!         serde_json::json!({
//!             "cid": "c1",
//!             "params": { "username": "admin", "password": "admin" },
//!         }),
//!     )
//!     .await?;
//! assert!(reply["result"]["reloginKey"].is_string());
//!
//! server.run().await
//! # }
//! ```

mod bus;
mod config;
mod error;
mod handler;
mod notifier;
mod responder;
mod server;

pub use bus::{Bus, INBOX_PREFIX, Message, Registration, Subscription, Tagged};
pub use config::{
    ENV_BIND, ENV_EXPIRE_SECS, ENV_PEER_IDLE_SECS, ENV_REQUEST_TIMEOUT_MS,
    ServerConfig,
};
pub use error::TurnstileError;
pub use notifier::BusNotifier;
pub use responder::Responder;
pub use server::{TurnstileServer, TurnstileServerBuilder};

/// Common imports for running or embedding a Turnstile server.
pub mod prelude {
    pub use crate::{
        Bus, BusNotifier, Message, ServerConfig, Subscription,
        TurnstileError, TurnstileServer, TurnstileServerBuilder,
    };
    pub use turnstile_protocol::{
        AccessToken, ConnectionId, Frame, ReloginKey, Reply, ResError,
        SessionId, User, UserView, subject,
    };
    pub use turnstile_session::{
        SessionConfig, SessionError, SessionHandle, StaticDirectory,
        UserDirectory,
    };
}
