//! Server configuration.

use std::time::Duration;

use turnstile_session::SessionConfig;

use crate::TurnstileError;

/// Bind address, `host:port`.
pub const ENV_BIND: &str = "TURNSTILE_BIND";
/// Relogin key lifetime in seconds.
pub const ENV_EXPIRE_SECS: &str = "TURNSTILE_EXPIRE_SECS";
/// Default timeout for [`Bus::request`](crate::Bus::request), in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TURNSTILE_REQUEST_TIMEOUT_MS";
/// Peer idle timeout in seconds; `0` disables it.
pub const ENV_PEER_IDLE_SECS: &str = "TURNSTILE_PEER_IDLE_SECS";

/// Configuration for a [`TurnstileServer`](crate::TurnstileServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Session lifecycle settings.
    pub session: SessionConfig,

    /// How long in-process requests wait for a reply.
    pub request_timeout: Duration,

    /// A peer that sends nothing for this long is disconnected.
    /// `None` keeps idle peers forever.
    pub peer_idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session: SessionConfig::default(),
            request_timeout: Duration::from_secs(5),
            peer_idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl ServerConfig {
    /// Builds a config from `TURNSTILE_*` environment variables, falling
    /// back to the defaults for unset ones.
    ///
    /// # Errors
    /// Returns [`TurnstileError::Config`] if a variable is set but is not
    /// a valid value.
    pub fn from_env() -> Result<Self, TurnstileError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading from `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TurnstileError> {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND) {
            if addr.trim().is_empty() {
                return Err(TurnstileError::Config(format!("{ENV_BIND} is empty")));
            }
            config.bind_addr = addr;
        }
        if let Some(secs) = parse_u64(&lookup, ENV_EXPIRE_SECS)? {
            if secs == 0 {
                return Err(TurnstileError::Config(format!(
                    "{ENV_EXPIRE_SECS} must be greater than zero"
                )));
            }
            config.session.expire_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, ENV_PEER_IDLE_SECS)? {
            config.peer_idle_timeout =
                (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, TurnstileError> {
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| {
                TurnstileError::Config(format!("{name}={raw:?}: {e}"))
            })
        })
        .transpose()
}
