//! Session types: the record kept for each logged-in identity.
//!
//! A session tracks:
//! - WHO logged in (`User`)
//! - WHERE they are connected right now (at most one connection)
//! - WHICH relogin keys were handed out (only the last one is redeemable)
//! - WHEN it goes away if nobody relogs in (the expiry timer)

use std::time::{Duration, SystemTime};

use turnstile_protocol::{
    AccessToken, ConnectionId, ReloginKey, SessionId, User,
};

use crate::TimerId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a relogin key stays valid after it was issued. A session
    /// whose latest key is not redeemed within this window is disposed.
    ///
    /// Clients should relogin well before this elapses (about half-way)
    /// to keep the session alive.
    ///
    /// Default: 2 minutes.
    pub expire_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expire_duration: Duration::from_secs(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single login session.
///
/// Identity fields are immutable. The mutable fields (`connection`,
/// `issued_keys`, `timer`) are only written by the
/// [`SessionManager`](crate::SessionManager) through the
/// [`SessionStore`](crate::SessionStore), which keeps its lookup indices
/// in step with them.
#[derive(Debug, Clone)]
pub struct Session {
    /// Assigned at creation, never changes.
    pub session_id: SessionId,

    /// The authenticated identity.
    pub user: User,

    /// When the password login happened.
    pub created_at: SystemTime,

    pub(crate) connection: Option<ConnectionId>,

    /// Append-only. Older keys stay here (and in the key index) as
    /// tombstones so that presenting one can be recognized as a replay.
    pub(crate) issued_keys: Vec<ReloginKey>,

    pub(crate) timer: Option<TimerId>,
}

impl Session {
    pub(crate) fn new(session_id: SessionId, user: User) -> Self {
        Self {
            session_id,
            user,
            created_at: SystemTime::now(),
            connection: None,
            issued_keys: Vec::new(),
            timer: None,
        }
    }

    /// The connection currently bound to this session, if any.
    pub fn connection(&self) -> Option<&ConnectionId> {
        self.connection.as_ref()
    }

    /// Every key issued over the session's life, oldest first.
    pub fn issued_keys(&self) -> &[ReloginKey] {
        &self.issued_keys
    }

    /// The only key that can currently be redeemed.
    pub fn current_key(&self) -> Option<&ReloginKey> {
        self.issued_keys.last()
    }

    /// Returns `true` if `key` is the most recently issued key.
    pub fn is_current_key(&self, key: &ReloginKey) -> bool {
        self.current_key() == Some(key)
    }

    /// The pending expiry timer, if one is armed.
    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// The claims handed to trusted services for this session's connection.
    pub fn access_token(&self) -> AccessToken {
        AccessToken {
            sid: self.session_id.clone(),
            user_id: self.user.id,
            role: self.user.role.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SessionId("s1".into()),
            User {
                id: 4,
                name: "John Doe".into(),
                role: "user".into(),
            },
        )
    }

    #[test]
    fn test_default_config_expires_after_two_minutes() {
        assert_eq!(
            SessionConfig::default().expire_duration,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_new_session_is_unbound_without_keys() {
        let s = session();
        assert!(s.connection().is_none());
        assert!(s.current_key().is_none());
        assert!(s.timer().is_none());
    }

    #[test]
    fn test_is_current_key_only_for_last_key() {
        let mut s = session();
        s.issued_keys.push(ReloginKey("k1".into()));
        s.issued_keys.push(ReloginKey("k2".into()));

        assert!(s.is_current_key(&ReloginKey("k2".into())));
        assert!(!s.is_current_key(&ReloginKey("k1".into())));
    }

    #[test]
    fn test_access_token_carries_session_and_user() {
        let token = session().access_token();
        assert_eq!(token.sid, SessionId("s1".into()));
        assert_eq!(token.user_id, 4);
        assert_eq!(token.role, "user");
    }
}
