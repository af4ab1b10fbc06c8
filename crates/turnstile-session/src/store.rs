//! The session table and its lookup indices.
//!
//! Sessions are owned by one map keyed by [`SessionId`]. Two more maps
//! index them by relogin key and by bound connection. Every mutation that
//! touches a session field mirrored in an index goes through a method
//! here, so the indices can never point at different sessions for the
//! same key.
//!
//! Mutating methods are `pub(crate)`: only the
//! [`SessionManager`](crate::SessionManager) writes to the store.

use std::collections::HashMap;

use turnstile_protocol::{ConnectionId, ReloginKey, SessionId};

use crate::Session;

/// What changed when a connection was bound to a session.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Rebind {
    /// The connection the session was bound to before, if different.
    pub previous: Option<ConnectionId>,
    /// Another session that held the connection and lost it.
    pub evicted: Option<SessionId>,
}

/// In-memory session table with O(1) lookup by id, key, and connection.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    by_key: HashMap<ReloginKey, SessionId>,
    by_connection: HashMap<ConnectionId, SessionId>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a session by id.
    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Looks up the session a key was issued to. Superseded keys still
    /// resolve, so callers must check [`Session::is_current_key`].
    pub fn get_by_key(&self, key: &ReloginKey) -> Option<&Session> {
        self.by_key.get(key).and_then(|id| self.sessions.get(id))
    }

    /// Looks up the session bound to a connection.
    pub fn get_by_connection(&self, cid: &ConnectionId) -> Option<&Session> {
        self.by_connection.get(cid).and_then(|id| self.sessions.get(id))
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of indexed keys, current and superseded.
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Number of bound connections.
    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Ids of all live sessions, in no particular order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub(crate) fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    /// Adds a freshly created session. It must not have keys or a
    /// connection yet; those are added through `push_key` and `bind`.
    pub(crate) fn put(&mut self, session: Session) {
        debug_assert!(session.issued_keys.is_empty() && session.connection.is_none());
        self.sessions.insert(session.session_id.clone(), session);
    }

    /// Appends a key to the session's issued keys and indexes it.
    /// Returns `false` if the session does not exist.
    pub(crate) fn push_key(&mut self, session_id: &SessionId, key: ReloginKey) -> bool {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        session.issued_keys.push(key.clone());
        self.by_key.insert(key, session_id.clone());
        true
    }

    /// Binds `cid` to the session, unbinding whatever the session was
    /// bound to before. A connection belongs to at most one session, so a
    /// different session holding `cid` is left unbound.
    pub(crate) fn bind(&mut self, session_id: &SessionId, cid: ConnectionId) -> Rebind {
        let mut rebind = Rebind::default();
        if !self.sessions.contains_key(session_id) {
            return rebind;
        }

        if let Some(holder) = self.by_connection.get(&cid).cloned() {
            if &holder != session_id {
                if let Some(other) = self.sessions.get_mut(&holder) {
                    other.connection = None;
                }
                rebind.evicted = Some(holder);
            }
        }

        let Some(session) = self.sessions.get_mut(session_id) else {
            return rebind;
        };
        if let Some(old) = session.connection.replace(cid.clone()) {
            if old != cid {
                self.by_connection.remove(&old);
                rebind.previous = Some(old);
            }
        }
        self.by_connection.insert(cid, session_id.clone());
        rebind
    }

    /// Removes the session and every index entry referencing it: all
    /// issued keys and the bound connection. Returns the removed session,
    /// or `None` if it was already gone.
    pub(crate) fn remove_all(&mut self, session_id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        for key in &session.issued_keys {
            if self.by_key.get(key) == Some(session_id) {
                self.by_key.remove(key);
            }
        }
        if let Some(cid) = &session.connection {
            if self.by_connection.get(cid) == Some(session_id) {
                self.by_connection.remove(cid);
            }
        }
        Some(session)
    }
}
