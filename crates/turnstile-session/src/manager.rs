//! The session lifecycle controller.
//!
//! `SessionManager` is the only writer of the [`SessionStore`]. It handles
//! login, relogin, logout, connection rebinding, expiry, and disposal of
//! sessions whose keys were replayed.
//!
//! # Concurrency note
//!
//! `SessionManager` takes `&mut self` everywhere and does no locking.
//! Binding, key issuance, and disposal are multi-step index updates that
//! must look atomic to every reader, so the manager has to be driven by
//! exactly one writer. In a server that writer is the
//! [`SessionService`](crate::SessionService) task; tests drive it directly.

use turnstile_protocol::{
    ConnectionId, LoginParams, ReloginKey, SessionId, UserView,
};

use crate::issuer::generate_id;
use crate::{
    Expiry, Notification, Notifier, Scheduler, Session, SessionConfig,
    SessionError, SessionStore, UserDirectory,
};

/// Owns every session and the collaborators that act on them.
///
/// ## Lifecycle
///
/// ```text
/// login() ──→ [bound, key K1] ──relogin(K1)──→ [bound, key K2] ──→ ...
///                  │                                  │
///                  │  logout() / expiry / relogin(K1) │
///                  ▼                                  ▼
///              dispose() ── token cleared, keys invalid, indices empty
/// ```
pub struct SessionManager<D, N, S> {
    store: SessionStore,
    directory: D,
    notifier: N,
    scheduler: S,
    config: SessionConfig,
}

impl<D, N, S> SessionManager<D, N, S>
where
    D: UserDirectory,
    N: Notifier,
    S: Scheduler,
{
    /// Creates a manager with an empty store.
    pub fn new(
        config: SessionConfig,
        directory: D,
        notifier: N,
        scheduler: S,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            directory,
            notifier,
            scheduler,
            config,
        }
    }

    /// Read access to the session table.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The scheduler, e.g. to advance a virtual clock in tests.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Password login.
    ///
    /// Checks run in this order: an existing token, then well-formed
    /// params, then credentials. On success a new session is bound to
    /// `cid` and its first relogin key is returned.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyAuthenticated`] if `has_token` is set
    /// - [`SessionError::InvalidParams`] if `params` is `None`
    /// - [`SessionError::WrongCredentials`] from the directory
    pub fn login(
        &mut self,
        cid: &ConnectionId,
        params: Option<LoginParams>,
        has_token: bool,
    ) -> Result<ReloginKey, SessionError> {
        if has_token {
            tracing::debug!(%cid, "login rejected: connection already has a token");
            return Err(SessionError::AlreadyAuthenticated);
        }
        let params = params.ok_or(SessionError::InvalidParams)?;

        let user = self
            .directory
            .authenticate(&params.username, &params.password)
            .inspect_err(|_| {
                tracing::debug!(%cid, username = %params.username, "login rejected: wrong credentials");
            })?;

        let session_id = SessionId(generate_id());
        tracing::info!(%cid, session_id = %session_id, user_id = user.id, "session created");

        self.store.put(Session::new(session_id.clone(), user));
        self.bind_connection(&session_id, cid);
        Ok(self.issue_key(&session_id))
    }

    /// Redeems a relogin key, binding `cid` to its session and returning
    /// the next key.
    ///
    /// A key that was issued to a live session but has since been
    /// superseded is treated as stolen: the whole session is disposed
    /// before the error is returned.
    ///
    /// # Errors
    /// - [`SessionError::InvalidParams`] if `key` is `None`
    /// - [`SessionError::InvalidReloginKey`] if the key is unknown or stale
    pub fn relogin(
        &mut self,
        cid: &ConnectionId,
        key: Option<ReloginKey>,
    ) -> Result<ReloginKey, SessionError> {
        let key = key.ok_or(SessionError::InvalidParams)?;

        let Some(session) = self.store.get_by_key(&key) else {
            tracing::debug!(%cid, "relogin rejected: unknown key");
            return Err(SessionError::InvalidReloginKey);
        };
        let session_id = session.session_id.clone();

        if !session.is_current_key(&key) {
            tracing::warn!(%cid, session_id = %session_id, "superseded relogin key presented, disposing session");
            self.dispose(&session_id);
            return Err(SessionError::InvalidReloginKey);
        }

        let rebind = session.connection() != Some(cid);

        // The standing timer goes first, so an expiry can't slip in
        // between the check above and the renewal.
        self.cancel_expiry(&session_id);
        if rebind {
            self.bind_connection(&session_id, cid);
        }

        tracing::info!(%cid, session_id = %session_id, rebind, "session renewed");
        Ok(self.issue_key(&session_id))
    }

    /// Disposes the session bound to `cid`, if any. Returns whether a
    /// session was disposed; logging out an unbound connection is a no-op.
    pub fn logout(&mut self, cid: &ConnectionId) -> bool {
        let Some(session_id) = self
            .store
            .get_by_connection(cid)
            .map(|s| s.session_id.clone())
        else {
            tracing::debug!(%cid, "logout on unbound connection");
            return false;
        };

        tracing::info!(%cid, session_id = %session_id, "logout");
        self.dispose(&session_id);
        true
    }

    /// The identity bound to `cid`, or the anonymous view. Read-only.
    pub fn current_user(&self, cid: &ConnectionId) -> UserView {
        self.store
            .get_by_connection(cid)
            .map(|s| UserView::from(&s.user))
            .unwrap_or_else(UserView::anonymous)
    }

    /// Handles a fired timer. Returns `true` if a session was disposed.
    ///
    /// The expiry is ignored unless its timer is still the session's
    /// current one: a timer that was already in flight when the session
    /// was renewed or disposed must not touch it.
    pub fn expire(&mut self, expiry: Expiry) -> bool {
        let Some(session) = self.store.get(&expiry.session_id) else {
            tracing::debug!(session_id = %expiry.session_id, "expiry for disposed session ignored");
            return false;
        };
        if session.timer != Some(expiry.timer) {
            tracing::debug!(session_id = %expiry.session_id, "stale expiry ignored");
            return false;
        }

        // Disposal still cancels the fired timer so the scheduler forgets it.
        tracing::info!(session_id = %expiry.session_id, "session expired");
        self.dispose(&expiry.session_id);
        true
    }

    /// Disposes every live session. Used on shutdown, since sessions do
    /// not outlive the process. Returns how many were disposed.
    pub fn dispose_all(&mut self) -> usize {
        let ids = self.store.session_ids();
        for session_id in &ids {
            self.dispose(session_id);
        }
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "all sessions disposed");
        }
        ids.len()
    }

    // -- internals ---------------------------------------------------------

    /// Binds `cid` to the session and publishes its token and user model.
    /// A previously bound connection gets its token cleared.
    fn bind_connection(&mut self, session_id: &SessionId, cid: &ConnectionId) {
        let rebind = self.store.bind(session_id, cid.clone());

        if let Some(previous) = rebind.previous {
            tracing::info!(%cid, %previous, session_id = %session_id, "session moved to new connection");
            self.notifier.notify(Notification::Token {
                cid: previous,
                token: None,
            });
        }
        if let Some(evicted) = rebind.evicted {
            tracing::info!(%cid, session_id = %evicted, "session lost its connection to another session");
        }

        let Some(session) = self.store.get(session_id) else {
            return;
        };
        self.notifier.notify(Notification::Token {
            cid: cid.clone(),
            token: Some(session.access_token()),
        });
        self.notifier.notify(Notification::UserChanged {
            cid: cid.clone(),
            values: UserView::from(&session.user),
        });
    }

    fn cancel_expiry(&mut self, session_id: &SessionId) {
        if let Some(timer) = self
            .store
            .get_mut(session_id)
            .and_then(|s| s.timer.take())
        {
            self.scheduler.cancel(timer);
        }
    }

    /// Re-arms the expiry timer and appends a fresh key.
    fn issue_key(&mut self, session_id: &SessionId) -> ReloginKey {
        self.cancel_expiry(session_id);
        let timer = self
            .scheduler
            .schedule(session_id, self.config.expire_duration);
        if let Some(session) = self.store.get_mut(session_id) {
            session.timer = Some(timer);
        }

        let key = ReloginKey(generate_id());
        self.store.push_key(session_id, key.clone());
        key
    }

    /// Cancels the timer, clears the bound connection's identity, and
    /// removes the session from every index. A second call is a no-op.
    fn dispose(&mut self, session_id: &SessionId) {
        self.cancel_expiry(session_id);

        let Some(session) = self.store.remove_all(session_id) else {
            return;
        };
        if let Some(cid) = session.connection {
            self.notifier.notify(Notification::UserChanged {
                cid: cid.clone(),
                values: UserView::anonymous(),
            });
            self.notifier.notify(Notification::Token { cid, token: None });
        }
    }
}

/// Access check for the per-connection user model: a connection may only
/// read its own.
pub fn authorize(cid: &ConnectionId, subject_cid: &ConnectionId) -> bool {
    cid == subject_cid
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{ChannelNotifier, ManualScheduler, StaticDirectory, TokioScheduler};

    type Manager = SessionManager<StaticDirectory, ChannelNotifier, ManualScheduler>;

    const EXPIRE: Duration = Duration::from_secs(120);

    fn manager() -> (Manager, mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = ChannelNotifier::new();
        let m = SessionManager::new(
            SessionConfig::default(),
            StaticDirectory::demo(),
            notifier,
            ManualScheduler::new(),
        );
        (m, rx)
    }

    fn cid(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    fn creds(user: &str, pass: &str) -> Option<LoginParams> {
        Some(LoginParams {
            username: user.into(),
            password: pass.into(),
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn login_admin(m: &mut Manager, c: &str) -> ReloginKey {
        m.login(&cid(c), creds("admin", "admin"), false).unwrap()
    }

    // -- login -------------------------------------------------------------

    #[test]
    fn test_login_creates_one_bound_session_with_one_key() {
        let (mut m, mut rx) = manager();

        let key = login_admin(&mut m, "c1");

        assert_eq!(m.store().len(), 1);
        let session = m.store().get_by_connection(&cid("c1")).unwrap();
        assert_eq!(session.issued_keys(), &[key.clone()]);
        assert!(session.is_current_key(&key));
        assert!(session.timer().is_some());
        assert_eq!(session.user.name, "Administrator");

        let notes = drain(&mut rx);
        assert_eq!(notes.len(), 2);
        assert_eq!(
            notes[0],
            Notification::Token {
                cid: cid("c1"),
                token: Some(session.access_token()),
            }
        );
        assert!(matches!(
            &notes[1],
            Notification::UserChanged { cid: c, values } if c == &cid("c1") && values.id == Some(1)
        ));
    }

    #[test]
    fn test_login_with_token_is_rejected_before_params() {
        let (mut m, mut rx) = manager();
        let err = m.login(&cid("c1"), None, true).unwrap_err();
        assert_eq!(err, SessionError::AlreadyAuthenticated);
        assert!(m.store().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_login_missing_params_is_invalid() {
        let (mut m, _rx) = manager();
        assert_eq!(
            m.login(&cid("c1"), None, false),
            Err(SessionError::InvalidParams)
        );
    }

    #[test]
    fn test_login_wrong_password_leaves_store_empty() {
        let (mut m, mut rx) = manager();

        let err = m.login(&cid("c1"), creds("admin", "wrong"), false).unwrap_err();

        assert_eq!(err, SessionError::WrongCredentials);
        assert!(m.store().is_empty());
        assert_eq!(m.store().key_count(), 0);
        assert_eq!(m.store().connection_count(), 0);
        assert_eq!(m.scheduler_mut().pending(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_login_unknown_user_matches_wrong_password() {
        let (mut m, _rx) = manager();
        let unknown = m.login(&cid("c1"), creds("nobody", "admin"), false);
        let wrong = m.login(&cid("c1"), creds("admin", "nobody"), false);
        assert_eq!(unknown, wrong);
    }

    #[test]
    fn test_login_username_case_insensitive() {
        let (mut m, _rx) = manager();
        assert!(m.login(&cid("c1"), creds("Jane", "jane"), false).is_ok());
        assert_eq!(m.current_user(&cid("c1")).id, Some(3));
    }

    // -- relogin -----------------------------------------------------------

    #[test]
    fn test_relogin_current_key_rotates() {
        let (mut m, _rx) = manager();
        let k1 = login_admin(&mut m, "c1");

        let k2 = m.relogin(&cid("c1"), Some(k1.clone())).unwrap();

        assert_ne!(k1, k2);
        let session = m.store().get_by_connection(&cid("c1")).unwrap();
        assert!(session.is_current_key(&k2));
        assert!(!session.is_current_key(&k1));
        assert_eq!(m.store().key_count(), 2);
    }

    #[test]
    fn test_relogin_same_connection_publishes_nothing() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        drain(&mut rx);

        m.relogin(&cid("c1"), Some(k1)).unwrap();

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_relogin_missing_key_is_invalid_params() {
        let (mut m, _rx) = manager();
        login_admin(&mut m, "c1");
        assert_eq!(
            m.relogin(&cid("c1"), None),
            Err(SessionError::InvalidParams)
        );
        assert_eq!(m.store().len(), 1);
    }

    #[test]
    fn test_relogin_unknown_key_is_invalid() {
        let (mut m, _rx) = manager();
        login_admin(&mut m, "c1");

        let err = m
            .relogin(&cid("c1"), Some(ReloginKey("made-up".into())))
            .unwrap_err();

        assert_eq!(err, SessionError::InvalidReloginKey);
        assert_eq!(m.store().len(), 1, "unknown key must not dispose anything");
    }

    #[test]
    fn test_relogin_replayed_key_disposes_session() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        let k2 = m.relogin(&cid("c1"), Some(k1.clone())).unwrap();
        drain(&mut rx);

        assert_eq!(
            m.relogin(&cid("c1"), Some(k1)),
            Err(SessionError::InvalidReloginKey)
        );
        // The key that was current is dead too.
        assert_eq!(
            m.relogin(&cid("c1"), Some(k2)),
            Err(SessionError::InvalidReloginKey)
        );

        assert!(m.store().is_empty());
        assert_eq!(m.store().key_count(), 0);
        assert_eq!(m.store().connection_count(), 0);
        assert_eq!(m.scheduler_mut().pending(), 0);
        assert_eq!(
            drain(&mut rx),
            vec![
                Notification::UserChanged {
                    cid: cid("c1"),
                    values: UserView::anonymous(),
                },
                Notification::Token {
                    cid: cid("c1"),
                    token: None,
                },
            ]
        );
    }

    #[test]
    fn test_relogin_from_new_connection_moves_binding() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        drain(&mut rx);

        m.relogin(&cid("c2"), Some(k1)).unwrap();

        let notes = drain(&mut rx);
        assert_eq!(
            notes[0],
            Notification::Token {
                cid: cid("c1"),
                token: None,
            }
        );
        assert!(matches!(&notes[1], Notification::Token { cid: c, token: Some(_) } if c == &cid("c2")));
        assert!(matches!(&notes[2], Notification::UserChanged { cid: c, .. } if c == &cid("c2")));
        assert_eq!(notes.len(), 3);

        assert!(m.current_user(&cid("c1")).is_anonymous());
        assert_eq!(m.current_user(&cid("c2")).id, Some(1));
        assert_eq!(m.store().connection_count(), 1);
    }

    #[test]
    fn test_relogin_onto_connection_of_other_session_evicts_it() {
        let (mut m, _rx) = manager();
        let admin_key = login_admin(&mut m, "c1");
        m.login(&cid("c2"), creds("john", "john"), false).unwrap();

        m.relogin(&cid("c2"), Some(admin_key)).unwrap();

        assert_eq!(m.current_user(&cid("c2")).id, Some(1));
        assert!(m.current_user(&cid("c1")).is_anonymous());
        assert_eq!(m.store().len(), 2);
        assert_eq!(m.store().connection_count(), 1);

        // John's session is still alive, just unbound.
        assert!(!m.logout(&cid("c1")));
    }

    #[test]
    fn test_relogin_resets_expiry() {
        let (mut m, _rx) = manager();
        let k1 = login_admin(&mut m, "c1");

        for expiry in m.scheduler_mut().advance(Duration::from_secs(90)) {
            m.expire(expiry);
        }
        m.relogin(&cid("c1"), Some(k1)).unwrap();
        assert_eq!(m.scheduler_mut().pending(), 1);

        // 90 + 90 is past the first deadline but not the renewed one.
        for expiry in m.scheduler_mut().advance(Duration::from_secs(90)) {
            m.expire(expiry);
        }
        assert_eq!(m.store().len(), 1);
    }

    // -- logout ------------------------------------------------------------

    #[test]
    fn test_logout_unbound_connection_is_noop() {
        let (mut m, mut rx) = manager();
        login_admin(&mut m, "c1");
        drain(&mut rx);

        assert!(!m.logout(&cid("c2")));
        assert_eq!(m.store().len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_logout_disposes_bound_session() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        drain(&mut rx);

        assert!(m.logout(&cid("c1")));

        assert!(m.store().is_empty());
        assert_eq!(m.scheduler_mut().pending(), 0);
        assert_eq!(drain(&mut rx).len(), 2);
        assert_eq!(
            m.relogin(&cid("c1"), Some(k1)),
            Err(SessionError::InvalidReloginKey)
        );
        assert!(!m.logout(&cid("c1")));
    }

    // -- expiry ------------------------------------------------------------

    #[test]
    fn test_expire_without_relogin_disposes_session() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        drain(&mut rx);

        assert!(m.scheduler_mut().advance(EXPIRE - Duration::from_secs(1)).is_empty());
        let fired = m.scheduler_mut().advance(Duration::from_secs(1));
        assert_eq!(fired.len(), 1);
        assert!(m.expire(fired[0].clone()));

        assert!(m.store().is_empty());
        assert!(m.current_user(&cid("c1")).is_anonymous());
        assert!(drain(&mut rx).contains(&Notification::Token {
            cid: cid("c1"),
            token: None,
        }));
        assert_eq!(
            m.relogin(&cid("c1"), Some(k1)),
            Err(SessionError::InvalidReloginKey)
        );
    }

    #[test]
    fn test_expire_in_flight_timer_after_renewal_is_ignored() {
        let (mut m, _rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        let stale = Expiry {
            session_id: m.store().get_by_key(&k1).unwrap().session_id.clone(),
            timer: m.store().get_by_key(&k1).unwrap().timer().unwrap(),
        };

        m.relogin(&cid("c1"), Some(k1)).unwrap();

        assert!(!m.expire(stale));
        assert_eq!(m.store().len(), 1);
    }

    #[test]
    fn test_expire_after_dispose_is_ignored() {
        let (mut m, mut rx) = manager();
        let k1 = login_admin(&mut m, "c1");
        let session = m.store().get_by_key(&k1).unwrap();
        let stale = Expiry {
            session_id: session.session_id.clone(),
            timer: session.timer().unwrap(),
        };
        m.logout(&cid("c1"));
        drain(&mut rx);

        assert!(!m.expire(stale));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_releases_fired_tokio_timers() {
        let (notifier, _rx) = ChannelNotifier::new();
        let (scheduler, mut expiries) = TokioScheduler::new();
        let mut m = SessionManager::new(
            SessionConfig::default(),
            StaticDirectory::demo(),
            notifier,
            scheduler,
        );
        for i in 0..10 {
            m.login(&cid(&format!("c{i}")), creds("guest", "guest"), false)
                .unwrap();
        }
        assert_eq!(m.scheduler_mut().armed(), 10);

        tokio::time::sleep(EXPIRE + Duration::from_secs(1)).await;
        let mut expired = 0;
        while let Ok(expiry) = expiries.try_recv() {
            assert!(m.expire(expiry));
            expired += 1;
        }

        assert_eq!(expired, 10);
        assert!(m.store().is_empty());
        assert_eq!(m.scheduler_mut().armed(), 0);
    }

    // -- read-only queries ---------------------------------------------------

    #[test]
    fn test_current_user_does_not_touch_timers() {
        let (mut m, _rx) = manager();
        login_admin(&mut m, "c1");
        let timer = m.store().get_by_connection(&cid("c1")).unwrap().timer();

        let view = m.current_user(&cid("c1"));

        assert_eq!(view.name.as_deref(), Some("Administrator"));
        assert_eq!(m.store().get_by_connection(&cid("c1")).unwrap().timer(), timer);
        assert!(m.current_user(&cid("other")).is_anonymous());
    }

    #[test]
    fn test_authorize_only_own_connection() {
        assert!(authorize(&cid("c1"), &cid("c1")));
        assert!(!authorize(&cid("c1"), &cid("c2")));
    }

    #[test]
    fn test_dispose_all_clears_every_session() {
        let (mut m, mut rx) = manager();
        login_admin(&mut m, "c1");
        m.login(&cid("c2"), creds("guest", "guest"), false).unwrap();
        drain(&mut rx);

        assert_eq!(m.dispose_all(), 2);

        assert!(m.store().is_empty());
        assert_eq!(m.scheduler_mut().pending(), 0);
        let cleared: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::Token { token: None, .. }))
            .collect();
        assert_eq!(cleared.len(), 2);
    }

    /// login → K1, relogin(K1) → K2, relogin(K1) fails and kills K2.
    #[test]
    fn test_relogin_scenario_replay_kills_current_key() {
        let (mut m, _rx) = manager();
        let k1 = m.login(&cid("c1"), creds("admin", "admin"), false).unwrap();
        let k2 = m.relogin(&cid("c1"), Some(k1.clone())).unwrap();

        assert!(m.relogin(&cid("c1"), Some(k1)).is_err());
        assert_eq!(
            m.relogin(&cid("c1"), Some(k2)),
            Err(SessionError::InvalidReloginKey)
        );
    }
}
