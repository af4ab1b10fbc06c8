//! The session service: a Tokio task that owns the [`SessionManager`].
//!
//! Every lifecycle operation and every timer expiry is processed by this
//! one task, one at a time. That single-writer loop is what makes the
//! manager's multi-step updates atomic to everyone else; callers only
//! ever hold a [`SessionHandle`].

use tokio::sync::{mpsc, oneshot};
use turnstile_protocol::{ConnectionId, LoginParams, ReloginKey, UserView};

use crate::manager::authorize;
use crate::{
    Expiry, Notifier, SessionConfig, SessionError, SessionManager,
    TokioScheduler, UserDirectory,
};

/// Command channel capacity. Senders wait when it is full.
const CHANNEL_SIZE: usize = 256;

type Reply<T> = oneshot::Sender<T>;

/// Commands sent to the service task. Each carries a reply channel.
enum SessionCommand {
    Login {
        cid: ConnectionId,
        params: Option<LoginParams>,
        has_token: bool,
        reply: Reply<Result<ReloginKey, SessionError>>,
    },
    Relogin {
        cid: ConnectionId,
        key: Option<ReloginKey>,
        reply: Reply<Result<ReloginKey, SessionError>>,
    },
    Logout {
        cid: ConnectionId,
        reply: Reply<bool>,
    },
    CurrentUser {
        cid: ConnectionId,
        reply: Reply<UserView>,
    },
    SessionCount {
        reply: Reply<usize>,
    },
    Shutdown {
        reply: Reply<usize>,
    },
}

/// Handle to the running session service.
///
/// Cheap to clone: it's an `mpsc::Sender` wrapper. Once the service has
/// shut down, every call returns [`SessionError::Unavailable`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Login { .. } => "Login",
            Self::Relogin { .. } => "Relogin",
            Self::Logout { .. } => "Logout",
            Self::CurrentUser { .. } => "CurrentUser",
            Self::SessionCount { .. } => "SessionCount",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    /// Password login for `cid`. See [`SessionManager::login`].
    pub async fn login(
        &self,
        cid: ConnectionId,
        params: Option<LoginParams>,
        has_token: bool,
    ) -> Result<ReloginKey, SessionError> {
        self.call(|reply| SessionCommand::Login {
            cid,
            params,
            has_token,
            reply,
        })
        .await?
    }

    /// Redeems a relogin key for `cid`. See [`SessionManager::relogin`].
    pub async fn relogin(
        &self,
        cid: ConnectionId,
        key: Option<ReloginKey>,
    ) -> Result<ReloginKey, SessionError> {
        self.call(|reply| SessionCommand::Relogin { cid, key, reply })
            .await?
    }

    /// Logs out whatever session is bound to `cid`. Returns whether one
    /// was disposed.
    pub async fn logout(&self, cid: ConnectionId) -> Result<bool, SessionError> {
        self.call(|reply| SessionCommand::Logout { cid, reply }).await
    }

    /// The identity bound to `cid`, or the anonymous view.
    pub async fn current_user(
        &self,
        cid: ConnectionId,
    ) -> Result<UserView, SessionError> {
        self.call(|reply| SessionCommand::CurrentUser { cid, reply })
            .await
    }

    /// Whether `cid` may read the user model of `subject_cid`. Needs no
    /// session state, so it is answered without a round trip.
    pub fn authorize(&self, cid: &ConnectionId, subject_cid: &ConnectionId) -> bool {
        authorize(cid, subject_cid)
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> Result<usize, SessionError> {
        self.call(|reply| SessionCommand::SessionCount { reply }).await
    }

    /// Disposes every session and stops the service. Returns how many
    /// sessions were disposed.
    pub async fn shutdown(&self) -> Result<usize, SessionError> {
        self.call(|reply| SessionCommand::Shutdown { reply }).await
    }

    /// Returns `true` once the service task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

/// The service task's state.
pub struct SessionService<D, N> {
    manager: SessionManager<D, N, TokioScheduler>,
    commands: mpsc::Receiver<SessionCommand>,
    expiries: mpsc::UnboundedReceiver<Expiry>,
}

impl<D, N> SessionService<D, N>
where
    D: UserDirectory,
    N: Notifier,
{
    /// Spawns the service on the current Tokio runtime and returns a
    /// handle to it.
    pub fn spawn(config: SessionConfig, directory: D, notifier: N) -> SessionHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        let (scheduler, expiries) = TokioScheduler::new();

        let service = Self {
            manager: SessionManager::new(config, directory, notifier, scheduler),
            commands: rx,
            expiries,
        };
        tokio::spawn(service.run());

        SessionHandle { sender: tx }
    }

    async fn run(mut self) {
        tracing::info!("session service started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle is gone.
                        self.manager.dispose_all();
                        break;
                    };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                Some(expiry) = self.expiries.recv() => {
                    self.manager.expire(expiry);
                }
            }
        }

        tracing::info!("session service stopped");
    }

    /// Processes one command. Returns `false` when the service should stop.
    fn handle(&mut self, cmd: SessionCommand) -> bool {
        tracing::trace!(command = ?cmd, "session command");
        match cmd {
            SessionCommand::Login {
                cid,
                params,
                has_token,
                reply,
            } => {
                let _ = reply.send(self.manager.login(&cid, params, has_token));
            }
            SessionCommand::Relogin { cid, key, reply } => {
                let _ = reply.send(self.manager.relogin(&cid, key));
            }
            SessionCommand::Logout { cid, reply } => {
                let _ = reply.send(self.manager.logout(&cid));
            }
            SessionCommand::CurrentUser { cid, reply } => {
                let _ = reply.send(self.manager.current_user(&cid));
            }
            SessionCommand::SessionCount { reply } => {
                let _ = reply.send(self.manager.store().len());
            }
            SessionCommand::Shutdown { reply } => {
                tracing::info!("session service shutting down");
                let _ = reply.send(self.manager.dispose_all());
                return false;
            }
        }
        true
    }
}
