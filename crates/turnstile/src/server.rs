//! `TurnstileServer` builder and server loop.
//!
//! This is the entry point for running a Turnstile server. It ties the
//! layers together: transport → bus → responder → session service.

use std::future::Future;
use std::net::SocketAddr;

use serde_json::Value;
use tokio::task::JoinHandle;
use turnstile_protocol::JsonCodec;
use turnstile_session::{
    SessionConfig, SessionHandle, SessionService, StaticDirectory,
    UserDirectory,
};
use turnstile_transport::{Transport, WebSocketTransport};

use crate::handler::handle_peer;
use crate::{Bus, BusNotifier, Responder, ServerConfig, TurnstileError};

/// Builder for configuring and starting a Turnstile server.
///
/// # Example
///
/// ```rust,no_run
/// use turnstile::prelude::*;
///
/// # async fn start() -> Result<(), TurnstileError> {
/// let server = TurnstileServer::builder()
///     .bind("0.0.0.0:8080")
///     .directory(StaticDirectory::demo())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TurnstileServerBuilder<D = StaticDirectory> {
    config: ServerConfig,
    directory: D,
}

impl TurnstileServerBuilder<StaticDirectory> {
    /// Creates a builder with default settings and the demo users.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            directory: StaticDirectory::demo(),
        }
    }
}

impl Default for TurnstileServerBuilder<StaticDirectory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: UserDirectory> TurnstileServerBuilder<D> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets where usernames and passwords are checked.
    pub fn directory<D2: UserDirectory>(self, directory: D2) -> TurnstileServerBuilder<D2> {
        TurnstileServerBuilder {
            config: self.config,
            directory,
        }
    }

    /// Binds the listener and starts the session service and responder.
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> Result<TurnstileServer, TurnstileError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let bus = Bus::new();
        let sessions = SessionService::spawn(
            self.config.session.clone(),
            self.directory,
            BusNotifier::new(bus.clone()),
        );
        let responder = Responder::new(bus.clone(), sessions.clone()).spawn()?;

        Ok(TurnstileServer {
            transport,
            bus,
            sessions,
            responder,
            config: self.config,
        })
    }
}

/// A Turnstile server, bound and ready.
///
/// Call [`run()`](Self::run) to start accepting peers.
pub struct TurnstileServer {
    transport: WebSocketTransport,
    bus: Bus,
    sessions: SessionHandle,
    responder: JoinHandle<()>,
    config: ServerConfig,
}

impl TurnstileServer {
    /// Creates a new builder.
    pub fn builder() -> TurnstileServerBuilder {
        TurnstileServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The bus, for in-process collaborators.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The session service.
    pub fn sessions(&self) -> &SessionHandle {
        &self.sessions
    }

    /// Sends a request on the bus using the configured request timeout.
    pub async fn request(&self, subject: &str, data: Value) -> Result<Value, TurnstileError> {
        self.bus
            .request(subject, data, self.config.request_timeout)
            .await
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TurnstileError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then disposes
    /// every session so their connections get their tokens cleared.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TurnstileError> {
        tracing::info!(addr = %self.config.bind_addr, "Turnstile server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let bus = self.bus.clone();
                        let idle = self.config.peer_idle_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_peer(conn, bus, JsonCodec, idle).await {
                                tracing::debug!(error = %e, "peer ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Turnstile server shutting down");
        let disposed = self.sessions.shutdown().await?;
        self.responder.abort();
        tracing::info!(disposed, "Turnstile server stopped");
        Ok(())
    }
}
