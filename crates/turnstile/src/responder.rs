//! Answers session requests arriving on the bus.
//!
//! | Subject                     | Request           | Result                 |
//! |-----------------------------|-------------------|------------------------|
//! | `auth.session.login`        | `AuthRequest`     | `{reloginKey}`         |
//! | `auth.session.relogin`      | `AuthRequest`     | `{reloginKey}`         |
//! | `auth.session.logout`       | `AuthRequest`     | `null`                 |
//! | `access.session.user.{cid}` | `AccessRequest`   | `{get: bool}`          |
//! | `get.session.user.{cid}`    | anything          | `{model: {id,name,role}}` |
//!
//! Requests are handled one at a time in arrival order.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use turnstile_protocol::{
    AccessRequest, AccessResult, AuthRequest, GetResult, LoginParams,
    LoginResult, Reply, ResError, parse_relogin_key, subject,
};
use turnstile_session::SessionHandle;

use crate::bus::Message;
use crate::{Bus, TurnstileError};

const AUTH: u64 = 0;
const ACCESS: u64 = 1;
const GET: u64 = 2;

/// Routes session requests from the bus to a [`SessionHandle`].
#[derive(Debug, Clone)]
pub struct Responder {
    bus: Bus,
    sessions: SessionHandle,
}

impl Responder {
    pub fn new(bus: Bus, sessions: SessionHandle) -> Self {
        Self { bus, sessions }
    }

    /// Subscribes to the session subjects and spawns the request loop.
    /// The loop ends when the session service stops.
    ///
    /// # Errors
    /// Returns an error if subscribing fails.
    pub fn spawn(self) -> Result<JoinHandle<()>, TurnstileError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registrations = [
            self.bus.subscribe_tagged(subject::AUTH_METHODS, AUTH, tx.clone())?,
            self.bus.subscribe_tagged(subject::ACCESS_USER, ACCESS, tx.clone())?,
            self.bus.subscribe_tagged(subject::GET_USER, GET, tx)?,
        ];

        Ok(tokio::spawn(async move {
            let _registrations = registrations;
            tracing::info!("session responder started");

            while let Some((tag, message)) = rx.recv().await {
                let reply = self.handle(tag, &message).await;
                self.respond(message.reply, &reply);
                if self.sessions.is_closed() {
                    break;
                }
            }

            tracing::info!("session responder stopped");
        }))
    }

    /// Computes the reply for one request.
    pub async fn handle(&self, tag: u64, message: &Message) -> Reply {
        let result = match tag {
            AUTH => self.auth(message).await,
            ACCESS => self.access(message),
            GET => self.get(message).await,
            _ => Err(ResError::method_not_found()),
        };
        result.unwrap_or_else(Reply::from)
    }

    async fn auth(&self, message: &Message) -> Result<Reply, ResError> {
        let method = subject::auth_method(&message.subject)
            .ok_or_else(ResError::method_not_found)?;
        let request: AuthRequest = decode(&message.data)?;
        if !subject::is_valid_cid(&request.cid) {
            tracing::debug!(cid = %request.cid, "auth request with unusable cid");
            return Err(ResError::invalid_params());
        }
        let cid = request.cid.clone();

        match method {
            "login" => {
                let params = LoginParams::parse(request.params.as_ref());
                let key = self
                    .sessions
                    .login(cid, params, request.has_token())
                    .await
                    .map_err(|e| e.to_res_error())?;
                ok(&LoginResult { relogin_key: key })
            }
            "relogin" => {
                let key = parse_relogin_key(request.params.as_ref());
                let key = self
                    .sessions
                    .relogin(cid, key)
                    .await
                    .map_err(|e| e.to_res_error())?;
                ok(&LoginResult { relogin_key: key })
            }
            "logout" => {
                self.sessions
                    .logout(cid)
                    .await
                    .map_err(|e| e.to_res_error())?;
                Ok(Reply::null())
            }
            other => {
                tracing::debug!(method = other, "unknown auth method");
                Err(ResError::method_not_found())
            }
        }
    }

    fn access(&self, message: &Message) -> Result<Reply, ResError> {
        let resource = subject::user_resource_cid(&message.subject)
            .ok_or_else(ResError::invalid_request)?;
        let request: AccessRequest = decode(&message.data)?;
        ok(&AccessResult {
            get: self.sessions.authorize(&request.cid, &resource),
        })
    }

    async fn get(&self, message: &Message) -> Result<Reply, ResError> {
        let resource = subject::user_resource_cid(&message.subject)
            .ok_or_else(ResError::invalid_request)?;
        let model = self
            .sessions
            .current_user(resource)
            .await
            .map_err(|e| e.to_res_error())?;
        ok(&GetResult { model })
    }

    fn respond(&self, reply_to: Option<String>, reply: &Reply) {
        let Some(reply_to) = reply_to else {
            return;
        };
        if let Err(e) = self.bus.publish_json(&reply_to, None, reply) {
            tracing::debug!(%reply_to, error = %e, "failed to publish reply");
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T, ResError> {
    T::deserialize(data).map_err(|e| {
        tracing::debug!(error = %e, "undecodable request");
        ResError::invalid_request()
    })
}

fn ok<T: Serialize>(result: &T) -> Result<Reply, ResError> {
    Reply::ok(result).map_err(|e| ResError::internal(&e.to_string()))
}
