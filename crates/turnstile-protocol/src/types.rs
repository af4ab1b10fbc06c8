//! Core payload types for Turnstile's auth protocol.
//!
//! Everything in here travels as JSON on the bus: identifiers, the request
//! bodies a gateway sends on behalf of a client connection, the replies the
//! session service returns, and the events it publishes when a connection's
//! identity changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The id a gateway assigns to one client connection (`cid` on the wire).
///
/// Opaque to the session service: it is only compared and used to build
/// per-connection subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifies a login session. Assigned once, never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single-use credential that lets a client resume its session.
///
/// Deliberately has no `Display` impl and a redacting `Debug`, so a key
/// cannot end up in a log line by accident.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReloginKey(pub String);

impl ReloginKey {
    /// Returns the raw key, for putting on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReloginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReloginKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub role: String,
}

/// The identity projection a client may read for its own connection.
///
/// Every field is `null` when the connection is not logged in. The fields
/// are always serialized, because clients diff this model field by field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserView {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl UserView {
    /// The all-null view of a connection with no session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns `true` if no identity is present.
    pub fn is_anonymous(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.role.is_none()
    }
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: Some(user.id),
            name: Some(user.name.clone()),
            role: Some(user.role.clone()),
        }
    }
}

/// The claim set handed to trusted services for a logged-in connection.
///
/// Clients never see this; the gateway attaches it to the requests it
/// forwards on the connection's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub sid: SessionId,
    pub user_id: u64,
    pub role: String,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `auth.session.*` requests.
///
/// `params` is kept as raw JSON: deciding whether it is well-formed is part
/// of each method's contract, and must happen after the token check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub cid: ConnectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// The access token the connection currently holds, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Value>,
}

impl AuthRequest {
    /// Returns `true` if the connection already carries an access token.
    /// An explicit `null` counts as no token.
    pub fn has_token(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_null())
    }
}

/// Body of `access.*` requests. Only the requesting connection matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub cid: ConnectionId,
}

/// Validated parameters of a password login.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
}

impl LoginParams {
    /// Extracts login parameters. Both fields must be JSON strings;
    /// anything else (missing, numbers, null) yields `None`.
    pub fn parse(params: Option<&Value>) -> Option<Self> {
        let value = params?;
        let username = value.get("username")?.as_str()?;
        let password = value.get("password")?.as_str()?;
        Some(Self {
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }
}

impl fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginParams")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Extracts the relogin key from `{ "reloginKey": "..." }`.
///
/// Returns `None` unless the key is a non-empty string.
pub fn parse_relogin_key(params: Option<&Value>) -> Option<ReloginKey> {
    let key = params?.get("reloginKey")?.as_str()?;
    if key.is_empty() {
        return None;
    }
    Some(ReloginKey(key.to_owned()))
}

// ---------------------------------------------------------------------------
// Results and events
// ---------------------------------------------------------------------------

/// Result of a successful login or relogin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub relogin_key: ReloginKey,
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResult {
    pub get: bool,
}

/// Result of a get request for the per-connection user model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    pub model: UserView,
}

/// Published on `conn.{cid}.token` to set (or clear, with `null`) the
/// connection's access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub token: Option<AccessToken>,
}

/// Published on `event.session.user.{cid}.change`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub values: UserView,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// A RES-style error object: `{ "code": "...", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResError {
    pub code: String,
    pub message: String,
}

impl ResError {
    pub const INVALID_PARAMS: &'static str = "system.invalidParams";
    pub const INVALID_REQUEST: &'static str = "system.invalidRequest";
    pub const METHOD_NOT_FOUND: &'static str = "system.methodNotFound";
    pub const INTERNAL_ERROR: &'static str = "system.internalError";
    pub const ALREADY_LOGGED_IN: &'static str = "session.alreadyLoggedIn";
    pub const WRONG_USERNAME_PASSWORD: &'static str =
        "session.wrongUsernamePassword";
    pub const INVALID_RELOGIN_KEY: &'static str = "session.invalidReloginKey";

    fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_owned(),
            message: message.to_owned(),
        }
    }

    pub fn invalid_params() -> Self {
        Self::new(Self::INVALID_PARAMS, "Invalid parameters")
    }

    pub fn invalid_request() -> Self {
        Self::new(Self::INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found() -> Self {
        Self::new(Self::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn internal(detail: &str) -> Self {
        Self::new(Self::INTERNAL_ERROR, &format!("Internal error: {detail}"))
    }

    pub fn already_logged_in() -> Self {
        Self::new(Self::ALREADY_LOGGED_IN, "Already logged in")
    }

    pub fn wrong_username_password() -> Self {
        Self::new(Self::WRONG_USERNAME_PASSWORD, "Wrong username or password")
    }

    pub fn invalid_relogin_key() -> Self {
        Self::new(Self::INVALID_RELOGIN_KEY, "Invalid relogin key")
    }
}

/// The reply to any request: `{ "result": ... }` or `{ "error": {...} }`.
///
/// Serde's default (externally tagged) enum representation produces
/// exactly these two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Result(Value),
    Error(ResError),
}

impl Reply {
    /// Builds a success reply from any serializable result.
    pub fn ok<T: Serialize>(result: &T) -> Result<Self, ProtocolError> {
        serde_json::to_value(result)
            .map(Reply::Result)
            .map_err(ProtocolError::Encode)
    }

    /// A success reply carrying `null`.
    pub fn null() -> Self {
        Reply::Result(Value::Null)
    }
}

impl From<ResError> for Reply {
    fn from(err: ResError) -> Self {
        Reply::Error(err)
    }
}

// =========================================================================
// Tests
// =========================================================================
