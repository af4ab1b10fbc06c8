//! Error types for the session layer.

use turnstile_protocol::ResError;

/// Errors returned by session lifecycle operations.
///
/// Every variant is a per-request failure: the store is left consistent
/// and nothing is retried. The first four map one-to-one onto the error
/// codes clients see (see [`SessionError::to_res_error`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Login was attempted on a connection that already holds a token.
    /// The client has to log out first.
    #[error("connection is already logged in")]
    AlreadyAuthenticated,

    /// Required request fields are missing or have the wrong type.
    #[error("invalid parameters")]
    InvalidParams,

    /// Unknown user or wrong password. The two cases are deliberately
    /// indistinguishable.
    #[error("wrong username or password")]
    WrongCredentials,

    /// The relogin key is unknown, expired, or has already been used.
    #[error("invalid relogin key")]
    InvalidReloginKey,

    /// The session service task is gone (shut down or panicked).
    #[error("session service unavailable")]
    Unavailable,
}

impl SessionError {
    /// Converts the error into the wire error object sent to clients.
    pub fn to_res_error(&self) -> ResError {
        match self {
            Self::AlreadyAuthenticated => ResError::already_logged_in(),
            Self::InvalidParams => ResError::invalid_params(),
            Self::WrongCredentials => ResError::wrong_username_password(),
            Self::InvalidReloginKey => ResError::invalid_relogin_key(),
            Self::Unavailable => ResError::internal("session service unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_res_error_codes() {
        let cases = [
            (SessionError::AlreadyAuthenticated, "session.alreadyLoggedIn"),
            (SessionError::InvalidParams, "system.invalidParams"),
            (SessionError::WrongCredentials, "session.wrongUsernamePassword"),
            (SessionError::InvalidReloginKey, "session.invalidReloginKey"),
            (SessionError::Unavailable, "system.internalError"),
        ];
        for (err, code) in cases {
            assert_eq!(err.to_res_error().code, code, "{err}");
        }
    }
}
