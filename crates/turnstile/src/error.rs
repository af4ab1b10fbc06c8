//! Unified error type for the Turnstile service.

use turnstile_protocol::ProtocolError;
use turnstile_session::SessionError;
use turnstile_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors, so code in
/// this crate deals with a single error type.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed subject).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No reply arrived on the inbox before the deadline.
    #[error("request on {0} timed out")]
    RequestTimeout(String),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let turnstile_err: TurnstileError = err.into();
        assert!(matches!(turnstile_err, TurnstileError::Transport(_)));
        assert!(turnstile_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let turnstile_err: TurnstileError = err.into();
        assert!(matches!(turnstile_err, TurnstileError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let turnstile_err: TurnstileError = SessionError::Unavailable.into();
        assert!(matches!(turnstile_err, TurnstileError::Session(_)));
        assert_eq!(turnstile_err.to_string(), "session service unavailable");
    }

    #[test]
    fn test_request_timeout_names_subject() {
        let err = TurnstileError::RequestTimeout("auth.session.login".into());
        assert_eq!(err.to_string(), "request on auth.session.login timed out");
    }
}
