//! Subject names and wildcard matching.
//!
//! Subjects are dot-separated tokens. Subscription patterns may use `*`
//! to match exactly one token and `>` (last token only) to match one or
//! more trailing tokens:
//!
//! ```text
//! auth.session.*         matches  auth.session.login
//! event.session.user.>   matches  event.session.user.c1.change
//! ```

use crate::{ConnectionId, ProtocolError};

/// Password login.
pub const LOGIN: &str = "auth.session.login";
/// Relogin with a previously issued key.
pub const RELOGIN: &str = "auth.session.relogin";
/// Logout of the connection's session.
pub const LOGOUT: &str = "auth.session.logout";

/// Every auth method of the session service.
pub const AUTH_METHODS: &str = "auth.session.*";
/// Access checks on per-connection user models.
pub const ACCESS_USER: &str = "access.session.user.*";
/// Gets of per-connection user models.
pub const GET_USER: &str = "get.session.user.*";

const AUTH_PREFIX: &str = "auth.session.";
const ACCESS_USER_PREFIX: &str = "access.session.user.";
const GET_USER_PREFIX: &str = "get.session.user.";

/// `conn.{cid}.token`: sets or clears a connection's access token.
pub fn token(cid: &ConnectionId) -> String {
    format!("conn.{cid}.token")
}

/// `event.session.user.{cid}.change`: the user model of a connection changed.
pub fn user_change(cid: &ConnectionId) -> String {
    format!("event.session.user.{cid}.change")
}

/// `access.session.user.{cid}`
pub fn access_user(cid: &ConnectionId) -> String {
    format!("{ACCESS_USER_PREFIX}{cid}")
}

/// `get.session.user.{cid}`
pub fn get_user(cid: &ConnectionId) -> String {
    format!("{GET_USER_PREFIX}{cid}")
}

/// Returns the method name of an `auth.session.{method}` subject.
pub fn auth_method(subject: &str) -> Option<&str> {
    single_token(subject.strip_prefix(AUTH_PREFIX)?)
}

/// Returns the connection a user-model resource belongs to, for both the
/// `access.session.user.{cid}` and `get.session.user.{cid}` subjects.
pub fn user_resource_cid(subject: &str) -> Option<ConnectionId> {
    let rest = subject
        .strip_prefix(ACCESS_USER_PREFIX)
        .or_else(|| subject.strip_prefix(GET_USER_PREFIX))?;
    single_token(rest).map(ConnectionId::from)
}

/// Returns `true` if `cid` can stand as one token of a subject, so the
/// per-connection subjects built from it are publishable.
pub fn is_valid_cid(cid: &ConnectionId) -> bool {
    single_token(&cid.0).is_some() && validate(&cid.0, false).is_ok()
}

fn single_token(rest: &str) -> Option<&str> {
    if rest.is_empty() || rest.contains('.') {
        None
    } else {
        Some(rest)
    }
}

/// Checks that a subject (or, with `allow_wildcards`, a pattern) is well
/// formed: non-empty tokens, no whitespace, and `>` only as the last token.
pub fn validate(subject: &str, allow_wildcards: bool) -> Result<(), ProtocolError> {
    let invalid = |why: &str| -> Result<(), ProtocolError> {
        Err(ProtocolError::InvalidMessage(format!(
            "subject {subject:?}: {why}"
        )))
    };

    if subject.is_empty() {
        return invalid("empty");
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return invalid("empty token");
        }
        if token.chars().any(char::is_whitespace) {
            return invalid("whitespace");
        }
        let wildcard = *token == "*" || *token == ">";
        if wildcard && !allow_wildcards {
            return invalid("wildcards not allowed");
        }
        if *token == ">" && i + 1 != tokens.len() {
            return invalid("'>' must be the last token");
        }
    }
    Ok(())
}

/// Returns `true` if `subject` matches the subscription `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    #[test]
    fn test_builders_produce_expected_subjects() {
        assert_eq!(token(&cid("c1")), "conn.c1.token");
        assert_eq!(user_change(&cid("c1")), "event.session.user.c1.change");
        assert_eq!(access_user(&cid("c1")), "access.session.user.c1");
        assert_eq!(get_user(&cid("c1")), "get.session.user.c1");
    }

    #[test]
    fn test_auth_method_extracts_last_token() {
        assert_eq!(auth_method(LOGIN), Some("login"));
        assert_eq!(auth_method(RELOGIN), Some("relogin"));
        assert_eq!(auth_method("auth.session.a.b"), None);
        assert_eq!(auth_method("auth.other.login"), None);
    }

    #[test]
    fn test_user_resource_cid_for_access_and_get() {
        assert_eq!(
            user_resource_cid("access.session.user.abc"),
            Some(cid("abc"))
        );
        assert_eq!(user_resource_cid("get.session.user.abc"), Some(cid("abc")));
        assert_eq!(user_resource_cid("get.session.user."), None);
        assert_eq!(user_resource_cid("get.session.user.a.b"), None);
        assert_eq!(user_resource_cid("get.session.other.abc"), None);
    }

    #[test]
    fn test_is_valid_cid_rejects_non_tokens() {
        assert!(is_valid_cid(&cid("c1")));
        assert!(is_valid_cid(&cid("bdt0q2c8m5ou")));
        assert!(!is_valid_cid(&cid("")));
        assert!(!is_valid_cid(&cid("a.b")));
        assert!(!is_valid_cid(&cid("a b")));
        assert!(!is_valid_cid(&cid("*")));
        assert!(!is_valid_cid(&cid(">")));
    }

    #[test]
    fn test_matches_literal() {
        assert!(matches("auth.session.login", "auth.session.login"));
        assert!(!matches("auth.session.login", "auth.session.logout"));
        assert!(!matches("auth.session", "auth.session.login"));
        assert!(!matches("auth.session.login", "auth.session"));
    }

    #[test]
    fn test_matches_single_token_wildcard() {
        assert!(matches(AUTH_METHODS, "auth.session.relogin"));
        assert!(matches("conn.*.token", "conn.c9.token"));
        assert!(!matches(AUTH_METHODS, "auth.session.a.b"));
        assert!(!matches(AUTH_METHODS, "auth.session"));
    }

    #[test]
    fn test_matches_tail_wildcard() {
        assert!(matches("event.>", "event.session.user.c1.change"));
        assert!(!matches("event.>", "event"));
        assert!(matches(">", "anything.at.all"));
    }

    #[test]
    fn test_validate_subjects_and_patterns() {
        assert!(validate("conn.c1.token", false).is_ok());
        assert!(validate("conn.*.token", true).is_ok());
        assert!(validate("conn.*.token", false).is_err());
        assert!(validate("event.>.x", true).is_err());
        assert!(validate("a..b", true).is_err());
        assert!(validate("", true).is_err());
        assert!(validate("a b", true).is_err());
    }
}
