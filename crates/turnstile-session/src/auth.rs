//! Password verification hook.
//!
//! The session layer doesn't own user accounts. It asks a
//! [`UserDirectory`] whether a username/password pair is valid and gets
//! back the [`User`] to attach to the new session.
//!
//! [`StaticDirectory`] is an in-memory table, good for demos and tests.
//! Passwords are compared as plain strings; hashing and storage
//! hardening belong to whatever real directory replaces it.

use std::collections::HashMap;

use turnstile_protocol::User;

use crate::SessionError;

/// Verifies credentials and returns the matching identity.
///
/// # Trait bounds
///
/// - `Send` → the directory moves into the session service task.
/// - `'static` → it lives as long as the service.
///
/// # Contract
///
/// Implementations must return [`SessionError::WrongCredentials`] both
/// for unknown usernames and for wrong passwords, so that a caller can't
/// probe which usernames exist.
///
/// # Example
///
/// ```rust
/// use turnstile_protocol::User;
/// use turnstile_session::{SessionError, UserDirectory};
///
/// /// Lets exactly one user in.
/// struct SingleUser;
///
/// impl UserDirectory for SingleUser {
///     fn authenticate(&self, username: &str, password: &str) -> Result<User, SessionError> {
///         if username == "root" && password == "toor" {
///             Ok(User { id: 0, name: "Root".into(), role: "admin".into() })
///         } else {
///             Err(SessionError::WrongCredentials)
///         }
///     }
/// }
/// ```
pub trait UserDirectory: Send + 'static {
    /// Checks a username/password pair.
    fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, SessionError>;
}

/// A fixed, in-memory user table.
///
/// Usernames are matched case-insensitively; passwords exactly.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<String, (User, String)>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a user.
    pub fn with_user(mut self, username: &str, password: &str, user: User) -> Self {
        self.users
            .insert(username.to_lowercase(), (user, password.to_owned()));
        self
    }

    /// The demo accounts: `admin`, `guest`, `jane`, and `john`, each with
    /// a password equal to the username.
    pub fn demo() -> Self {
        let user = |id, name: &str, role: &str| User {
            id,
            name: name.to_owned(),
            role: role.to_owned(),
        };
        Self::new()
            .with_user("admin", "admin", user(1, "Administrator", "admin"))
            .with_user("guest", "guest", user(2, "Guest", "guest"))
            .with_user("jane", "jane", user(3, "Jane Doe", "user"))
            .with_user("john", "john", user(4, "John Doe", "user"))
    }

    /// Number of users in the table.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the table has no users.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticDirectory {
    fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        match self.users.get(&username.to_lowercase()) {
            Some((user, expected)) if expected == password => Ok(user.clone()),
            _ => Err(SessionError::WrongCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_directory_accepts_known_users() {
        let dir = StaticDirectory::demo();
        assert_eq!(dir.len(), 4);

        let admin = dir.authenticate("admin", "admin").unwrap();
        assert_eq!(admin.id, 1);
        assert_eq!(admin.role, "admin");

        let jane = dir.authenticate("jane", "jane").unwrap();
        assert_eq!(jane.name, "Jane Doe");
    }

    #[test]
    fn test_authenticate_username_is_case_insensitive() {
        let dir = StaticDirectory::demo();
        assert_eq!(dir.authenticate("ADMIN", "admin").unwrap().id, 1);
    }

    #[test]
    fn test_authenticate_password_is_case_sensitive() {
        let dir = StaticDirectory::demo();
        assert_eq!(
            dir.authenticate("admin", "ADMIN"),
            Err(SessionError::WrongCredentials)
        );
    }

    #[test]
    fn test_authenticate_unknown_user_and_wrong_password_are_identical() {
        let dir = StaticDirectory::demo();
        let unknown = dir.authenticate("mallory", "admin").unwrap_err();
        let wrong = dir.authenticate("admin", "nope").unwrap_err();
        assert_eq!(unknown, wrong);
        assert_eq!(unknown.to_string(), wrong.to_string());
    }
}
