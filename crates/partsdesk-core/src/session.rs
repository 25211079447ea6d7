//! Authenticated session model and the store contract
//!
//! The session store owns identity. Consumers outside this crate (the renewal
//! coordinator, the HTTP transport) only read the token and expiry and write
//! them back after a renewal; they never touch `role`, `user_id` or
//! `secondary_id`.

use serde::{Deserialize, Serialize};

use crate::Result;

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token sent on authenticated requests
    pub token: String,

    /// Expiry timestamp exactly as received from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Role-specific secondary identifier (technician or client record)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
}

impl Session {
    /// Create a session holding only a token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
            role: None,
            user_id: None,
            secondary_id: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: impl Into<String>) -> Self {
        self.expires_at = Some(expires_at.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_secondary_id(mut self, secondary_id: impl Into<String>) -> Self {
        self.secondary_id = Some(secondary_id.into());
        self
    }

    /// Whether the session carries a usable (non-blank) token
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Apply renewed credentials in place.
    ///
    /// The token is replaced only when a non-blank one is supplied.
    pub fn apply_credentials(&mut self, token: Option<&str>, expires_at: Option<&str>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = token.to_string();
        }
        if let Some(expires_at) = expires_at {
            self.expires_at = Some(expires_at.to_string());
        }
    }
}

/// Session store contract
///
/// All operations are synchronous. Implementations must make
/// [`SessionStore::update_credentials`] atomic with respect to readers: a
/// concurrent [`SessionStore::session`] observes either the old token and
/// expiry or both new values, never a mix.
pub trait SessionStore: Send + Sync {
    /// Snapshot of the current session, if any
    fn session(&self) -> Option<Session>;

    /// Replace the whole session (login)
    fn save(&self, session: Session) -> Result<()>;

    /// Update token and/or expiry together.
    ///
    /// A no-op when there is no session: an expiry without a token has no
    /// meaning.
    fn update_credentials(&self, token: Option<&str>, expires_at: Option<&str>) -> Result<()>;

    /// Forget the session (logout or authorization rejected)
    fn clear_session(&self) -> Result<()>;

    /// Current bearer token, if present and non-blank
    fn token(&self) -> Option<String> {
        self.session()
            .filter(Session::has_token)
            .map(|session| session.token)
    }

    /// Current expiry timestamp as stored
    fn expiry(&self) -> Option<String> {
        self.session().and_then(|session| session.expires_at)
    }

    fn update_token(&self, token: &str) -> Result<()> {
        self.update_credentials(Some(token), None)
    }

    fn update_expiry(&self, expires_at: &str) -> Result<()> {
        self.update_credentials(None, Some(expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_serde_uses_camel_case() {
        let session = Session::new("tok")
            .with_expiry("2025-01-01T00:00:00Z")
            .with_role("technician")
            .with_user_id("u1");

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["expiresAt"], "2025-01-01T00:00:00Z");
        assert_eq!(json["userId"], "u1");
        assert!(json.get("secondaryId").is_none());

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_has_token() {
        assert!(Session::new("abc").has_token());
        assert!(!Session::new("   ").has_token());
    }

    #[test]
    fn test_apply_credentials_extend_only() {
        let mut session = Session::new("old").with_expiry("t1");
        session.apply_credentials(None, Some("t2"));
        assert_eq!(session.token, "old");
        assert_eq!(session.expires_at.as_deref(), Some("t2"));
    }

    #[test]
    fn test_apply_credentials_rotate() {
        let mut session = Session::new("old").with_expiry("t1");
        session.apply_credentials(Some("new"), Some("t2"));
        assert_eq!(session.token, "new");
        assert_eq!(session.expires_at.as_deref(), Some("t2"));

        session.apply_credentials(Some("  "), None);
        assert_eq!(session.token, "new");
    }
}
