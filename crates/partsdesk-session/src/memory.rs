//! In-memory session store

use partsdesk_core::{Result, Session, SessionStore};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Session store backed by a single lock-guarded slot
///
/// Token and expiry live in the same [`Session`] value behind one lock, so an
/// update of both is observed atomically.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that starts with the given session
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn session(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, session: Session) -> Result<()> {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    fn update_credentials(&self, token: Option<&str>, expires_at: Option<&str>) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(session) => session.apply_credentials(token, expires_at),
            None => debug!("Ignoring credential update without an active session"),
        }
        Ok(())
    }

    fn clear_session(&self) -> Result<()> {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
