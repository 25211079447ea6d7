//! File-backed session store
//!
//! Persists the session as a JSON document so that a login survives process
//! restarts. Reads are served from memory; every write replaces the file
//! atomically while the write lock is held, so the file and the in-memory
//! value change in the same order.

use crate::atomic_writer::AtomicWriter;
use partsdesk_core::{Error, Result, Session, SessionStore};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    inner: RwLock<Option<Session>>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading a previously saved session if any.
    ///
    /// A missing file means "logged out". A file that cannot be parsed is
    /// logged and ignored; the next save overwrites it.
    ///
    /// # Errors
    /// - `Error::Io` if the file exists but cannot be read
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let session = Self::load(&path)?;

        debug!(
            "Opened session store at {} (session present: {})",
            path.display(),
            session.is_some()
        );

        Ok(Self {
            path,
            inner: RwLock::new(session),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<Option<Session>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable session file {}: {}",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let contents = serde_json::to_vec_pretty(session)?;
        let mut writer = AtomicWriter::new(&self.path)?;
        writer.write(&contents)?;
        writer.commit()?;
        Ok(())
    }

    fn remove_file(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::SessionStore(format!(
                "Failed to remove session file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn session(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, session: Session) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&session)?;
        *guard = Some(session);
        info!("Session saved to {}", self.path.display());
        Ok(())
    }

    fn update_credentials(&self, token: Option<&str>, expires_at: Option<&str>) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = guard.as_ref() else {
            debug!("Ignoring credential update without an active session");
            return Ok(());
        };

        let mut updated = current.clone();
        updated.apply_credentials(token, expires_at);
        if &updated == current {
            return Ok(());
        }

        self.persist(&updated)?;
        *guard = Some(updated);
        Ok(())
    }

    fn clear_session(&self) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
        self.remove_file()?;
        info!("Session cleared ({})", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_session() -> Session {
        Session::new("tok-1")
            .with_expiry("2030-01-01T00:00:00Z")
            .with_role("technician")
            .with_user_id("u-1")
            .with_secondary_id("tech-7")
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(temp_dir.path().join("session.json")).unwrap();
        assert_eq!(store.session(), None);
    }

    #[test]
    fn test_save_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.save(sample_session()).unwrap();
        drop(store);

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.session(), Some(sample_session()));
    }

    #[test]
    fn test_update_credentials_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.save(sample_session()).unwrap();
        store
            .update_credentials(Some("tok-2"), Some("2031-01-01T00:00:00Z"))
            .unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        let session = reopened.session().unwrap();
        assert_eq!(session.token, "tok-2");
        assert_eq!(session.expires_at.as_deref(), Some("2031-01-01T00:00:00Z"));
        assert_eq!(session.secondary_id.as_deref(), Some("tech-7"));
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.save(sample_session()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_update_without_session_does_not_create_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.update_expiry("2031-01-01T00:00:00Z").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        store.save(sample_session()).unwrap();
        assert!(path.exists());

        store.clear_session().unwrap();
        assert!(!path.exists());
        assert_eq!(store.session(), None);

        // Clearing twice is fine
        store.clear_session().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.session(), None);

        store.save(sample_session()).unwrap();
        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.session(), Some(sample_session()));
    }
}
