// Session persistence module
// Handles saving, loading and clearing the authenticated session on disk

use super::session::Session;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Error types for persistence operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// File I/O error
    IoError(String),
    /// JSON serialization/deserialization error
    JsonError(String),
    /// Invalid data format
    InvalidData(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(msg) => write!(f, "IO Error: {}", msg),
            PersistenceError::JsonError(msg) => write!(f, "JSON Error: {}", msg),
            PersistenceError::InvalidData(msg) => write!(f, "Invalid Data: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Current on-disk format version
const SESSION_FORMAT_VERSION: u32 = 1;

/// Serializable structure for the session record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    /// Version of the record format (for future migration support)
    version: u32,
    /// The persisted session
    session: Session,
}

/// Durable storage for the one authenticated session
///
/// A missing file means nobody is signed in.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store backed by the given file
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save the session, replacing any previous one
    pub fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        let record = SessionRecord {
            version: SESSION_FORMAT_VERSION,
            session: session.clone(),
        };

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| PersistenceError::JsonError(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PersistenceError::IoError(e.to_string()))?;
            }
        }
        fs::write(&self.path, json).map_err(|e| PersistenceError::IoError(e.to_string()))?;

        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    /// Load the session, if one is stored
    pub fn load(&self) -> Result<Option<Session>, PersistenceError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::IoError(e.to_string())),
        };

        let record: SessionRecord =
            serde_json::from_str(&json).map_err(|e| PersistenceError::JsonError(e.to_string()))?;

        if record.version != SESSION_FORMAT_VERSION {
            return Err(PersistenceError::InvalidData(format!(
                "Unsupported session version: {}",
                record.version
            )));
        }

        Ok(Some(record.session))
    }

    /// Remove the stored session
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::IoError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> Session {
        Session {
            user_id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            avatar: None,
            auth_token: "jwt-token".to_string(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));

        store.save(&session()).unwrap();

        // A fresh store over the same file sees the same session (simulated reload)
        let reloaded = SessionStore::new(store.path().to_path_buf());
        assert_eq!(reloaded.load().unwrap(), Some(session()));
    }

    #[test]
    fn test_load_missing_file_is_anonymous() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.save(&session()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let record = SessionRecord {
            version: 2,
            session: session(),
        };
        fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        let err = SessionStore::new(path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidData(_)));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SessionStore::new(path).load(),
            Err(PersistenceError::JsonError(_))
        ));
    }
}
