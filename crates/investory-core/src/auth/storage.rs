//! Durable backends for the persisted session record.
//!
//! The record is a single JSON document (`auth-storage`) holding
//! `isAuthenticated`, `user`, `accessToken` and `refreshToken`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use keyring::Entry;

use super::Session;

/// Name of the persisted session record
pub const RECORD_NAME: &str = "auth-storage";

/// Keychain service the keyring backend files the record under
const KEYRING_SERVICE: &str = "investory";

/// Where the session record lives between process runs.
///
/// `save` must be durable before it returns; the store relies on that to keep
/// memory and storage in step.
pub trait SessionStorage: Send + Sync {
    /// Read the persisted record, `None` if nothing has been stored
    fn load(&self) -> Result<Option<Session>>;

    /// Replace the persisted record
    fn save(&self, session: &Session) -> Result<()>;

    /// Remove the persisted record
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// File
// ============================================================================

/// JSON file in the cache directory
pub struct FileStorage {
    cache_dir: PathBuf,
}

impl FileStorage {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.json", RECORD_NAME))
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: Session = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;

        // Write then rename so a crash mid-write never leaves a torn record
        let path = self.session_path();
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Session record stored in the OS keychain
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, RECORD_NAME).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self) -> Result<Option<Session>> {
        match self.entry()?.get_password() {
            Ok(contents) => {
                let session = serde_json::from_str(&contents).context("Failed to parse keychain session record")?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keychain"),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let contents = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&contents)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-process record. Clones share the record, so a "restart" can be
/// simulated by opening a second store over a clone.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    record: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a raw record, as if written by an earlier run
    pub fn with_record(raw: impl Into<String>) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    /// Raw persisted JSON, if any
    pub fn raw(&self) -> Option<String> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>> {
        let record = self.record.lock().map_err(|_| anyhow!("Session record lock poisoned"))?;
        match record.as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw).context("Failed to parse session record")?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        let mut record = self.record.lock().map_err(|_| anyhow!("Session record lock poisoned"))?;
        *record = Some(raw);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut record = self.record.lock().map_err(|_| anyhow!("Session record lock poisoned"))?;
        *record = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;

    fn authenticated() -> Session {
        Session::authenticated(
            UserProfile {
                id: 1,
                login_id: "trader1".to_string(),
                email: "trader1@example.com".to_string(),
                nickname: "Bull".to_string(),
                gender: None,
                birth_year: None,
                wmti_type: None,
                phone: None,
                profile_image: None,
                level: None,
                experience: None,
                role: None,
            },
            "access-1".to_string(),
            Some("refresh-1".to_string()),
        )
    }

    #[test]
    fn test_file_storage_save_load_clear() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path().join("nested"));

        assert!(storage.load().expect("load empty").is_none());

        storage.save(&authenticated()).expect("save");
        let loaded = storage.load().expect("load").expect("record present");
        assert_eq!(loaded, authenticated());
        assert!(!dir.path().join("nested").join("auth-storage.json.tmp").exists());

        storage.clear().expect("clear");
        assert!(storage.load().expect("load after clear").is_none());
        // Clearing twice is fine
        storage.clear().expect("second clear");
    }

    #[test]
    fn test_file_storage_record_uses_camel_case_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path().to_path_buf());
        storage.save(&authenticated()).expect("save");

        let raw = std::fs::read_to_string(dir.path().join("auth-storage.json")).expect("read file");
        assert!(raw.contains("\"isAuthenticated\": true"));
        assert!(raw.contains("\"accessToken\": \"access-1\""));
        assert!(raw.contains("\"refreshToken\": \"refresh-1\""));
    }

    #[test]
    fn test_file_storage_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("auth-storage.json"), "{not json").expect("write");

        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(storage.load().is_err());
    }

    #[test]
    fn test_memory_storage_clones_share_record() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.save(&authenticated()).expect("save");
        assert_eq!(other.load().expect("load"), Some(authenticated()));

        other.clear().expect("clear");
        assert!(storage.raw().is_none());
    }
}
