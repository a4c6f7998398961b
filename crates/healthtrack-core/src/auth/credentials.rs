//! Persistent storage for the session's credential pair and identity.
//!
//! Three entries make up a stored session: `access_token`, `refresh_token`
//! and `user_data`. They are written together and cleared together; any
//! other combination is reported as corrupt.

use std::collections::HashMap;
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::session::{Identity, Session};
use super::StoreError;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_DATA_KEY: &str = "user_data";

/// Every key owned by a stored session.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY];

/// Keychain service name
const SERVICE_NAME: &str = "healthtrack";

/// Durable key/value storage for credentials.
///
/// Implementations must treat `write` and `remove` as a unit where the
/// medium allows it.
pub trait CredentialBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// In-process backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CredentialBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// OS keychain backend, one keychain entry per key.
///
/// Entries are created once per key and reused, so every operation on a
/// key goes through the same platform credential.
pub struct KeyringBackend {
    service: String,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &str) -> Result<Arc<Entry>, StoreError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(Entry::new(&self.service, key)?);
        entries.insert(key.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    fn write_one(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn restore(&self, written: &[(&str, Option<String>)]) {
        for (key, prior) in written {
            let restored = match prior {
                Some(value) => self.write_one(key, value),
                None => self.remove(&[*key]),
            };
            if let Err(e) = restored {
                warn!(key = *key, error = %e, "Failed to restore keychain entry");
            }
        }
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        // The keychain has no multi-entry transaction. Read every prior
        // value first, then restore the ones already written if a write fails.
        let mut priors: Vec<(&str, Option<String>)> = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            priors.push((*key, self.read(key)?));
        }

        for (index, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = self.write_one(key, value) {
                warn!(key = *key, error = %e, "Keychain write failed, restoring previous entries");
                self.restore(&priors[..index]);
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Session-shaped view over a [`CredentialBackend`].
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by a fresh [`MemoryBackend`]
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Load the persisted session.
    ///
    /// Returns `Ok(None)` when nothing is stored and
    /// `Err(StoreError::Corrupt)` when only some entries exist or the
    /// identity does not parse.
    pub fn load(&self) -> Result<Option<Session>, StoreError> {
        let access = self.backend.read(ACCESS_TOKEN_KEY)?;
        let refresh = self.backend.read(REFRESH_TOKEN_KEY)?;
        let user_data = self.backend.read(USER_DATA_KEY)?;

        match (access, refresh, user_data) {
            (None, None, None) => Ok(None),
            (Some(access_credential), Some(refresh_credential), Some(user_data)) => {
                let identity: Identity = serde_json::from_str(&user_data)
                    .map_err(|e| StoreError::Corrupt(format!("user_data: {}", e)))?;
                Ok(Some(Session {
                    access_credential,
                    refresh_credential,
                    identity,
                }))
            }
            (access, refresh, user_data) => Err(StoreError::Corrupt(format!(
                "access_token present: {}, refresh_token present: {}, user_data present: {}",
                access.is_some(),
                refresh.is_some(),
                user_data.is_some()
            ))),
        }
    }

    /// Write all three entries for `session`.
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let user_data = serde_json::to_string(&session.identity)?;
        self.backend.write(&[
            (ACCESS_TOKEN_KEY, session.access_credential.as_str()),
            (REFRESH_TOKEN_KEY, session.refresh_credential.as_str()),
            (USER_DATA_KEY, user_data.as_str()),
        ])?;
        debug!(email = %session.identity.email, "Session persisted");
        Ok(())
    }

    /// Remove all three entries.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove(&SESSION_KEYS)
    }

    /// Number of session entries currently persisted (0..=3).
    pub fn stored_entry_count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for key in SESSION_KEYS {
            if self.backend.read(key)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            access_credential: "T1".to_string(),
            refresh_credential: "R1".to_string(),
            identity: Identity::from_email("a@x.com"),
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = CredentialStore::memory();
        store.save(&session()).unwrap();

        assert_eq!(store.stored_entry_count().unwrap(), 3);
        assert_eq!(store.load().unwrap(), Some(session()));
    }

    #[test]
    fn test_user_data_uses_full_name_field() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(backend.clone());
        store.save(&session()).unwrap();

        let raw = backend.read(USER_DATA_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["email"], "a@x.com");
        assert_eq!(value["full_name"], "a");
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = CredentialStore::memory();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear_removes_every_entry() {
        let store = CredentialStore::memory();
        store.save(&session()).unwrap();
        store.clear().unwrap();

        assert_eq!(store.stored_entry_count().unwrap(), 0);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_partial_state_is_corrupt() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write(&[(ACCESS_TOKEN_KEY, "T1")]).unwrap();
        let store = CredentialStore::new(backend);

        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_unparsable_identity_is_corrupt() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .write(&[
                (ACCESS_TOKEN_KEY, "T1"),
                (REFRESH_TOKEN_KEY, "R1"),
                (USER_DATA_KEY, "{not json"),
            ])
            .unwrap();
        let store = CredentialStore::new(backend);

        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    fn mock_keyring() -> KeyringBackend {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringBackend::with_service("healthtrack-test")
    }

    #[test]
    fn test_keyring_write_then_read() {
        let backend = mock_keyring();
        backend
            .write(&[(ACCESS_TOKEN_KEY, "T1"), (REFRESH_TOKEN_KEY, "R1")])
            .unwrap();

        assert_eq!(backend.read(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T1"));
        assert_eq!(backend.read(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
        assert_eq!(backend.read(USER_DATA_KEY).unwrap(), None);

        backend.remove(&SESSION_KEYS).unwrap();
        assert_eq!(backend.read(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_keyring_store_roundtrip() {
        let store = CredentialStore::new(Arc::new(mock_keyring()));
        store.save(&session()).unwrap();

        assert_eq!(store.load().unwrap(), Some(session()));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_keyring_failed_write_restores_previous_entries() {
        let backend = mock_keyring();
        backend
            .write(&[(ACCESS_TOKEN_KEY, "T1"), (REFRESH_TOKEN_KEY, "R1")])
            .unwrap();

        let entry = backend.entry(REFRESH_TOKEN_KEY).unwrap();
        let mock = entry
            .get_credential()
            .downcast_ref::<keyring::mock::MockCredential>()
            .unwrap();
        // Consumed by the prior-value read of the refresh entry
        mock.set_error(keyring::Error::PlatformFailure("locked".into()));

        let result = backend.write(&[(ACCESS_TOKEN_KEY, "T2"), (REFRESH_TOKEN_KEY, "R2")]);

        assert!(matches!(result, Err(StoreError::Keyring(_))));
        assert_eq!(backend.read(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T1"));
        assert_eq!(backend.read(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn test_keyring_restore_puts_back_prior_values() {
        let backend = mock_keyring();
        backend
            .write(&[(ACCESS_TOKEN_KEY, "T2"), (REFRESH_TOKEN_KEY, "R2")])
            .unwrap();

        backend.restore(&[
            (ACCESS_TOKEN_KEY, Some("T1".to_string())),
            (REFRESH_TOKEN_KEY, None),
        ]);

        assert_eq!(backend.read(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T1"));
        assert_eq!(backend.read(REFRESH_TOKEN_KEY).unwrap(), None);
    }
}
