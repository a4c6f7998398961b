//! Encrypted credential file.
//!
//! All entries live in one JSON map, sealed with ChaCha20-Poly1305 under a
//! key derived from a passphrase with Argon2id. The salt is generated once
//! per file and the nonce on every write; both are stored alongside the
//! ciphertext.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::credentials::CredentialBackend;
use super::StoreError;

/// On-disk format version
const FORMAT_VERSION: u32 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Serialize, Deserialize)]
struct SealedFile {
    version: u32,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

/// Derived key for a given salt, kept so repeated reads skip Argon2.
struct DerivedKey {
    salt: Vec<u8>,
    key: [u8; KEY_LEN],
}

pub struct FileBackend {
    path: PathBuf,
    passphrase: String,
    params: Params,
    derived: Mutex<Option<DerivedKey>>,
    // Serializes read-modify-write cycles on the file
    io: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passphrase: passphrase.into(),
            params: Params::default(),
            derived: Mutex::new(None),
            io: Mutex::new(()),
        }
    }

    /// Override the Argon2 cost parameters.
    pub fn with_kdf_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_for(&self, salt: &[u8]) -> Result<[u8; KEY_LEN], StoreError> {
        let mut derived = self.derived.lock();
        if let Some(ref cached) = *derived {
            if cached.salt == salt {
                return Ok(cached.key);
            }
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;

        *derived = Some(DerivedKey {
            salt: salt.to_vec(),
            key,
        });
        Ok(key)
    }

    /// Salt of the cached key, or a fresh one.
    fn current_salt(&self) -> Vec<u8> {
        if let Some(ref cached) = *self.derived.lock() {
            return cached.salt.clone();
        }
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let sealed: SealedFile = serde_json::from_str(&contents)?;
        if sealed.version != FORMAT_VERSION || sealed.nonce.len() != NONCE_LEN {
            return Err(StoreError::Decrypt);
        }

        let key = self.key_for(&sealed.salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
            .map_err(|_| StoreError::Decrypt)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let salt = self.current_salt();
        let key = self.key_for(&salt)?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let plaintext = serde_json::to_vec(map)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| StoreError::Decrypt)?;

        let sealed = SealedFile {
            version: FORMAT_VERSION,
            salt,
            nonce: nonce.to_vec(),
            ciphertext,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        // Owner-only (0600 on unix) from creation, then renamed into place
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(serde_json::to_string(&sealed)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), entries = map.len(), "Credential file written");
        Ok(())
    }
}

impl CredentialBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.io.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let _guard = self.io.lock();
        // An unreadable file holds nothing worth keeping; overwrite it.
        let mut map = self.read_map().unwrap_or_default();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.io.lock();
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(_) => HashMap::new(),
        };
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> Params {
        Params::new(64, 1, 1, Some(KEY_LEN)).unwrap()
    }

    fn backend(dir: &Path, passphrase: &str) -> FileBackend {
        FileBackend::new(dir.join("credentials.json"), passphrase).with_kdf_params(fast_params())
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = backend(dir.path(), "secret");

        store
            .write(&[("access_token", "T1"), ("refresh_token", "R1")])
            .unwrap();

        assert_eq!(store.read("access_token").unwrap().as_deref(), Some("T1"));
        assert_eq!(store.read("refresh_token").unwrap().as_deref(), Some("R1"));
        assert_eq!(store.read("user_data").unwrap(), None);
    }

    #[test]
    fn test_file_does_not_contain_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = backend(dir.path(), "secret");
        store.write(&[("access_token", "very-secret-token")]).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("very-secret-token"));
    }

    #[test]
    fn test_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        backend(dir.path(), "secret")
            .write(&[("access_token", "T1")])
            .unwrap();

        let reopened = backend(dir.path(), "secret");
        assert_eq!(reopened.read("access_token").unwrap().as_deref(), Some("T1"));
    }

    #[test]
    fn test_wrong_passphrase_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        backend(dir.path(), "secret")
            .write(&[("access_token", "T1")])
            .unwrap();

        let other = backend(dir.path(), "not-the-secret");
        assert!(matches!(other.read("access_token"), Err(StoreError::Decrypt)));
    }

    #[test]
    fn test_removing_everything_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = backend(dir.path(), "secret");
        store.write(&[("access_token", "T1")]).unwrap();
        assert!(store.path().exists());

        store.remove(&["access_token"]).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_remove_clears_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = backend(dir.path(), "secret");
        std::fs::write(store.path(), "garbage").unwrap();

        store.remove(&["access_token"]).unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = backend(dir.path(), "secret");
        store.write(&[("access_token", "T1")]).unwrap();
        store.write(&[("refresh_token", "R1")]).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "mode was {:o}", mode & 0o777);
    }
}
