//! Authentication module for managing the user session and its credentials.
//!
//! This module provides:
//! - `SessionManager`: login/register/logout and the live `Session`
//! - `CredentialStore`: persistence of the credential pair and identity
//! - Credential backends: encrypted file, OS keychain, in-memory
//!
//! The session manager is the only writer of the credential store.

pub mod client;
pub mod credentials;
pub mod error;
pub mod file_store;
pub mod session;

pub use client::AuthClient;
pub use credentials::{CredentialBackend, CredentialStore, KeyringBackend, MemoryBackend};
pub use error::{AuthError, StoreError};
pub use file_store::FileBackend;
pub use session::{Identity, Session, SessionEvent, SessionManager};
