use thiserror::Error;

/// Failures of the credential persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential data is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Credential file could not be decrypted")]
    Decrypt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Persisted session is incomplete: {0}")]
    Corrupt(String),

    #[error("Credential store task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

/// Failures of the login, registration and refresh endpoints.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login failed: {0}")]
    InvalidCredentials(String),

    #[error("Registration failed: {0}")]
    RegistrationRejected(String),

    #[error("Token refresh rejected with status {0}")]
    RefreshRejected(u16),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist credentials: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials(message) | AuthError::RegistrationRejected(message) => {
                message.clone()
            }
            AuthError::NetworkError(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            AuthError::NetworkError(_) => {
                "Unable to connect to server. Check your connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}
