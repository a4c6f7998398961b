//! Core library for healthtrack.
//!
//! Provides the authenticated client for the activity-tracking REST service:
//!
//! - [`auth`]: session ownership, credential persistence, login/register/logout
//! - [`api`]: the request pipeline with transparent token refresh, plus typed
//!   access to workouts, meals and step counts
//! - [`models`]: activity data types
//! - [`config`]: on-disk configuration
//!
//! ```no_run
//! use healthtrack_core::{ApiClient, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let client = ApiClient::from_config(&config)?;
//!
//! client.login("a@example.com", "secret").await?;
//! for workout in client.workouts().list().await? {
//!     println!("{} {}", workout.date, workout.workout_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ActivityApi, ApiClient, ApiError, ClientBuilder, RequestAttempt};
pub use auth::{
    AuthError, CredentialBackend, CredentialStore, FileBackend, Identity, KeyringBackend,
    MemoryBackend, Session, SessionEvent, SessionManager, StoreError,
};
pub use config::{BackendKind, Config, Endpoints, IdentitySource};
pub use models::{Activity, ActivityKind, Choice, Choices, Meal, StepsEntry, Workout};
