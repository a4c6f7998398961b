//! REST API client module for the activity-tracking service.
//!
//! This module provides the `ApiClient`, whose request pipeline attaches the
//! session's bearer credential to every call and transparently refreshes it
//! once when the server answers 401.
//!
//! Concurrent 401s share a single refresh round-trip through the
//! `RefreshCoordinator`.

pub mod activities;
pub mod attempt;
pub mod client;
pub mod error;
pub mod refresh;

pub use activities::ActivityApi;
pub use attempt::RequestAttempt;
pub use client::{ApiClient, ClientBuilder};
pub use error::ApiError;
pub use refresh::RefreshCoordinator;
