//! Typed access to the workout, meal and steps collections.

use std::marker::PhantomData;

use reqwest::Method;

use super::{ApiClient, ApiError};
use crate::models::{Activity, Choices};

/// CRUD for one activity kind. Every call goes through the client's
/// request pipeline.
pub struct ActivityApi<T> {
    client: ApiClient,
    _kind: PhantomData<T>,
}

impl<T: Activity> ActivityApi<T> {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    pub async fn list(&self) -> Result<Vec<T>, ApiError> {
        self.client.get(T::KIND.collection_path()).await
    }

    pub async fn get(&self, id: i64) -> Result<T, ApiError> {
        self.client.get(&T::KIND.item_path(id)).await
    }

    pub async fn create(&self, entry: &T) -> Result<T, ApiError> {
        self.client
            .send_json(Method::POST, T::KIND.collection_path(), entry)
            .await
    }

    pub async fn update(&self, id: i64, entry: &T) -> Result<T, ApiError> {
        self.client
            .send_json(Method::PUT, &T::KIND.item_path(id), entry)
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete(&T::KIND.item_path(id)).await
    }

    pub async fn choices(&self) -> Result<Choices, ApiError> {
        self.client.get(T::KIND.choices_path()).await
    }

    /// Save `entry` with its status flipped between done and not done.
    pub async fn toggle_status(&self, entry: &T) -> Result<T, ApiError> {
        let id = entry.id().ok_or(ApiError::MissingId(T::KIND.label()))?;
        let mut updated = entry.clone();
        updated.set_status(T::KIND.toggled_status(entry.status()));
        self.update(id, &updated).await
    }

    /// A new entry for today, with defaults taken from the server's choices.
    /// Falls back to built-in defaults if the choices cannot be fetched.
    pub async fn draft(&self) -> T {
        match self.choices().await {
            Ok(choices) => T::draft(&choices),
            Err(e) => {
                tracing::debug!(kind = %T::KIND, error = %e, "Choices unavailable, using defaults");
                T::draft(&Choices::default())
            }
        }
    }
}
