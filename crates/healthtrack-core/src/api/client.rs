//! API client for the activity-tracking REST service.
//!
//! This module provides the `ApiClient` struct. Every resource call goes
//! through [`ApiClient::request`], the pipeline that attaches the bearer
//! credential and recovers from an expired access credential.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use super::activities::ActivityApi;
use super::attempt::RequestAttempt;
use super::refresh::RefreshCoordinator;
use super::ApiError;
use crate::auth::client::join_url;
use crate::auth::{
    AuthClient, AuthError, CredentialBackend, CredentialStore, MemoryBackend, Session,
    SessionEvent, SessionManager,
};
use crate::config::{Config, Endpoints, IdentitySource};
use crate::models::{Meal, StepsEntry, Workout};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API client for the activity service.
/// Clone is cheap - all state lives behind one Arc.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    base_url: Url,
    sessions: Arc<SessionManager>,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from the on-disk configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Self::builder()
            .base_url(&config.base_url)
            .endpoints(config.endpoints.clone())
            .timeout(config.request_timeout())
            .identity_source(config.identity)
            .credential_backend(config.credential_backend()?)
            .build()?;
        Ok(client)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.inner.refresher
    }

    // ===== Session =====

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.inner.sessions.login(email, password).await
    }

    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        self.inner.sessions.register(full_name, email, password).await
    }

    pub async fn logout(&self) {
        self.inner.sessions.logout().await
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.sessions.current_session()
    }

    /// Session notifications, including the `Expired` re-login signal.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.sessions.subscribe()
    }

    // ===== Resources =====

    pub fn workouts(&self) -> ActivityApi<Workout> {
        ActivityApi::new(self.clone())
    }

    pub fn meals(&self) -> ActivityApi<Meal> {
        ActivityApi::new(self.clone())
    }

    pub fn steps(&self) -> ActivityApi<StepsEntry> {
        ActivityApi::new(self.clone())
    }

    // ===== Request pipeline =====

    /// Send a request with the session's credential, refreshing it once on
    /// a 401.
    ///
    /// Any status other than 401 is returned as-is. A 401 on the first
    /// attempt triggers a (shared) refresh and one replay with the new
    /// credential; a 401 on the replay ends the session with
    /// [`ApiError::SessionExpired`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let mut attempt = RequestAttempt::new(method, path, body.cloned());
        let mut credential = self.inner.sessions.access_credential();

        loop {
            let response = self.dispatch(&attempt, credential.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            let Some(retry) = attempt.retry() else {
                warn!(
                    method = %attempt.method(),
                    path = attempt.path(),
                    "Refreshed credential rejected, ending session"
                );
                if let Some(ref rejected) = credential {
                    self.inner.sessions.expire_if_access(rejected).await;
                }
                return Err(ApiError::SessionExpired);
            };

            debug!(method = %attempt.method(), path = attempt.path(), "Unauthorized, refreshing credential");
            let fresh = self
                .inner
                .refresher
                .refresh(credential.as_deref())
                .await?;
            credential = Some(fresh);
            attempt = retry;
        }
    }

    async fn dispatch(
        &self,
        attempt: &RequestAttempt,
        credential: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = join_url(&self.inner.base_url, attempt.path())?;
        let mut builder = self.inner.http.request(attempt.method().clone(), url);
        if let Some(token) = credential {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = attempt.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(
            method = %attempt.method(),
            path = attempt.path(),
            attempt = attempt.number(),
            status = response.status().as_u16(),
            "Request completed"
        );
        Ok(response)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", path, e)))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path, None).await?;
        Self::parse_json(response, path).await
    }

    pub(crate) async fn send_json<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        let response = self.request(method, path, Some(&body)).await?;
        Self::parse_json(response, path).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.request(Method::DELETE, path, None).await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

/// Builder for creating an ApiClient.
pub struct ClientBuilder {
    base_url: Option<String>,
    endpoints: Endpoints,
    timeout: Duration,
    user_agent: Option<String>,
    identity_source: IdentitySource,
    backend: Option<Arc<dyn CredentialBackend>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            identity_source: IdentitySource::default(),
            backend: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn identity_source(mut self, source: IdentitySource) -> Self {
        self.identity_source = source;
        self
    }

    /// Where the session is persisted. Defaults to memory only.
    pub fn credential_backend(mut self, backend: Arc<dyn CredentialBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the client, hydrating the session from the credential backend.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("base_url is required".to_string()))?;

        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("healthtrack/{}", env!("CARGO_PKG_VERSION")));

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(self.timeout)
            .build()?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let auth = AuthClient::new(http.clone(), base_url.clone(), self.endpoints);
        let sessions = Arc::new(SessionManager::new(
            auth,
            CredentialStore::new(backend),
            self.identity_source,
        ));
        let refresher = RefreshCoordinator::new(Arc::clone(&sessions));

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                sessions,
                refresher,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/");

        let client = ClientBuilder::new()
            .base_url("http://localhost:8000/tracker")
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/tracker/");
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ClientBuilder::new().base_url("not a url").build();
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn test_new_client_has_no_session() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8000")
            .build()
            .unwrap();
        assert!(client.current_session().is_none());
        assert!(!client.refresher().is_refreshing());
    }
}
