//! HTTP calls to the authentication endpoints: login, registration,
//! token refresh and (optionally) the profile.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::session::Identity;
use super::AuthError;
use crate::config::Endpoints;

const LOGIN_FALLBACK_MESSAGE: &str = "Invalid credentials. Please try again.";
const REGISTRATION_FALLBACK_MESSAGE: &str = "Registration failed. Please try again.";

/// Response of the login endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response of the refresh endpoint. `refresh` is present when the server
/// rotates refresh credentials.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshedTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    email: String,
    full_name: String,
}

/// Join an endpoint path onto the base URL. Leading slashes are ignored so
/// paths stay relative to any base path.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    base.join(path.trim_start_matches('/'))
}

/// Message for a rejected login: the server's `detail`, else a fallback.
pub(crate) fn login_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| LOGIN_FALLBACK_MESSAGE.to_string())
}

/// Message for a rejected registration.
///
/// Priority: `email[0]`, then the first message of any other field, then
/// `detail`, then a fallback.
pub(crate) fn registration_error_message(body: &str) -> String {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return REGISTRATION_FALLBACK_MESSAGE.to_string();
    };

    let first_message = |value: &Value| -> Option<String> {
        match value {
            Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    };

    if let Some(message) = fields.get("email").and_then(first_message) {
        return message;
    }
    if let Some(message) = fields
        .iter()
        .filter(|(name, _)| name.as_str() != "email" && name.as_str() != "detail")
        .find_map(|(_, value)| first_message(value))
    {
        return message;
    }
    fields
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| REGISTRATION_FALLBACK_MESSAGE.to_string())
}

/// Client for the authentication endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Url,
    endpoints: Endpoints,
}

impl AuthClient {
    pub fn new(http: Client, base_url: Url, endpoints: Endpoints) -> Self {
        Self {
            http,
            base_url,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) async fn obtain_tokens(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenPair, AuthError> {
        let url = join_url(&self.base_url, &self.endpoints.login)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Login rejected");
            return Err(AuthError::InvalidCredentials(login_error_message(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("login response: {}", e)))
    }

    pub(crate) async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let url = join_url(&self.base_url, &self.endpoints.register)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "full_name": full_name, "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RegistrationRejected(registration_error_message(
                &body,
            )));
        }
        Ok(())
    }

    /// Exchange a refresh credential for a new access credential. Any
    /// non-2xx answer is a rejection.
    pub(crate) async fn refresh(
        &self,
        refresh_credential: &str,
    ) -> Result<RefreshedTokens, AuthError> {
        let url = join_url(&self.base_url, &self.endpoints.refresh)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "refresh": refresh_credential }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::RefreshRejected(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("refresh response: {}", e)))
    }

    /// Fetch the identity from the profile endpoint using a fresh access
    /// credential.
    pub(crate) async fn fetch_profile(&self, access: &str) -> Result<Identity, AuthError> {
        let path = self
            .endpoints
            .profile
            .as_deref()
            .ok_or_else(|| AuthError::InvalidResponse("no profile endpoint configured".into()))?;
        let url = join_url(&self.base_url, path)?;

        let response = self.http.get(url).bearer_auth(access).send().await?;
        if !response.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "profile request returned {}",
                response.status()
            )));
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("profile response: {}", e)))?;
        Ok(Identity {
            email: profile.email,
            display_name: profile.full_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_keeps_base_path() {
        let base = Url::parse("http://localhost:8000/tracker/").unwrap();
        assert_eq!(
            join_url(&base, "/api/token/").unwrap().as_str(),
            "http://localhost:8000/tracker/api/token/"
        );
        assert_eq!(
            join_url(&base, "api/token/").unwrap().as_str(),
            "http://localhost:8000/tracker/api/token/"
        );
    }

    #[test]
    fn test_login_error_message() {
        assert_eq!(
            login_error_message(r#"{"detail": "No active account found"}"#),
            "No active account found"
        );
        assert_eq!(login_error_message(""), LOGIN_FALLBACK_MESSAGE);
        assert_eq!(login_error_message(r#"{"code": "x"}"#), LOGIN_FALLBACK_MESSAGE);
    }

    #[test]
    fn test_registration_email_error_wins() {
        let body = r#"{
            "detail": "Bad request",
            "password": ["Too short"],
            "email": ["user with this email already exists."]
        }"#;
        assert_eq!(
            registration_error_message(body),
            "user with this email already exists."
        );
    }

    #[test]
    fn test_registration_other_field_beats_detail() {
        let body = r#"{"detail": "Bad request", "password": ["Too short"]}"#;
        assert_eq!(registration_error_message(body), "Too short");
    }

    #[test]
    fn test_registration_detail_and_fallback() {
        assert_eq!(
            registration_error_message(r#"{"detail": "Closed"}"#),
            "Closed"
        );
        assert_eq!(
            registration_error_message("<html>oops</html>"),
            REGISTRATION_FALLBACK_MESSAGE
        );
        assert_eq!(
            registration_error_message(r#"{"email": []}"#),
            REGISTRATION_FALLBACK_MESSAGE
        );
    }
}
