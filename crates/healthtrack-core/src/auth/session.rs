//! The live session and its single owner, [`SessionManager`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::client::{AuthClient, RefreshedTokens};
use super::credentials::CredentialStore;
use super::{AuthError, StoreError};
use crate::config::IdentitySource;

/// Capacity of the session event channel.
/// Slow subscribers lose the oldest events rather than blocking the client.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Who is logged in.
///
/// Persisted as `{"email": .., "full_name": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    #[serde(rename = "full_name")]
    pub display_name: String,
}

impl Identity {
    /// Identity derived from the email address alone: the display name is
    /// the part before `@`.
    pub fn from_email(email: &str) -> Self {
        let display_name = email.split('@').next().unwrap_or(email).to_string();
        Self {
            email: email.to_string(),
            display_name,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_credential: String,
    pub refresh_credential: String,
    pub identity: Identity,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_credential", &"<redacted>")
            .field("refresh_credential", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Notification emitted for every user-visible change of the session.
///
/// `Expired` is also the signal to send the user back to the login surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { email: String },
    LoginFailed { message: String },
    Registered { email: String },
    RegistrationFailed { message: String },
    LoggedOut,
    Expired,
}

impl SessionEvent {
    pub fn title(&self) -> &'static str {
        match self {
            SessionEvent::LoggedIn { .. } => "Welcome back!",
            SessionEvent::LoginFailed { .. } => "Login failed",
            SessionEvent::Registered { .. } => "Registration successful!",
            SessionEvent::RegistrationFailed { .. } => "Registration failed",
            SessionEvent::LoggedOut => "Logged out",
            SessionEvent::Expired => "Session expired",
        }
    }

    pub fn description(&self) -> String {
        match self {
            SessionEvent::LoggedIn { .. } => "You've successfully logged in.".to_string(),
            SessionEvent::LoginFailed { message }
            | SessionEvent::RegistrationFailed { message } => message.clone(),
            SessionEvent::Registered { .. } => {
                "You can now log in with your credentials.".to_string()
            }
            SessionEvent::LoggedOut => "You've been successfully logged out.".to_string(),
            SessionEvent::Expired => "Please log in again.".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SessionEvent::LoginFailed { .. }
                | SessionEvent::RegistrationFailed { .. }
                | SessionEvent::Expired
        )
    }

    /// Whether the collaborator should show the login surface.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionEvent::LoggedOut | SessionEvent::Expired)
    }
}

/// What a store commit does to the live session.
enum Commit<R> {
    /// Leave the live session as it is
    Keep(R),
    /// Make this the live session
    Install(Option<Session>, R),
}

/// Owns the live [`Session`] and is the only writer of the
/// [`CredentialStore`].
///
/// Store I/O runs on the blocking pool. Writers take the commit lock, and
/// the lock travels with the blocking job, so a commit (store write plus
/// in-memory swap) finishes even if its caller stops waiting.
pub struct SessionManager {
    auth: AuthClient,
    store: CredentialStore,
    identity_source: IdentitySource,
    current: Arc<RwLock<Option<Session>>>,
    commit_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create the manager and hydrate the session from `store`.
    ///
    /// Corrupt persisted data is cleared and treated as logged out.
    pub fn new(auth: AuthClient, store: CredentialStore, identity_source: IdentitySource) -> Self {
        let current = match store.load() {
            Ok(session) => {
                debug!(has_session = session.is_some(), "Session hydrated");
                session
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to clear persisted session");
                }
                None
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            auth,
            store,
            identity_source,
            current: Arc::new(RwLock::new(current)),
            commit_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub(crate) fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub(crate) fn access_credential(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|s| s.access_credential.clone())
    }

    #[cfg(test)]
    pub(crate) fn refresh_credential(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|s| s.refresh_credential.clone())
    }

    /// Run `op` against the store on the blocking pool, then apply its
    /// outcome to the live session.
    async fn commit<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&CredentialStore, Option<&Session>) -> Result<Commit<R>, StoreError>
            + Send
            + 'static,
    {
        let guard = Arc::clone(&self.commit_lock).lock_owned().await;
        let store = self.store.clone();
        let current = Arc::clone(&self.current);

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let live = current.read().clone();
            match op(&store, live.as_ref())? {
                Commit::Keep(out) => Ok(out),
                Commit::Install(next, out) => {
                    *current.write() = next;
                    Ok(out)
                }
            }
        })
        .await?
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Exchange email and password for a credential pair and persist the
    /// resulting session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        match self.try_login(email, password).await {
            Ok(session) => {
                info!(email = %email, "Login successful");
                self.notify(SessionEvent::LoggedIn {
                    email: email.to_string(),
                });
                Ok(session)
            }
            Err(e) => {
                warn!(email = %email, error = %e, "Login failed");
                self.notify(SessionEvent::LoginFailed {
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let tokens = self.auth.obtain_tokens(email, password).await?;
        let identity = self.resolve_identity(email, &tokens.access).await;

        let session = Session {
            access_credential: tokens.access,
            refresh_credential: tokens.refresh,
            identity,
        };

        let installed = session.clone();
        self.commit(move |store, _| {
            store.save(&installed)?;
            Ok(Commit::Install(Some(installed), ()))
        })
        .await?;
        Ok(session)
    }

    async fn resolve_identity(&self, email: &str, access: &str) -> Identity {
        match self.identity_source {
            IdentitySource::EmailLocalPart => Identity::from_email(email),
            IdentitySource::ProfileEndpoint => match self.auth.fetch_profile(access).await {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(error = %e, "Profile fetch failed, deriving identity from email");
                    Identity::from_email(email)
                }
            },
        }
    }

    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        match self.auth.register(full_name, email, password).await {
            Ok(()) => {
                info!(email = %email, "Registration successful");
                self.notify(SessionEvent::Registered {
                    email: email.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(email = %email, error = %e, "Registration failed");
                self.notify(SessionEvent::RegistrationFailed {
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    /// Drop the session and every persisted entry. Never fails; storage
    /// errors are logged.
    pub async fn logout(&self) {
        let cleared = self
            .commit(|store, _| {
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to clear persisted credentials on logout");
                }
                Ok(Commit::Install(None, ()))
            })
            .await;
        if let Err(e) = cleared {
            warn!(error = %e, "Logout did not complete");
            return;
        }

        info!("Logged out");
        self.notify(SessionEvent::LoggedOut);
    }

    /// Install a refreshed access credential, provided the session that
    /// was refreshed (identified by `refresh_used`) is still the live one.
    ///
    /// Memory is only updated once the store write succeeds. Returns the
    /// new access credential, or `None` if the session was replaced or
    /// dropped while the refresh was in flight.
    pub(crate) async fn replace_access_credential(
        &self,
        refresh_used: &str,
        tokens: RefreshedTokens,
    ) -> Result<Option<String>, StoreError> {
        let refresh_used = refresh_used.to_string();
        self.commit(move |store, live| {
            let Some(live) = live.filter(|l| l.refresh_credential == refresh_used) else {
                return Ok(Commit::Keep(None));
            };

            let updated = Session {
                access_credential: tokens.access,
                refresh_credential: tokens
                    .refresh
                    .unwrap_or_else(|| live.refresh_credential.clone()),
                identity: live.identity.clone(),
            };
            store.save(&updated)?;

            debug!("Access credential replaced");
            let access = updated.access_credential.clone();
            Ok(Commit::Install(Some(updated), Some(access)))
        })
        .await
    }

    /// Tear the session down if it still carries `access`.
    pub(crate) async fn expire_if_access(&self, access: &str) -> bool {
        let access = access.to_string();
        self.expire_where(move |s| s.access_credential == access).await
    }

    /// Tear the session down if it still carries `refresh`.
    pub(crate) async fn expire_if_refresh(&self, refresh: &str) -> bool {
        let refresh = refresh.to_string();
        self.expire_where(move |s| s.refresh_credential == refresh).await
    }

    /// Clear memory and store when `matches` holds for the live session.
    /// Returns whether a teardown happened; only the first caller for a
    /// given session gets `true`.
    async fn expire_where<P>(&self, matches: P) -> bool
    where
        P: FnOnce(&Session) -> bool + Send + 'static,
    {
        let expired = self
            .commit(move |store, live| {
                if !live.is_some_and(matches) {
                    return Ok(Commit::Keep(false));
                }
                if let Err(e) = store.clear() {
                    warn!(error = %e, "Failed to clear persisted credentials on expiry");
                }
                Ok(Commit::Install(None, true))
            })
            .await;

        match expired {
            Ok(true) => {
                warn!("Session expired, re-authentication required");
                self.notify(SessionEvent::Expired);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "Session teardown did not complete");
                false
            }
        }
    }
}
