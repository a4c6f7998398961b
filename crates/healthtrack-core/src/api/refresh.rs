//! Single-flight token refresh.
//!
//! The coordinator is either idle or holds exactly one pending refresh.
//! Callers that hit a 401 while a refresh is pending wait on that refresh
//! instead of starting their own, so N concurrent failures cost one round
//! trip to the refresh endpoint. This matters when the server rotates
//! refresh credentials: a second refresh with the old credential would be
//! rejected and log the user out.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::auth::SessionManager;

/// Outcome shared by every waiter of one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// There was no session to refresh
    NoSession,
    /// The refresh credential was rejected or the refresh could not complete
    Expired,
}

impl From<RefreshFailure> for ApiError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoSession => ApiError::NoSession,
            RefreshFailure::Expired => ApiError::SessionExpired,
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

struct PendingRefresh {
    id: u64,
    outcome: SharedRefresh,
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    pending: Option<PendingRefresh>,
}

impl Slot {
    fn finish(&mut self, id: u64) {
        if self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.pending = None;
        }
    }
}

/// Empties the slot when the refresh task ends, including by panic.
struct FinishGuard {
    slot: Arc<Mutex<Slot>>,
    id: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.slot.lock().finish(self.id);
    }
}

/// What a caller should do after asking for a refresh.
enum Ticket {
    /// The credential the caller used is already superseded
    Ready(String),
    Wait(SharedRefresh),
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    sessions: Arc<SessionManager>,
    slot: Arc<Mutex<Slot>>,
}

impl RefreshCoordinator {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Obtain an access credential to replace `rejected`, the one the
    /// caller's request was sent with.
    ///
    /// Joins the pending refresh if there is one. If the live session
    /// already holds a different credential, that one is returned without
    /// any network call.
    pub async fn refresh(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        match self.join_or_start(rejected)? {
            Ticket::Ready(access) => Ok(access),
            Ticket::Wait(outcome) => outcome.await.map_err(ApiError::from),
        }
    }

    /// Check for a pending refresh and create one if absent, under a single
    /// lock acquisition with no suspension point in between.
    fn join_or_start(&self, rejected: Option<&str>) -> Result<Ticket, ApiError> {
        let mut slot = self.slot.lock();

        if let Some(ref pending) = slot.pending {
            debug!(refresh_id = pending.id, "Joining pending token refresh");
            return Ok(Ticket::Wait(pending.outcome.clone()));
        }

        let live = self.sessions.current_session().ok_or(ApiError::NoSession)?;
        if rejected != Some(live.access_credential.as_str()) {
            debug!("Rejected credential already superseded, reusing live credential");
            return Ok(Ticket::Ready(live.access_credential));
        }

        let id = slot.next_id;
        slot.next_id += 1;

        let guard = FinishGuard {
            slot: Arc::clone(&self.slot),
            id,
        };
        let sessions = Arc::clone(&self.sessions);
        let refresh_credential = live.refresh_credential;

        // Spawned so that abandoning the request that started the refresh
        // does not cancel it for the other waiters.
        let task = tokio::spawn(async move {
            let _guard = guard;
            run_refresh(&sessions, &refresh_credential).await
        });

        let outcome: SharedRefresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Token refresh task failed");
                    Err(RefreshFailure::Expired)
                }
            }
        }
        .boxed()
        .shared();

        info!(refresh_id = id, "Starting token refresh");
        slot.pending = Some(PendingRefresh {
            id,
            outcome: outcome.clone(),
        });
        Ok(Ticket::Wait(outcome))
    }
}

async fn run_refresh(
    sessions: &SessionManager,
    refresh_credential: &str,
) -> Result<String, RefreshFailure> {
    let tokens = match sessions.auth().refresh(refresh_credential).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            sessions.expire_if_refresh(refresh_credential).await;
            return Err(RefreshFailure::Expired);
        }
    };

    match sessions.replace_access_credential(refresh_credential, tokens).await {
        Ok(Some(access)) => {
            info!("Token refresh succeeded");
            Ok(access)
        }
        Ok(None) => {
            debug!("Session changed during token refresh, discarding result");
            Err(RefreshFailure::NoSession)
        }
        Err(e) => {
            warn!(error = %e, "Failed to persist refreshed credential");
            sessions.expire_if_refresh(refresh_credential).await;
            Err(RefreshFailure::Expired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthClient, CredentialStore};
    use crate::config::{Endpoints, IdentitySource};

    fn coordinator(session: Option<crate::auth::Session>) -> RefreshCoordinator {
        let store = CredentialStore::memory();
        if let Some(ref s) = session {
            store.save(s).unwrap();
        }
        let auth = AuthClient::new(
            reqwest::Client::new(),
            url::Url::parse("http://127.0.0.1:9/").unwrap(),
            Endpoints::default(),
        );
        RefreshCoordinator::new(Arc::new(SessionManager::new(
            auth,
            store,
            IdentitySource::default(),
        )))
    }

    fn session(access: &str) -> crate::auth::Session {
        crate::auth::Session {
            access_credential: access.to_string(),
            refresh_credential: "R1".to_string(),
            identity: crate::auth::Identity::from_email("a@x.com"),
        }
    }

    #[tokio::test]
    async fn test_no_session_fails_without_refreshing() {
        let refresher = coordinator(None);
        let result = refresher.refresh(Some("T1")).await;

        assert!(matches!(result, Err(ApiError::NoSession)));
        assert!(!refresher.is_refreshing());
    }

    #[tokio::test]
    async fn test_superseded_credential_is_reused() {
        let refresher = coordinator(Some(session("T2")));
        let access = refresher.refresh(Some("T1")).await.unwrap();

        assert_eq!(access, "T2");
        assert!(!refresher.is_refreshing());
    }

    #[test]
    fn test_finish_only_clears_matching_refresh() {
        let mut slot = Slot::default();
        slot.pending = Some(PendingRefresh {
            id: 3,
            outcome: futures::future::ready(Ok("T2".to_string())).boxed().shared(),
        });

        slot.finish(2);
        assert!(slot.pending.is_some());
        slot.finish(3);
        assert!(slot.pending.is_none());
    }

    #[test]
    fn test_failure_maps_to_api_error() {
        assert!(matches!(
            ApiError::from(RefreshFailure::Expired),
            ApiError::SessionExpired
        ));
        assert!(matches!(
            ApiError::from(RefreshFailure::NoSession),
            ApiError::NoSession
        ));
    }
}
