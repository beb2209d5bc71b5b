//! Reactive token renewal.
//!
//! While a session exists, exactly one `RefreshInterceptor` is registered on
//! the API client. It closes over the refresh token current at registration
//! and is swapped out whenever that refresh token changes.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, ApiRequest, InterceptorId, ResponseInterceptor};

use super::{Session, SessionObserver, TokenRefresher};

/// Renews the access token for a request rejected with 401 and rewrites the
/// request's Authorization header so the client can replay it.
pub struct RefreshInterceptor {
    refresher: TokenRefresher,
    refresh_token: String,
}

impl RefreshInterceptor {
    pub fn new(refresher: TokenRefresher, refresh_token: impl Into<String>) -> Self {
        Self {
            refresher,
            refresh_token: refresh_token.into(),
        }
    }

    /// The session's access token if it differs from the one the request
    /// carried, i.e. someone already renewed it after the request was sent.
    fn newer_token_than(&self, request: &ApiRequest) -> Option<String> {
        let session = self.refresher.session().snapshot();
        if session.refresh_token() != Some(self.refresh_token.as_str()) {
            return None;
        }
        let current = session.access_token()?;
        let sent = request.authorization()?;
        (sent != format!("Bearer {}", current)).then(|| current.to_string())
    }
}

#[async_trait]
impl ResponseInterceptor for RefreshInterceptor {
    async fn on_auth_failure(&self, request: &mut ApiRequest) -> Result<(), ApiError> {
        if let Some(token) = self.newer_token_than(request) {
            debug!(path = %request.path, "Token already renewed, replaying with current token");
            return request.set_bearer(&token);
        }

        let record = self
            .refresher
            .refresh_with(&self.refresh_token)
            .await
            .map_err(|e| {
                warn!(path = %request.path, error = %e, "Reactive token refresh failed");
                ApiError::RefreshFailed(e.to_string())
            })?;
        request.set_bearer(&record.token)
    }
}

struct Installed {
    refresh_token: String,
    id: InterceptorId,
}

/// Keeps the client's refresh interceptor in step with the session.
pub struct ReactiveRefresh {
    client: ApiClient,
    refresher: TokenRefresher,
    installed: Mutex<Option<Installed>>,
}

impl ReactiveRefresh {
    pub fn new(client: ApiClient, refresher: TokenRefresher) -> Self {
        Self {
            client,
            refresher,
            installed: Mutex::new(None),
        }
    }

    /// Eject the old interceptor before installing one for the session's
    /// refresh token. A no-op while the refresh token is unchanged.
    pub fn sync(&self, session: &Session) {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.as_ref().map(|i| i.refresh_token.as_str()) == session.refresh_token() {
            return;
        }
        if let Some(old) = installed.take() {
            self.client.eject_interceptor(old.id);
        }
        if let Some(refresh_token) = session.refresh_token() {
            let interceptor = RefreshInterceptor::new(self.refresher.clone(), refresh_token);
            let id = self.client.register_interceptor(Arc::new(interceptor));
            *installed = Some(Installed {
                refresh_token: refresh_token.to_string(),
                id,
            });
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn teardown(&self) {
        if let Some(old) = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.client.eject_interceptor(old.id);
        }
    }
}

impl SessionObserver for ReactiveRefresh {
    fn session_changed(&self, session: &Session) {
        self.sync(session);
    }
}

impl Drop for ReactiveRefresh {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use crate::auth::SessionState;
    use crate::models::User;
    use crate::store::MemoryStore;
    use crate::testing::MockTransport;
    use chrono::Utc;
    use reqwest::StatusCode;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            avatar_url: None,
        }
    }

    /// Refresh always yields `t2`; `providers` only accepts `Bearer t2`
    fn server() -> Arc<MockTransport> {
        MockTransport::new(|request| match request.path.as_str() {
            "sessions/token" => ApiResponse::new(
                StatusCode::OK,
                format!(r#"{{"token":{{"token":"t2","creationDate":"{}"}}}}"#, Utc::now().to_rfc3339()),
            ),
            _ if request.authorization() == Some("Bearer t2") => ApiResponse::new(StatusCode::OK, "[]"),
            _ => ApiResponse::new(StatusCode::UNAUTHORIZED, ""),
        })
    }

    fn wire(transport: Arc<MockTransport>) -> (ApiClient, Arc<SessionState>, Arc<ReactiveRefresh>) {
        let client = ApiClient::with_transport(transport);
        let session = Arc::new(SessionState::new());
        let refresher = TokenRefresher::new(client.clone(), Arc::new(MemoryStore::new()), session.clone());
        let reactive = Arc::new(ReactiveRefresh::new(client.clone(), refresher));
        let observer: Arc<dyn SessionObserver> = reactive.clone();
        session.observe(&observer);
        (client, session, reactive)
    }

    #[tokio::test]
    async fn test_one_interceptor_per_refresh_token() {
        let (client, session, reactive) = wire(server());
        assert_eq!(client.interceptor_count(), 0);

        session.hydrate("t1", user(), "r1", Utc::now());
        assert_eq!(client.interceptor_count(), 1);

        // Token patch keeps the same interceptor
        session.patch_token("t1b", Utc::now());
        assert_eq!(client.interceptor_count(), 1);

        session.hydrate("t3", user(), "r2", Utc::now());
        assert_eq!(client.interceptor_count(), 1);
        assert!(reactive.is_installed());

        session.clear();
        assert_eq!(client.interceptor_count(), 0);
        assert!(!reactive.is_installed());
    }

    #[tokio::test]
    async fn test_expired_request_refreshed_and_replayed_once() {
        let transport = server();
        let (client, session, _reactive) = wire(transport.clone());
        session.hydrate("t1", user(), "r1", Utc::now());
        client.set_authorization(Some("t1")).unwrap();

        client.list_providers().await.unwrap();

        assert_eq!(transport.count("sessions/token"), 1);
        let replays: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.path == "providers")
            .collect();
        assert_eq!(replays.len(), 2);
        assert_eq!(replays[0].authorization(), Some("Bearer t1"));
        assert_eq!(replays[1].authorization(), Some("Bearer t2"));

        assert_eq!(session.snapshot().access_token(), Some("t2"));
        assert_eq!(client.authorization().as_deref(), Some("Bearer t2"));
    }

    #[tokio::test]
    async fn test_stale_request_replayed_without_refresh() {
        let transport = server();
        let (client, session, _reactive) = wire(transport.clone());
        session.hydrate("t2", user(), "r1", Utc::now());

        // Sent with an old token while the session already holds t2
        let mut request = ApiRequest::get("providers");
        request.set_bearer("t1").unwrap();
        client.send(request).await.unwrap();

        assert_eq!(transport.count("sessions/token"), 0);
        assert_eq!(transport.count("providers"), 2);
    }

    #[tokio::test]
    async fn test_drop_ejects_interceptor() {
        let (client, session, reactive) = wire(server());
        session.hydrate("t1", user(), "r1", Utc::now());
        assert_eq!(client.interceptor_count(), 1);
        drop(reactive);
        assert_eq!(client.interceptor_count(), 0);
    }
}
