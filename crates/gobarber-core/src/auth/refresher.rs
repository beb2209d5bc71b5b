//! The refresh primitive shared by the proactive and reactive paths.
//!
//! Concurrent callers asking to refresh the same refresh token await a single
//! shared in-flight call instead of each hitting `sessions/token`.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::TokenRecord;
use crate::store::{CredentialStore, TOKEN_KEY};

use super::{AuthError, SessionState};

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenRecord, AuthError>>>;

struct InFlight {
    refresh_token: String,
    future: RefreshFuture,
}

struct RefresherInner {
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    session: Arc<SessionState>,
    in_flight: Mutex<Option<InFlight>>,
}

/// Mints new access tokens and applies them to the store, the session and
/// the client's default header. Clone is cheap.
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<RefresherInner>,
}

impl TokenRefresher {
    pub fn new(client: ApiClient, store: Arc<dyn CredentialStore>, session: Arc<SessionState>) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                client,
                store,
                session,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.inner.session
    }

    /// Refresh using the current session's refresh token
    pub async fn refresh(&self) -> Result<TokenRecord, AuthError> {
        let refresh_token = self
            .inner
            .session
            .snapshot()
            .refresh_token()
            .map(str::to_string)
            .ok_or(AuthError::NotSignedIn)?;
        self.refresh_with(&refresh_token).await
    }

    /// Refresh with a specific refresh token, joining an in-flight refresh
    /// for the same token if there is one.
    pub async fn refresh_with(&self, refresh_token: &str) -> Result<TokenRecord, AuthError> {
        let future = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(in_flight)
                    if in_flight.refresh_token == refresh_token
                        && in_flight.future.peek().is_none() =>
                {
                    debug!("Joining in-flight token refresh");
                    in_flight.future.clone()
                }
                _ => {
                    let inner = Arc::clone(&self.inner);
                    let token = refresh_token.to_string();
                    let future = async move { run_refresh(inner, token).await }
                        .boxed()
                        .shared();
                    *slot = Some(InFlight {
                        refresh_token: refresh_token.to_string(),
                        future: future.clone(),
                    });
                    future
                }
            }
        };
        future.await
    }

    /// Forget any in-flight refresh, e.g. after sign-out
    pub fn reset(&self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

async fn run_refresh(inner: Arc<RefresherInner>, refresh_token: String) -> Result<TokenRecord, AuthError> {
    debug!("Requesting new access token");
    let record = inner
        .client
        .refresh_token(&refresh_token)
        .await
        .map_err(|e| {
            warn!(error = %e, "Token refresh request failed");
            AuthError::RefreshFailed(e.to_string())
        })?;

    let _persist = inner.session.persist_guard().await;
    if inner.session.snapshot().refresh_token() != Some(refresh_token.as_str()) {
        debug!("Session changed during refresh, discarding new token");
        return Err(AuthError::RefreshFailed("session changed during refresh".to_string()));
    }

    let serialized = serde_json::to_string(&record)
        .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
    inner.store.set(TOKEN_KEY, &serialized).await?;

    if !inner
        .session
        .patch_token_for(&refresh_token, &record.token, record.creation_date)
    {
        debug!("Session changed while persisting token, discarding new token");
        return Err(AuthError::RefreshFailed("session changed during refresh".to_string()));
    }
    inner.client.set_authorization(Some(&record.token))?;

    info!(issued_at = %record.creation_date, "Access token refreshed");
    Ok(record)
}
