//! The auth facade: the only surface the UI layer touches.
//!
//! `AuthFacade` composes the session state, the proactive scheduler, the
//! reactive interceptor and the credential store. Session changes re-arm
//! the scheduler and swap the interceptor synchronously, so sign-in,
//! sign-out and refreshes never leave stale timers behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::{ProfileUpdate, SignInCredentials, TokenRecord, User};
use crate::store::{CredentialStore, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY, USER_KEY};

use super::{
    AuthError, ReactiveRefresh, RefreshScheduler, RefreshTiming, Session, SessionObserver,
    SessionState, TokenRefresher,
};

/// A session as read back from the credential store
struct PersistedSession {
    token: TokenRecord,
    user: User,
    refresh_token: String,
}

pub struct AuthFacade {
    client: ApiClient,
    store: Arc<dyn CredentialStore>,
    session: Arc<SessionState>,
    refresher: TokenRefresher,
    scheduler: Arc<RefreshScheduler>,
    reactive: Arc<ReactiveRefresh>,
    loading: watch::Sender<bool>,
    restore_started: AtomicBool,
}

impl AuthFacade {
    pub fn new(client: ApiClient, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_timing(client, store, RefreshTiming::default())
    }

    pub fn with_timing(client: ApiClient, store: Arc<dyn CredentialStore>, timing: RefreshTiming) -> Self {
        let session = Arc::new(SessionState::new());
        let refresher = TokenRefresher::new(client.clone(), Arc::clone(&store), Arc::clone(&session));
        let scheduler = Arc::new(RefreshScheduler::new(refresher.clone(), timing));
        let reactive = Arc::new(ReactiveRefresh::new(client.clone(), refresher.clone()));

        let scheduler_observer: Arc<dyn SessionObserver> = scheduler.clone();
        let reactive_observer: Arc<dyn SessionObserver> = reactive.clone();
        session.observe(&reactive_observer);
        session.observe(&scheduler_observer);

        let (loading, _) = watch::channel(true);

        Self {
            client,
            store,
            session,
            refresher,
            scheduler,
            reactive,
            loading,
            restore_started: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    /// The API client, carrying the session's Authorization header
    pub fn api(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> Session {
        self.session.snapshot()
    }

    /// Watch session changes (sign-in, sign-out, refreshes, profile edits)
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.snapshot().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.snapshot().is_authenticated()
    }

    /// True until the startup restore has finished
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub async fn wait_until_loaded(&self) {
        let mut rx = self.loading.subscribe();
        // The sender lives in self, so this only errors if self is gone
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn has_refresh_interceptor(&self) -> bool {
        self.reactive.is_installed()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// One-shot startup hydration from the credential store.
    ///
    /// All three keys present: the session and default header are restored.
    /// Anything missing, unreadable or corrupt: the user starts signed out.
    /// Either way `is_loading` turns false.
    pub async fn restore(&self) {
        if self.restore_started.swap(true, Ordering::SeqCst) {
            debug!("Session restore already ran");
            return;
        }

        match self.load_persisted().await {
            Ok(Some(persisted)) => {
                if let Err(e) = self.client.set_authorization(Some(&persisted.token.token)) {
                    warn!(error = %e, "Stored token is not a valid header, starting signed out");
                } else {
                    self.session.hydrate(
                        &persisted.token.token,
                        persisted.user,
                        &persisted.refresh_token,
                        persisted.token.creation_date,
                    );
                    info!("Restored stored session");
                }
            }
            Ok(None) => debug!("No stored session"),
            Err(e) => warn!(error = %e, "Could not read stored session, starting signed out"),
        }

        self.loading.send_replace(false);
    }

    async fn load_persisted(&self) -> Result<Option<PersistedSession>, AuthError> {
        let values = self.store.multi_get(&SESSION_KEYS).await?;
        let (token, user, refresh_token) = match values.as_slice() {
            [Some(token), Some(user), Some(refresh_token)] => (token, user, refresh_token),
            _ => return Ok(None),
        };
        let token: TokenRecord = serde_json::from_str(token)
            .map_err(|e| AuthError::StorageUnavailable(format!("corrupt token record: {}", e)))?;
        let user: User = serde_json::from_str(user)
            .map_err(|e| AuthError::StorageUnavailable(format!("corrupt user record: {}", e)))?;
        Ok(Some(PersistedSession {
            token,
            user,
            refresh_token: refresh_token.clone(),
        }))
    }

    /// Sign in, persist the session and start keeping it fresh.
    ///
    /// Rejected credentials fail with `AuthenticationFailed` and leave any
    /// current session as it was.
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<User, AuthError> {
        let response = self
            .client
            .sign_in(credentials)
            .await
            .map_err(AuthError::from_sign_in)?;

        let token_json = serde_json::to_string(&response.token)
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        let user_json = serde_json::to_string(&response.user)
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        let _persist = self.session.persist_guard().await;
        self.store
            .multi_set(&[
                (TOKEN_KEY, token_json),
                (USER_KEY, user_json),
                (REFRESH_TOKEN_KEY, response.refresh_token.clone()),
            ])
            .await?;

        self.client.set_authorization(Some(&response.token.token))?;
        self.session.hydrate(
            &response.token.token,
            response.user.clone(),
            &response.refresh_token,
            response.token.creation_date,
        );

        info!(user_id = %response.user.id, "Signed in");
        Ok(response.user)
    }

    /// Forget the session everywhere. If the store cannot be cleared the
    /// sign-out is not confirmed and the session stays.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _persist = self.session.persist_guard().await;
        self.store.multi_remove(&SESSION_KEYS).await?;

        self.refresher.reset();
        self.session.clear();
        self.client.set_authorization(None)?;

        info!("Signed out");
        Ok(())
    }

    /// Persist a new profile for the signed-in user. Tokens and timers are untouched.
    pub async fn update_user(&self, user: User) -> Result<(), AuthError> {
        let _persist = self.session.persist_guard().await;
        if !self.is_authenticated() {
            return Err(AuthError::NotSignedIn);
        }
        let user_json = serde_json::to_string(&user)
            .map_err(|e| AuthError::StorageUnavailable(e.to_string()))?;
        self.store.set(USER_KEY, &user_json).await?;
        self.session.set_user(user);
        debug!("Updated stored profile");
        Ok(())
    }

    /// `PUT profile`, then keep the returned profile
    pub async fn save_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotSignedIn);
        }
        let user = self.client.update_profile(update).await?;
        self.update_user(user.clone()).await?;
        Ok(user)
    }
}

impl Drop for AuthFacade {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.reactive.teardown();
    }
}
