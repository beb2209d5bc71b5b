//! The in-memory session: single source of truth for who is signed in.
//!
//! `SessionState` owns the current `Session` and publishes every committed
//! change twice: synchronously to registered `SessionObserver`s (the refresh
//! scheduler and the reactive interceptor re-arm from there, before any new
//! work can observe stale timers) and asynchronously through a `watch`
//! channel for the UI layer.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::debug;

use crate::models::User;

/// Access and refresh tokens always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token was minted
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    tokens: Option<SessionTokens>,
    user: Option<User>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh_token.as_str())
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.tokens.as_ref().map(|t| t.issued_at)
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

/// Notified synchronously after every committed session change.
pub trait SessionObserver: Send + Sync {
    fn session_changed(&self, session: &Session);
}

pub struct SessionState {
    tx: watch::Sender<Session>,
    observers: Mutex<Vec<Weak<dyn SessionObserver>>>,
    // Orders commits with their notifications
    commit_lock: Mutex<()>,
    // Held while the session and the credential store are written together
    persist_lock: AsyncMutex<()>,
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self {
            tx,
            observers: Mutex::new(Vec::new()),
            commit_lock: Mutex::new(()),
            persist_lock: AsyncMutex::new(()),
        }
    }

    /// Latest committed session
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Register an observer. Only a weak reference is kept.
    pub fn observe(&self, observer: &Arc<dyn SessionObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(observer));
    }

    /// Exclusive access for writes that touch both the credential store and
    /// the session. Sign-in, sign-out, profile writes and token refresh hold it from
    /// their session check until the session is committed, so the store never
    /// ends up holding keys of a session that is gone.
    pub(crate) async fn persist_guard(&self) -> AsyncMutexGuard<'_, ()> {
        self.persist_lock.lock().await
    }

    /// Replace the whole session at once
    pub fn hydrate(
        &self,
        access_token: &str,
        user: User,
        refresh_token: &str,
        issued_at: DateTime<Utc>,
    ) {
        let next = Session {
            tokens: Some(SessionTokens {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                issued_at,
            }),
            user: Some(user),
        };
        self.commit(|session| {
            if *session == next {
                return false;
            }
            *session = next;
            true
        });
    }

    /// Reset to the anonymous session
    pub fn clear(&self) {
        self.commit(|session| {
            if *session == Session::default() {
                return false;
            }
            *session = Session::default();
            true
        });
    }

    /// Swap in a new access token, keeping user and refresh token.
    /// Returns false when there is no session to patch.
    pub fn patch_token(&self, access_token: &str, issued_at: DateTime<Utc>) -> bool {
        self.patch_token_if(|_| true, access_token, issued_at)
    }

    /// Like `patch_token`, but only while the session still belongs to
    /// `refresh_token`. A refresh that outlived its session is dropped here.
    pub fn patch_token_for(
        &self,
        refresh_token: &str,
        access_token: &str,
        issued_at: DateTime<Utc>,
    ) -> bool {
        self.patch_token_if(|t| t.refresh_token == refresh_token, access_token, issued_at)
    }

    fn patch_token_if(
        &self,
        applies: impl FnOnce(&SessionTokens) -> bool,
        access_token: &str,
        issued_at: DateTime<Utc>,
    ) -> bool {
        let mut patched = false;
        self.commit(|session| match session.tokens.as_mut() {
            Some(tokens) if applies(tokens) => {
                tokens.access_token = access_token.to_string();
                tokens.issued_at = issued_at;
                patched = true;
                true
            }
            _ => false,
        });
        patched
    }

    /// Replace the profile of the signed-in user. Tokens are untouched.
    pub fn set_user(&self, user: User) -> bool {
        self.commit(|session| {
            if !session.is_authenticated() {
                return false;
            }
            session.user = Some(user);
            true
        })
    }

    /// Observers are notified under `commit_lock`, so they see commits in
    /// order and the last notification always carries the latest session.
    /// Observers must not commit.
    fn commit(&self, modify: impl FnOnce(&mut Session) -> bool) -> bool {
        let _commit = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = self.tx.send_if_modified(modify);
        if changed {
            let snapshot = self.snapshot();
            debug!(authenticated = snapshot.is_authenticated(), "Session changed");
            for observer in self.live_observers() {
                observer.session_changed(&snapshot);
            }
        }
        changed
    }

    fn live_observers(&self) -> Vec<Arc<dyn SessionObserver>> {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| o.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user(name: &str) -> User {
        User {
            id: "u1".to_string(),
            name: name.to_string(),
            email: "ana@example.com".to_string(),
            avatar_url: None,
        }
    }

    fn consistent(session: &Session) -> bool {
        session.access_token().is_some() == session.refresh_token().is_some()
            && session.issued_at().is_some() == session.access_token().is_some()
    }

    struct Counter(AtomicUsize);

    impl SessionObserver for Counter {
        fn session_changed(&self, _session: &Session) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hydrate_and_clear() {
        let state = SessionState::new();
        assert!(!state.snapshot().is_authenticated());

        let now = Utc::now();
        state.hydrate("t1", user("Ana"), "r1", now);
        let session = state.snapshot();
        assert_eq!(session.access_token(), Some("t1"));
        assert_eq!(session.refresh_token(), Some("r1"));
        assert_eq!(session.issued_at(), Some(now));
        assert_eq!(session.user().map(|u| u.name.as_str()), Some("Ana"));

        state.clear();
        assert_eq!(state.snapshot(), Session::default());
    }

    #[test]
    fn test_patch_token_keeps_user_and_refresh_token() {
        let state = SessionState::new();
        assert!(!state.patch_token("t2", Utc::now()));
        assert!(!state.snapshot().is_authenticated());

        state.hydrate("t1", user("Ana"), "r1", Utc::now() - Duration::seconds(20));
        let later = Utc::now();
        assert!(state.patch_token("t2", later));

        let session = state.snapshot();
        assert_eq!(session.access_token(), Some("t2"));
        assert_eq!(session.refresh_token(), Some("r1"));
        assert_eq!(session.issued_at(), Some(later));
        assert_eq!(session.user().map(|u| u.name.as_str()), Some("Ana"));
    }

    #[test]
    fn test_patch_token_for_other_session_is_dropped() {
        let state = SessionState::new();
        state.hydrate("t1", user("Ana"), "r1", Utc::now());
        assert!(!state.patch_token_for("r-old", "t-stale", Utc::now()));
        assert_eq!(state.snapshot().access_token(), Some("t1"));
        assert!(state.patch_token_for("r1", "t2", Utc::now()));
        assert_eq!(state.snapshot().access_token(), Some("t2"));
    }

    #[test]
    fn test_set_user_requires_session() {
        let state = SessionState::new();
        assert!(!state.set_user(user("Ana")));
        assert!(state.snapshot().user().is_none());

        state.hydrate("t1", user("Ana"), "r1", Utc::now());
        assert!(state.set_user(user("Ana Maria")));
        assert_eq!(state.snapshot().user().map(|u| u.name.as_str()), Some("Ana Maria"));
        assert_eq!(state.snapshot().access_token(), Some("t1"));
    }

    #[test]
    fn test_tokens_present_together_across_operations() {
        let state = SessionState::new();
        // Fixed pseudo-random walk over the mutating operations
        let mut seed: u32 = 0x2545_f491;
        for step in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 4 {
                0 => state.hydrate(&format!("t{step}"), user("Ana"), &format!("r{step}"), Utc::now()),
                1 => state.clear(),
                2 => {
                    state.patch_token(&format!("p{step}"), Utc::now());
                }
                _ => {
                    state.set_user(user("Bia"));
                }
            }
            assert!(consistent(&state.snapshot()), "inconsistent after step {step}");
        }
    }

    #[test]
    fn test_observers_see_only_real_changes() {
        let state = SessionState::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let observer: Arc<dyn SessionObserver> = counter.clone();
        state.observe(&observer);

        state.clear(); // already anonymous
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        let now = Utc::now();
        state.hydrate("t1", user("Ana"), "r1", now);
        state.hydrate("t1", user("Ana"), "r1", now);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        state.clear();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let state = SessionState::new();
        let observer: Arc<dyn SessionObserver> = Arc::new(Counter(AtomicUsize::new(0)));
        state.observe(&observer);
        drop(observer);

        state.hydrate("t1", user("Ana"), "r1", Utc::now());
        assert!(state.live_observers().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_changes() {
        let state = SessionState::new();
        let mut rx = state.subscribe();
        state.hydrate("t1", user("Ana"), "r1", Utc::now());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());
    }

    struct LastSeen(Mutex<Option<String>>);

    impl SessionObserver for LastSeen {
        fn session_changed(&self, session: &Session) {
            *self.0.lock().unwrap() = session.refresh_token().map(str::to_string);
        }
    }

    #[test]
    fn test_concurrent_commits_notify_latest_last() {
        for _ in 0..2_000 {
            let state = SessionState::new();
            let seen = Arc::new(LastSeen(Mutex::new(None)));
            let observer: Arc<dyn SessionObserver> = seen.clone();
            state.observe(&observer);

            let barrier = std::sync::Barrier::new(2);
            let now = Utc::now();
            std::thread::scope(|scope| {
                for refresh_token in ["rA", "rB"] {
                    let (barrier, state) = (&barrier, &state);
                    scope.spawn(move || {
                        barrier.wait();
                        state.hydrate("t1", user("Ana"), refresh_token, now);
                    });
                }
            });

            assert_eq!(seen.0.lock().unwrap().as_deref(), state.snapshot().refresh_token());
        }
    }
}
