//! Proactive token renewal.
//!
//! Whenever the session's refresh token or token issuance time changes, the
//! scheduler cancels its timer and arms a new one: refresh right away when
//! the token is within the safety margin of expiry, otherwise once when it
//! reaches the margin, then every steady interval after that.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Session, SessionObserver, TokenRefresher};

/// Server-declared access token validity
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(30);

/// Minimum remaining lifetime before a refresh is forced
pub const SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// `TOKEN_LIFETIME - SAFETY_MARGIN`
pub const STEADY_INTERVAL: Duration = Duration::from_secs(25);

/// Token lifetime and safety margin. The margin is always shorter than the
/// lifetime, so the steady interval is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTiming {
    token_lifetime: Duration,
    safety_margin: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            token_lifetime: TOKEN_LIFETIME,
            safety_margin: SAFETY_MARGIN,
        }
    }
}

/// When the first refresh after arming should happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    Immediate,
    After(Duration),
}

impl RefreshTiming {
    /// Returns `None` unless `safety_margin < token_lifetime`
    pub fn new(token_lifetime: Duration, safety_margin: Duration) -> Option<Self> {
        (safety_margin < token_lifetime).then_some(Self {
            token_lifetime,
            safety_margin,
        })
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    pub fn steady_interval(&self) -> Duration {
        self.token_lifetime.saturating_sub(self.safety_margin)
    }

    /// Remaining lifetime of a token minted at `issued_at`, negative once expired
    pub fn time_left(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> chrono::Duration {
        let lifetime = chrono::Duration::from_std(self.token_lifetime).unwrap_or(chrono::Duration::zero());
        lifetime - (now - issued_at)
    }

    /// Plan the first refresh. Never waits longer than one steady interval,
    /// so an `issued_at` in the future (clock skew) cannot postpone renewal.
    pub fn plan(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> RefreshPlan {
        let margin = chrono::Duration::from_std(self.safety_margin).unwrap_or(chrono::Duration::zero());
        let time_left = self.time_left(issued_at, now);
        if time_left <= margin {
            return RefreshPlan::Immediate;
        }
        let delay = (time_left - margin).to_std().unwrap_or(Duration::ZERO);
        RefreshPlan::After(delay.min(self.steady_interval()))
    }
}

struct ArmedTimer {
    refresh_token: String,
    issued_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl ArmedTimer {
    fn matches(&self, session: &Session) -> bool {
        session
            .tokens()
            .map(|t| t.refresh_token == self.refresh_token && t.issued_at == self.issued_at)
            .unwrap_or(false)
    }
}

/// Owns the single proactive-refresh timer task.
pub struct RefreshScheduler {
    refresher: TokenRefresher,
    timing: RefreshTiming,
    armed: Mutex<Option<ArmedTimer>>,
}

impl RefreshScheduler {
    pub fn new(refresher: TokenRefresher, timing: RefreshTiming) -> Self {
        Self {
            refresher,
            timing,
            armed: Mutex::new(None),
        }
    }

    pub fn timing(&self) -> RefreshTiming {
        self.timing
    }

    /// Re-arm for `session`. A no-op when the refresh token and issuance
    /// time are unchanged; otherwise the old timer is cancelled first.
    pub fn sync(&self, session: &Session) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if armed.as_ref().is_some_and(|timer| timer.matches(session)) {
            return;
        }
        if let Some(timer) = armed.take() {
            timer.task.abort();
            debug!("Cancelled proactive refresh timer");
        }
        if let Some(tokens) = session.tokens() {
            let plan = self.timing.plan(tokens.issued_at, Utc::now());
            debug!(?plan, "Arming proactive refresh timer");
            let task = tokio::spawn(run_timer(
                self.refresher.clone(),
                tokens.refresh_token.clone(),
                plan,
                self.timing.steady_interval(),
            ));
            *armed = Some(ArmedTimer {
                refresh_token: tokens.refresh_token.clone(),
                issued_at: tokens.issued_at,
                task,
            });
        }
    }

    pub fn cancel(&self) {
        if let Some(timer) = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.task.abort();
            debug!("Cancelled proactive refresh timer");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|timer| !timer.task.is_finished())
    }
}

impl SessionObserver for RefreshScheduler {
    fn session_changed(&self, session: &Session) {
        self.sync(session);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_timer(refresher: TokenRefresher, refresh_token: String, plan: RefreshPlan, steady: Duration) {
    match plan {
        RefreshPlan::Immediate => debug!("Token within safety margin, refreshing now"),
        RefreshPlan::After(delay) => {
            debug!(delay_ms = delay.as_millis() as u64, "Waiting for first proactive refresh");
            tokio::time::sleep(delay).await;
        }
    }
    proactive_refresh(&refresher, &refresh_token).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + steady, steady);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        proactive_refresh(&refresher, &refresh_token).await;
    }
}

/// Failures are logged only: the reactive path covers the next request.
async fn proactive_refresh(refresher: &TokenRefresher, refresh_token: &str) {
    if let Err(e) = refresher.refresh_with(refresh_token).await {
        warn!(error = %e, "Proactive token refresh failed");
    }
}
