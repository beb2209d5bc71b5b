//! Authentication module: session lifecycle and token renewal.
//!
//! This module provides:
//! - `SessionState`: the in-memory session with change notification
//! - `TokenRefresher`: the shared refresh primitive, one call in flight per refresh token
//! - `RefreshScheduler`: proactive renewal before the token expires
//! - `ReactiveRefresh`: renew-and-replay for requests rejected with 401
//! - `AuthFacade`: sign-in, sign-out, profile updates and startup restore
//!
//! Access tokens live 30 seconds; renewal starts 5 seconds before expiry.

pub mod error;
pub mod facade;
pub mod interceptor;
pub mod refresher;
pub mod scheduler;
pub mod session;

pub use error::AuthError;
pub use facade::AuthFacade;
pub use interceptor::{ReactiveRefresh, RefreshInterceptor};
pub use refresher::TokenRefresher;
pub use scheduler::{
    RefreshPlan, RefreshScheduler, RefreshTiming, SAFETY_MARGIN, STEADY_INTERVAL, TOKEN_LIFETIME,
};
pub use session::{Session, SessionObserver, SessionState, SessionTokens};
