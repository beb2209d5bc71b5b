use std::sync::Arc;

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Failures surfaced by the auth facade and the refresh machinery.
///
/// `Clone` so one in-flight refresh outcome can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Api(Arc<ApiError>),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        AuthError::Api(Arc::new(err))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StorageUnavailable(err.to_string())
    }
}

impl AuthError {
    /// Map a sign-in failure: rejected credentials become `AuthenticationFailed`,
    /// transport problems stay `Api`.
    pub(crate) fn from_sign_in(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => {
                AuthError::AuthenticationFailed("Incorrect email/password combination".to_string())
            }
            ApiError::BadRequest(msg) | ApiError::AccessDenied(msg) => {
                AuthError::AuthenticationFailed(msg)
            }
            other => other.into(),
        }
    }
}
