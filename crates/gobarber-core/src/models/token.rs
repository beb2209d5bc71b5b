use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

use super::User;

/// An access token together with the moment the server minted it.
/// Persisted verbatim under the token key as `{"token": .., "creationDate": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct TokenRecord {
    pub token: String,
    #[serde(rename = "creationDate")]
    pub creation_date: DateTime<Utc>,
}

/// Response of `POST sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct SignInResponse {
    pub token: TokenRecord,
    pub user: User,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Response of `POST sessions/token`
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub token: TokenRecord,
}
