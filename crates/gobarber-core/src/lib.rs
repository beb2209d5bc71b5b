//! gobarber-core - client library for the GoBarber booking API.
//!
//! The heart of the crate is the session lifecycle in [`auth`]: credentials
//! are persisted in a [`store::CredentialStore`], attached to every request
//! by the [`api::ApiClient`], renewed before they expire and, when a request
//! still fails with 401, renewed and replayed once.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gobarber_core::{ApiClient, AuthFacade, MemoryStore, SignInCredentials};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new("http://localhost:3333")?;
//! let auth = AuthFacade::new(client, Arc::new(MemoryStore::new()));
//! auth.restore().await;
//! auth.sign_in(&SignInCredentials::new("ana@example.com", "123456")).await?;
//! let providers = auth.api().list_providers().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthFacade, Session};
pub use config::{Config, StorageBackend};
pub use models::{
    Appointment, HourAvailability, NewAppointment, ProfileUpdate, Provider, SignInCredentials,
    TokenRecord, User,
};
pub use store::{CredentialStore, FileStore, KeyringStore, MemoryStore};
