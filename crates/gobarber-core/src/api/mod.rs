//! REST API client module for the GoBarber backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! GoBarber API: signing in, refreshing tokens, browsing providers and
//! booking appointments.
//!
//! The API uses bearer token authentication. The client carries a mutable
//! default Authorization header and a registry of response interceptors
//! that get a chance to recover requests rejected with 401.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use interceptor::{InterceptorId, ResponseInterceptor};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
