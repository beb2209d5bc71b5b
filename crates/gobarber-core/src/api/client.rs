//! API client for communicating with the GoBarber REST API.
//!
//! This module provides the `ApiClient` struct: a thin layer over a
//! `Transport` that owns the default Authorization header, runs response
//! interceptors on authentication failures, and exposes typed endpoint calls.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Datelike, NaiveDate};
use reqwest::header::{self, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::models::{
    Appointment, HourAvailability, NewAppointment, ProfileUpdate, Provider, RefreshResponse,
    SignInCredentials, SignInResponse, TokenRecord, User,
};

use super::interceptor::InterceptorRegistry;
use super::transport::bearer_value;
use super::{
    ApiError, ApiRequest, ApiResponse, InterceptorId, ReqwestTransport, ResponseInterceptor,
    Transport,
};

// ============================================================================
// Endpoints
// ============================================================================

const SESSIONS_PATH: &str = "sessions";
const REFRESH_PATH: &str = "sessions/token";
const PROFILE_PATH: &str = "profile";
const PROVIDERS_PATH: &str = "providers";
const APPOINTMENTS_PATH: &str = "appointments";

struct ClientInner {
    transport: Arc<dyn Transport>,
    default_authorization: RwLock<Option<HeaderValue>>,
    interceptors: Mutex<InterceptorRegistry>,
}

/// API client for GoBarber.
/// Clone is cheap and every clone shares the default headers and interceptors.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client talking to `base_url` over HTTP
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self::with_transport(Arc::new(ReqwestTransport::new(base_url)?)))
    }

    /// Create a client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                default_authorization: RwLock::new(None),
                interceptors: Mutex::new(InterceptorRegistry::default()),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Default headers
    // ------------------------------------------------------------------------

    /// Set or clear the default `Authorization: Bearer <token>` header.
    /// Last write wins.
    pub fn set_authorization(&self, token: Option<&str>) -> Result<(), ApiError> {
        let value = token.map(bearer_value).transpose()?;
        *self
            .inner
            .default_authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    /// Current default Authorization header value
    pub fn authorization(&self) -> Option<String> {
        self.inner
            .default_authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn apply_defaults(&self, request: &mut ApiRequest) {
        if request.headers.contains_key(header::AUTHORIZATION) {
            return;
        }
        let default = self
            .inner
            .default_authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(value) = default {
            request.headers.insert(header::AUTHORIZATION, value);
        }
    }

    // ------------------------------------------------------------------------
    // Interceptors
    // ------------------------------------------------------------------------

    pub fn register_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorId {
        let id = self.registry().register(interceptor);
        debug!(?id, "Registered response interceptor");
        id
    }

    pub fn eject_interceptor(&self, id: InterceptorId) -> bool {
        let removed = self.registry().eject(id);
        debug!(?id, removed, "Ejected response interceptor");
        removed
    }

    pub fn interceptor_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, InterceptorRegistry> {
        self.inner
            .interceptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send a request, returning the response only if it succeeded.
    ///
    /// A 401 on a refreshable request hands the request to the registered
    /// interceptors and replays it exactly once. A 401 on the replay, or any
    /// interceptor error, surfaces as failure.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.apply_defaults(&mut request);
        let response = self.inner.transport.execute(&request).await?;

        if !response.is_auth_failure() || request.skip_auth_refresh {
            return response.error_for_status();
        }

        let interceptors = self.registry().snapshot();
        if interceptors.is_empty() {
            return response.error_for_status();
        }

        debug!(method = %request.method, path = %request.path, "Authentication failed, running interceptors");
        for interceptor in interceptors {
            interceptor.on_auth_failure(&mut request).await?;
        }

        request.skip_auth_refresh = true;
        let retried = self.inner.transport.execute(&request).await?;
        if retried.is_auth_failure() {
            warn!(method = %request.method, path = %request.path, "Request still unauthorized after token refresh");
        }
        retried.error_for_status()
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::patch(path).json(body)?).await
    }

    // ------------------------------------------------------------------------
    // Session endpoints
    // ------------------------------------------------------------------------

    /// `POST sessions`. A rejected login is never refreshed or retried.
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<SignInResponse, ApiError> {
        let request = ApiRequest::post(SESSIONS_PATH)
            .json(credentials)?
            .skip_auth_refresh();
        self.send_json(request).await
    }

    /// `POST sessions/token`: mint a new access token from a refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRecord, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))?
            .skip_auth_refresh();
        let response: RefreshResponse = self.send_json(request).await?;
        Ok(response.token)
    }

    // ------------------------------------------------------------------------
    // Business endpoints
    // ------------------------------------------------------------------------

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.put(PROFILE_PATH, update).await
    }

    pub async fn list_providers(&self) -> Result<Vec<Provider>, ApiError> {
        self.get(PROVIDERS_PATH).await
    }

    pub async fn provider_day_availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<HourAvailability>, ApiError> {
        let request = ApiRequest::get(format!("{}/{}/day-availability", PROVIDERS_PATH, provider_id))
            .query("day", date.day())
            .query("month", date.month())
            .query("year", date.year());
        self.send_json(request).await
    }

    pub async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, ApiError> {
        self.post(APPOINTMENTS_PATH, appointment).await
    }
}
