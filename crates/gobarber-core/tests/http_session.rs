//! End-to-end session behavior against a mock GoBarber server.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use gobarber_core::store::{CredentialStore, SESSION_KEYS};
use gobarber_core::{
    ApiClient, ApiError, AuthError, AuthFacade, FileStore, MemoryStore, NewAppointment,
    SignInCredentials,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token(value: &str) -> serde_json::Value {
    json!({ "token": value, "creationDate": Utc::now().to_rfc3339() })
}

fn user() -> serde_json::Value {
    json!({ "id": "u1", "name": "Ana Souza", "email": "ana@example.com", "avatar_url": null })
}

async fn mount_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({ "email": "ana@example.com", "password": "123456" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token("t1"),
            "user": user(),
            "refreshToken": "r1",
        })))
        .mount(server)
        .await;
}

async fn signed_in(server: &MockServer, store: Arc<dyn CredentialStore>) -> AuthFacade {
    let client = ApiClient::new(&server.uri()).expect("client builds");
    let auth = AuthFacade::new(client, store);
    auth.restore().await;
    auth.sign_in(&SignInCredentials::new("ana@example.com", "123456"))
        .await
        .expect("sign in succeeds");
    auth
}

#[tokio::test]
async fn sign_in_attaches_bearer_token() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "p1", "name": "Carlos", "avatar_url": null }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let auth = signed_in(&server, Arc::new(MemoryStore::new())).await;
    assert_eq!(auth.current_user().map(|u| u.first_name().to_string()), Some("Ana".to_string()));

    let providers = auth.api().list_providers().await.unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].name, "Carlos");
}

#[tokio::test]
async fn rejected_credentials_fail_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "message": "Incorrect email/password combination.",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let auth = AuthFacade::new(ApiClient::new(&server.uri()).unwrap(), Arc::new(MemoryStore::new()));
    auth.restore().await;
    let err = auth
        .sign_in(&SignInCredentials::new("ana@example.com", "nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationFailed(_)));
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid JWT token" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/token"))
        .and(body_json(json!({ "refreshToken": "r1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token("t2") })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let auth = signed_in(&server, store.clone()).await;

    let providers = auth.api().list_providers().await.unwrap();
    assert!(providers.is_empty());
    assert_eq!(auth.session().access_token(), Some("t2"));
    assert_eq!(auth.api().authorization().as_deref(), Some("Bearer t2"));

    let stored = store.get(gobarber_core::store::TOKEN_KEY).await.unwrap().unwrap();
    assert!(stored.contains("\"t2\""));
}

#[tokio::test]
async fn second_rejection_is_surfaced() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token("t2") })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = signed_in(&server, Arc::new(MemoryStore::new())).await;
    let err = auth.api().list_providers().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
}

#[tokio::test]
async fn failed_refresh_fails_original_request() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid refresh token" })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = signed_in(&server, Arc::new(MemoryStore::new())).await;
    let err = auth.api().list_providers().await.unwrap_err();
    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert_eq!(auth.session().access_token(), Some("t1"));
}

#[tokio::test]
async fn session_survives_restart_with_file_store() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    let dir = TempDir::new().unwrap();

    {
        let auth = signed_in(&server, Arc::new(FileStore::new(dir.path()))).await;
        assert!(auth.is_authenticated());
    }

    let auth = AuthFacade::new(
        ApiClient::new(&server.uri()).unwrap(),
        Arc::new(FileStore::new(dir.path())),
    );
    assert!(auth.is_loading());
    auth.restore().await;
    assert!(!auth.is_loading());
    assert_eq!(auth.session().access_token(), Some("t1"));
    assert_eq!(auth.session().refresh_token(), Some("r1"));
    assert_eq!(auth.api().authorization().as_deref(), Some("Bearer t1"));

    auth.sign_out().await.unwrap();
    let store = FileStore::new(dir.path());
    assert_eq!(store.multi_get(&SESSION_KEYS).await.unwrap(), vec![None, None, None]);
}

#[tokio::test]
async fn booking_flow() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/providers/p1/day-availability"))
        .and(query_param("day", "6"))
        .and(query_param("month", "5"))
        .and(query_param("year", "2024"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "hour": 8, "available": false },
            { "hour": 9, "available": true },
            { "hour": 13, "available": true },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let date = Utc.with_ymd_and_hms(2024, 5, 6, 13, 0, 0).unwrap();
    Mock::given(method("POST"))
        .and(path("/appointments"))
        .and(body_json(json!({ "provider_id": "p1", "date": date })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "a1", "provider_id": "p1", "user_id": "u1", "date": date,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = signed_in(&server, Arc::new(MemoryStore::new())).await;
    let day = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
    let slots = auth.api().provider_day_availability("p1", day).await.unwrap();
    let periods = gobarber_core::models::split_by_period(&slots);
    assert_eq!(periods.available_hours().collect::<Vec<_>>(), vec![9, 13]);

    let appointment = auth
        .api()
        .create_appointment(&NewAppointment { provider_id: "p1".to_string(), date })
        .await
        .unwrap();
    assert_eq!(appointment.id.as_deref(), Some("a1"));
    assert_eq!(appointment.date, date);
}
