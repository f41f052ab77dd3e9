// Integration tests for the platform connection API

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use social_connect::accounts::{AccountStore, Credentials};
use social_connect::api::{create_router, ConnectionAppState};
use social_connect::error::VendorError;
use social_connect::manager::ConnectionManager;
use social_connect::oauth::{
    ProviderConfig, ProviderRegistry, StateManager, VendorClient, VendorProfile,
};
use social_connect::platform::Platform;
use std::sync::Arc;
use tower::ServiceExt;

/// Vendor that accepts code "abc123" and refreshes successfully.
struct StubVendor;

#[async_trait]
impl VendorClient for StubVendor {
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Credentials, VendorError> {
        if code != "abc123" {
            return Err(VendorError::Rejected {
                status: 400,
                detail: "invalid_grant".to_string(),
            });
        }
        Ok(Credentials {
            access_token: format!("{}-access", provider.platform),
            refresh_token: Some(format!("{}-refresh", provider.platform)),
            expires_at: Some(Utc::now() + Duration::seconds(3600)),
        })
    }

    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        _access_token: &str,
    ) -> Result<VendorProfile, VendorError> {
        Ok(VendorProfile {
            external_account_id: format!("{}-ext-1", provider.platform),
            display_name: "Test Account".to_string(),
        })
    }

    async fn refresh_token(
        &self,
        provider: &ProviderConfig,
        _refresh_token: &str,
    ) -> Result<Credentials, VendorError> {
        Ok(Credentials {
            access_token: format!("{}-access-2", provider.platform),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::seconds(7200)),
        })
    }

    async fn revoke(&self, _provider: &ProviderConfig, _access_token: &str) -> Result<(), VendorError> {
        Ok(())
    }
}

fn create_test_app() -> Router {
    let key = BASE64.encode([0u8; 32]);
    let accounts = Arc::new(AccountStore::new(":memory:", &key).unwrap());

    let providers = ProviderRegistry::new()
        .with(ProviderConfig::new(Platform::Youtube, "yt-id", "yt-secret"))
        .with(ProviderConfig::new(Platform::Instagram, "ig-id", "ig-secret"));

    let manager = ConnectionManager::new(
        providers,
        Arc::new(StubVendor),
        accounts,
        StateManager::in_memory(600),
        "https://app.example.com",
    );

    create_router(ConnectionAppState {
        manager: Arc::new(manager),
    })
}

fn request(method: &str, uri: &str, user: Option<&str>, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", user));
    }
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send_raw(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, headers, json)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, _, json) = send_raw(app, req).await;
    (status, json)
}

/// Browser redirect from the vendor: only the session cookie, no auth headers.
fn callback_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Starts a flow and returns (cookie pair, state).
async fn start(app: &Router, user: &str, platform: &str) -> (String, String) {
    let (status, headers, json) = send_raw(
        app,
        request(
            "POST",
            &format!("/api/platforms/{}/oauth/start", platform),
            Some(user),
            Some("sess-1"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);

    let set_cookie = headers
        .get("set-cookie")
        .expect("start sets the session cookie")
        .to_str()
        .unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    (cookie, json["state"].as_str().unwrap().to_string())
}

/// Runs start + callback for `platform` and returns the account JSON.
async fn connect(app: &Router, user: &str, platform: &str) -> serde_json::Value {
    let (cookie, state) = start(app, user, platform).await;
    let (status, account) = send(
        app,
        callback_request(
            &format!("/api/platforms/{}/oauth/callback?code=abc123&state={}", platform, state),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", account);
    account
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = create_test_app();

    let (status, json) = send(&app, request("GET", "/api/accounts", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn test_start_requires_session() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        request("POST", "/api/platforms/youtube/oauth/start", Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn test_list_platforms() {
    let app = create_test_app();

    let (status, json) = send(&app, request("GET", "/api/platforms", Some("user1"), None)).await;
    assert_eq!(status, StatusCode::OK);

    let platforms = json.as_array().unwrap();
    assert_eq!(platforms.len(), 9);

    let youtube = platforms.iter().find(|p| p["platform"] == "youtube").unwrap();
    assert_eq!(youtube["configured"], true);
    assert_eq!(youtube["supports_refresh"], true);

    let instagram = platforms.iter().find(|p| p["platform"] == "instagram").unwrap();
    assert_eq!(instagram["configured"], true);
    assert_eq!(instagram["supports_refresh"], false);

    let tiktok = platforms.iter().find(|p| p["platform"] == "tiktok").unwrap();
    assert_eq!(tiktok["configured"], false);
}

#[tokio::test]
async fn test_full_connection_flow() {
    let app = create_test_app();

    let account = connect(&app, "user1", "youtube").await;
    assert_eq!(account["platform"], "youtube");
    assert_eq!(account["status"], "connected");
    assert_eq!(account["external_account_id"], "youtube-ext-1");
    assert_eq!(account["valid"], true);
    assert!(account.get("access_token").is_none());
    assert!(account.get("refresh_token").is_none());

    let (status, list) = send(&app, request("GET", "/api/accounts", Some("user1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_start_sets_session_cookie() {
    let app = create_test_app();

    let (status, headers, _) = send_raw(
        &app,
        request("POST", "/api/platforms/youtube/oauth/start", Some("user1"), Some("sess-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let set_cookie = headers.get("set-cookie").unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("social_connect_session=sess-1;"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("Max-Age=600"));
}

#[tokio::test]
async fn test_callback_without_auth_headers() {
    let app = create_test_app();
    let (cookie, state) = start(&app, "user1", "youtube").await;

    let (status, account) = send(
        &app,
        callback_request(
            &format!("/api/platforms/youtube/oauth/callback?code=abc123&state={}", state),
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", account);
    assert_eq!(account["user_id"], "user1");
    assert_eq!(account["status"], "connected");

    let (_, list) = send(&app, request("GET", "/api/accounts", Some("user1"), None)).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_callback_without_session_cookie() {
    let app = create_test_app();
    let (_, state) = start(&app, "user1", "youtube").await;

    let (status, json) = send(
        &app,
        callback_request(
            &format!("/api/platforms/youtube/oauth/callback?code=abc123&state={}", state),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn test_callback_from_other_session_rejected() {
    let app = create_test_app();
    let (_, state) = start(&app, "user1", "youtube").await;

    let (status, json) = send(
        &app,
        callback_request(
            &format!("/api/platforms/youtube/oauth/callback?code=abc123&state={}", state),
            Some("social_connect_session=sess-other"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_or_expired_state");
}

#[tokio::test]
async fn test_callback_replay_rejected() {
    let app = create_test_app();
    let (cookie, state) = start(&app, "user1", "youtube").await;
    let uri = format!(
        "/api/platforms/youtube/oauth/callback?code=abc123&state={}",
        state
    );

    let (status, _) = send(&app, callback_request(&uri, Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, callback_request(&uri, Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_or_expired_state");
}

#[tokio::test]
async fn test_callback_denied_by_user() {
    let app = create_test_app();
    let (cookie, state) = start(&app, "user1", "instagram").await;

    let uri = format!(
        "/api/platforms/instagram/oauth/callback?error=access_denied&error_description=User+cancelled&state={}",
        state
    );
    let (status, json) = send(&app, callback_request(&uri, Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "authorization_denied");

    // The denial consumed the state
    let uri = format!(
        "/api/platforms/instagram/oauth/callback?code=abc123&state={}",
        state
    );
    let (status, json) = send(&app, callback_request(&uri, Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_or_expired_state");
}

#[tokio::test]
async fn test_callback_missing_code() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        callback_request(
            "/api/platforms/youtube/oauth/callback?state=abc",
            Some("social_connect_session=sess-1"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "bad_request");
}

#[tokio::test]
async fn test_bad_code_is_token_exchange_failure() {
    let app = create_test_app();
    let (cookie, state) = start(&app, "user1", "youtube").await;
    let uri = format!(
        "/api/platforms/youtube/oauth/callback?code=wrong&state={}",
        state
    );

    let (status, json) = send(&app, callback_request(&uri, Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "token_exchange_failed");

    let (_, list) = send(&app, request("GET", "/api/accounts", Some("user1"), None)).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_and_unconfigured_platforms() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        request("POST", "/api/platforms/myspace/oauth/start", Some("user1"), Some("sess-1")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "unsupported_platform");

    let (status, json) = send(
        &app,
        request("POST", "/api/platforms/tiktok/oauth/start", Some("user1"), Some("sess-1")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "not_configured");
}

#[tokio::test]
async fn test_refresh_account() {
    let app = create_test_app();
    let account = connect(&app, "user1", "youtube").await;
    let id = account["id"].as_str().unwrap();

    let (status, json) = send(
        &app,
        request("POST", &format!("/api/accounts/{}/refresh", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "connected");
    assert_eq!(json["valid"], true);
}

#[tokio::test]
async fn test_refresh_unsupported_platform() {
    let app = create_test_app();
    let account = connect(&app, "user1", "instagram").await;
    let id = account["id"].as_str().unwrap();

    let (status, json) = send(
        &app,
        request("POST", &format!("/api/accounts/{}/refresh", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "refresh_unsupported");
}

#[tokio::test]
async fn test_disconnect_then_refresh() {
    let app = create_test_app();
    let account = connect(&app, "user1", "youtube").await;
    let id = account["id"].as_str().unwrap();

    for _ in 0..2 {
        let (status, json) = send(
            &app,
            request("POST", &format!("/api/accounts/{}/disconnect", id), Some("user1"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "revoked");
        assert_eq!(json["valid"], false);
    }

    let (status, json) = send(
        &app,
        request("POST", &format!("/api/accounts/{}/refresh", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "reauthorization_required");
}

#[tokio::test]
async fn test_accounts_hidden_from_other_users() {
    let app = create_test_app();
    let account = connect(&app, "user1", "youtube").await;
    let id = account["id"].as_str().unwrap();

    let (status, json) = send(
        &app,
        request("GET", &format!("/api/accounts/{}", id), Some("user2"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "account_not_found");

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/accounts/{}", id), Some("user2"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/accounts/{}", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        request("GET", &format!("/api/accounts/{}", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let app = create_test_app();
    let account = connect(&app, "user1", "youtube").await;
    let id = account["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        request("POST", &format!("/api/accounts/{}/disconnect", id), Some("user1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reconnected = connect(&app, "user1", "youtube").await;
    assert_eq!(reconnected["id"], account["id"]);
    assert_eq!(reconnected["status"], "connected");
    assert_eq!(reconnected["valid"], true);
}
