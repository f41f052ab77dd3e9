//! HTTP surface for platform connections.
//!
//! Every route except the vendor callback needs `Authorization: Bearer <user id>`.
//! Starting a flow also needs `X-Session-Id`; the session is handed back as a
//! cookie so the vendor's browser redirect can be matched to the pending flow.

use crate::accounts::PlatformAccount;
use crate::auth::{
    extract_bearer_token, extract_callback_session, extract_session, session_cookie, AuthError,
};
use crate::error::ConnectionError;
use crate::manager::{AuthorizationRequest, ConnectionManager};
use crate::oauth::supports_refresh;
use crate::platform::Platform;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

/// Application error types for connection endpoints
#[derive(Debug)]
pub enum AppError {
    Unauthorized(AuthError),
    BadRequest(String),
    Connection(ConnectionError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err)
    }
}

impl From<ConnectionError> for AppError {
    fn from(err: ConnectionError) -> Self {
        AppError::Connection(err)
    }
}

fn connection_status(err: &ConnectionError) -> StatusCode {
    match err {
        ConnectionError::UnsupportedPlatform(_) | ConnectionError::AccountNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ConnectionError::InvalidOrExpiredState | ConnectionError::AuthorizationDenied(_) => {
            StatusCode::BAD_REQUEST
        }
        ConnectionError::NotConfigured(_) | ConnectionError::VendorUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ConnectionError::TokenExchangeFailed(_)
        | ConnectionError::ProfileFetchFailed(_)
        | ConnectionError::RefreshFailed(_) => StatusCode::BAD_GATEWAY,
        ConnectionError::RefreshUnsupported(_) | ConnectionError::ReauthorizationRequired(_) => {
            StatusCode::CONFLICT
        }
        ConnectionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            AppError::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e.to_string(), "unauthorized"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
            AppError::Connection(e) => {
                if let ConnectionError::Storage(inner) = &e {
                    error!(error = %format!("{:#}", inner), "Account storage failure");
                }
                (connection_status(&e), e.to_string(), e.kind())
            }
        };

        (status, Json(ErrorResponse { error, kind })).into_response()
    }
}

/// Shared application state for the connection API
#[derive(Clone)]
pub struct ConnectionAppState {
    pub manager: Arc<ConnectionManager>,
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Platform listing entry
#[derive(Debug, Serialize)]
pub struct PlatformInfo {
    platform: Platform,
    configured: bool,
    supports_refresh: bool,
}

/// Account as returned to the UI: stored fields (never tokens) plus validity.
#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    account: PlatformAccount,
    valid: bool,
}

impl From<PlatformAccount> for AccountView {
    fn from(account: PlatformAccount) -> Self {
        let valid = account.is_valid();
        Self { account, valid }
    }
}

/// Create connection API router
pub fn create_router(state: ConnectionAppState) -> Router {
    Router::new()
        .route("/api/platforms", get(list_platforms))
        .route("/api/platforms/:platform/oauth/start", post(oauth_start))
        .route("/api/platforms/:platform/oauth/callback", get(oauth_callback))
        .route("/api/accounts", get(list_accounts))
        .route("/api/accounts/:id", get(get_account).delete(delete_account))
        .route("/api/accounts/:id/refresh", post(refresh_account))
        .route("/api/accounts/:id/disconnect", post(disconnect_account))
        .with_state(Arc::new(state))
}

/// GET /api/platforms
async fn list_platforms(
    State(state): State<Arc<ConnectionAppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PlatformInfo>>, AppError> {
    extract_bearer_token(&headers)?;

    let platforms = Platform::ALL
        .iter()
        .map(|&platform| PlatformInfo {
            platform,
            configured: state.manager.providers().is_configured(platform),
            supports_refresh: supports_refresh(platform),
        })
        .collect();

    Ok(Json(platforms))
}

/// POST /api/platforms/:platform/oauth/start
///
/// Returns the vendor authorization URL. The UI redirects the user there.
/// Sets the session cookie read back by the callback.
async fn oauth_start(
    State(state): State<Arc<ConnectionAppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = extract_session(&headers)?;
    debug!(platform = %platform, user_id = %session.user_id, "OAuth start requested");

    let cookie = session_cookie(
        &session.session_id,
        state.manager.states().expiry_seconds(),
        state.manager.has_secure_callback(),
    )?;
    let request: AuthorizationRequest = state.manager.begin_authorization(&session, &platform)?;

    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(request)).into_response())
}

/// GET /api/platforms/:platform/oauth/callback
///
/// Vendor redirect target. No bearer token: the session cookie and the
/// state identify the flow, and the account goes to the user who started it.
async fn oauth_callback(
    State(state): State<Arc<ConnectionAppState>>,
    Path(platform): Path<String>,
    Query(callback): Query<OAuthCallback>,
    headers: HeaderMap,
) -> Result<Json<AccountView>, AppError> {
    let session_id = extract_callback_session(&headers)?;
    debug!(platform = %platform, "OAuth callback received");

    if let Some(error) = callback.error {
        let reason = match callback.error_description {
            Some(description) => format!("{} - {}", error, description),
            None => error,
        };
        return Err(state
            .manager
            .reject_authorization(&session_id, &platform, callback.state.as_deref(), &reason)
            .into());
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let account = state
        .manager
        .complete_authorization(&session_id, &platform, &csrf_state, &code)
        .await?;

    Ok(Json(account.into()))
}

/// GET /api/accounts
async fn list_accounts(
    State(state): State<Arc<ConnectionAppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<AccountView>>, AppError> {
    let user_id = extract_bearer_token(&headers)?;
    let accounts = state.manager.list_accounts(&user_id)?;
    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

/// GET /api/accounts/:id
async fn get_account(
    State(state): State<Arc<ConnectionAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AccountView>, AppError> {
    let user_id = extract_bearer_token(&headers)?;
    let account = state.manager.account_for(&user_id, &id)?;
    Ok(Json(account.into()))
}

/// POST /api/accounts/:id/refresh
async fn refresh_account(
    State(state): State<Arc<ConnectionAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AccountView>, AppError> {
    let user_id = extract_bearer_token(&headers)?;
    let account = state.manager.account_for(&user_id, &id)?;
    let refreshed = state.manager.refresh(&account).await?;
    Ok(Json(refreshed.into()))
}

/// POST /api/accounts/:id/disconnect
async fn disconnect_account(
    State(state): State<Arc<ConnectionAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AccountView>, AppError> {
    let user_id = extract_bearer_token(&headers)?;
    let account = state.manager.account_for(&user_id, &id)?;
    let disconnected = state.manager.disconnect(&account).await?;
    Ok(Json(disconnected.into()))
}

/// DELETE /api/accounts/:id
async fn delete_account(
    State(state): State<Arc<ConnectionAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user_id = extract_bearer_token(&headers)?;
    state.manager.delete_account(&user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
