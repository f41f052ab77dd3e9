use axum::http::{HeaderMap, HeaderValue};


/// Header carrying the caller's session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Cookie carrying the session id across the vendor redirect
pub const SESSION_COOKIE: &str = "social_connect_session";

/// Authenticated user plus the session that pending authorizations are
/// scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
}

impl Session {
    pub fn new(user_id: &str, session_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// The token is the opaque id of the authenticated user.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(AuthError::Missing)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract the user and session id from request headers
///
/// Requires both the bearer token and the `X-Session-Id` header.
pub fn extract_session(headers: &HeaderMap) -> Result<Session, AuthError> {
    let user_id = extract_bearer_token(headers)?;

    let session_id = headers
        .get(SESSION_HEADER)
        .ok_or(AuthError::MissingSession)?
        .to_str()
        .map_err(|_| AuthError::MissingSession)?
        .trim();

    if session_id.is_empty() {
        return Err(AuthError::MissingSession);
    }

    Ok(Session {
        user_id,
        session_id: session_id.to_string(),
    })
}

/// Session id of a vendor redirect.
///
/// The browser arrives from the vendor with neither the bearer token nor
/// custom headers, so the session is read from the cookie set when the flow
/// started. `X-Session-Id` is accepted for non-browser clients.
pub fn extract_callback_session(headers: &HeaderMap) -> Result<String, AuthError> {
    let from_cookie = headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookies| extract_cookie_value(cookies, SESSION_COOKIE));

    let session_id = match from_cookie {
        Some(session_id) => session_id,
        None => headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
    };

    if session_id.is_empty() {
        return Err(AuthError::MissingSession);
    }
    Ok(session_id)
}

/// Builds the `Set-Cookie` value binding the browser to `session_id` for
/// `max_age_seconds`.
pub fn session_cookie(
    session_id: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, AuthError> {
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AuthError::InvalidSession);
    }

    // Lax: the vendor redirect is a cross-site top-level GET
    let secure_flag = if secure { " Secure;" } else { "" };
    let cookie = format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path=/api/platforms; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        secure_flag,
        max_age_seconds.max(0)
    );
    HeaderValue::from_str(&cookie).map_err(|_| AuthError::InvalidSession)
}

fn extract_cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, AuthError> {
    let Some((scheme, token)) = header_value.split_once(' ') else {
        return Err(AuthError::InvalidFormat);
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Empty);
    }

    Ok(token.to_string())
}

/// Request authentication errors
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization token not provided")]
    Missing,
    #[error("Invalid authorization token format")]
    InvalidFormat,
    #[error("Authorization token is empty")]
    Empty,
    #[error("Session id not provided (X-Session-Id header or session cookie)")]
    MissingSession,
    #[error("Session id contains characters not allowed in a cookie")]
    InvalidSession,
}
