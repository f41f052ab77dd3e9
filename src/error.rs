//! Error taxonomy for the connection manager.

use crate::platform::{AccountStatus, Platform};

/// Failures surfaced by [`ConnectionManager`](crate::manager::ConnectionManager).
///
/// Every variant carries a machine-readable [`kind`](Self::kind) so the UI
/// can map it to an actionable prompt ("re-authorize", "try again later").
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("unsupported platform '{0}'")]
    UnsupportedPlatform(String),

    #[error("OAuth is not configured for {0}")]
    NotConfigured(Platform),

    #[error("invalid or expired OAuth state, restart the authorization flow")]
    InvalidOrExpiredState,

    #[error("authorization denied by platform: {0}")]
    AuthorizationDenied(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("could not fetch account profile: {0}")]
    ProfileFetchFailed(String),

    #[error("{0} does not support token refresh, re-authorization required")]
    RefreshUnsupported(Platform),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("account is {0}, re-authorization required")]
    ReauthorizationRequired(AccountStatus),

    #[error("platform unavailable: {0}")]
    VendorUnavailable(String),

    #[error("account '{0}' not found")]
    AccountNotFound(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ConnectionError {
    /// Stable identifier for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionError::UnsupportedPlatform(_) => "unsupported_platform",
            ConnectionError::NotConfigured(_) => "not_configured",
            ConnectionError::InvalidOrExpiredState => "invalid_or_expired_state",
            ConnectionError::AuthorizationDenied(_) => "authorization_denied",
            ConnectionError::TokenExchangeFailed(_) => "token_exchange_failed",
            ConnectionError::ProfileFetchFailed(_) => "profile_fetch_failed",
            ConnectionError::RefreshUnsupported(_) => "refresh_unsupported",
            ConnectionError::RefreshFailed(_) => "refresh_failed",
            ConnectionError::ReauthorizationRequired(_) => "reauthorization_required",
            ConnectionError::VendorUnavailable(_) => "vendor_unavailable",
            ConnectionError::AccountNotFound(_) => "account_not_found",
            ConnectionError::Storage(_) => "storage",
        }
    }
}

/// Failure of a single outbound vendor call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VendorError {
    /// Vendor answered with a non-success status
    #[error("vendor rejected request with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// Network error or timeout
    #[error("vendor unreachable: {0}")]
    Unavailable(String),

    /// Vendor answered 2xx but the body could not be understood
    #[error("unexpected vendor response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VendorError::Malformed(err.to_string())
        } else {
            VendorError::Unavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_snake_case() {
        let errors = [
            ConnectionError::UnsupportedPlatform("myspace".to_string()),
            ConnectionError::InvalidOrExpiredState,
            ConnectionError::RefreshUnsupported(Platform::Instagram),
            ConnectionError::ReauthorizationRequired(AccountStatus::Revoked),
            ConnectionError::Storage(anyhow::anyhow!("disk full")),
        ];

        for err in errors {
            let kind = err.kind();
            assert!(kind.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{}", kind);
        }
    }

    #[test]
    fn test_storage_message_includes_cause() {
        let err = ConnectionError::Storage(
            anyhow::anyhow!("database is locked").context("Failed to update platform account"),
        );
        assert_eq!(
            err.to_string(),
            "storage error: Failed to update platform account: database is locked"
        );
    }

    #[test]
    fn test_messages_name_the_platform() {
        let err = ConnectionError::RefreshUnsupported(Platform::Threads);
        assert_eq!(
            err.to_string(),
            "threads does not support token refresh, re-authorization required"
        );

        let err = ConnectionError::ReauthorizationRequired(AccountStatus::Revoked);
        assert_eq!(err.to_string(), "account is revoked, re-authorization required");
    }

    #[test]
    fn test_vendor_error_display() {
        let err = VendorError::Rejected {
            status: 400,
            detail: "invalid_grant".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "vendor rejected request with status 400: invalid_grant"
        );
    }
}
