//! Outbound vendor calls: code exchange, profile lookup, refresh, revocation.
//!
//! [`VendorClient`] is the seam the connection manager talks through;
//! [`HttpVendorClient`] is the production implementation and dispatches on
//! the provider's platform for the few places where vendors differ.

use super::profile::{parse_profile, VendorProfile};
use super::provider::{ClientAuth, ProviderConfig, RevokeMethod};
use crate::accounts::Credentials;
use crate::error::VendorError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Default timeout for a single vendor call
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_credentials(self) -> Result<Credentials, VendorError> {
        // Calculate expiration time; out-of-range lifetimes are rejected
        let expires_at = match self.expires_in {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        VendorError::Malformed(format!("expires_in out of range: {}", seconds))
                    })?,
            ),
            None => None,
        };

        Ok(Credentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}

/// Per-platform adapter operations.
#[async_trait]
pub trait VendorClient: Send + Sync {
    /// Exchanges an authorization code for credentials. Never retried.
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credentials, VendorError>;

    /// Fetches the authorized account's identity.
    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<VendorProfile, VendorError>;

    /// Obtains new credentials from a refresh token.
    async fn refresh_token(
        &self,
        provider: &ProviderConfig,
        refresh_token: &str,
    ) -> Result<Credentials, VendorError>;

    /// Revokes the token at the vendor, where the vendor supports it.
    async fn revoke(&self, provider: &ProviderConfig, access_token: &str)
        -> Result<(), VendorError>;
}

/// [`VendorClient`] speaking each vendor's native OAuth 2.0 over HTTP.
#[derive(Clone)]
pub struct HttpVendorClient {
    http_client: reqwest::Client,
}

impl HttpVendorClient {
    pub fn new(timeout_seconds: u64) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self { http_client })
    }

    /// Adds client credentials the way the provider expects them.
    fn authenticate(
        &self,
        request: reqwest::RequestBuilder,
        provider: &ProviderConfig,
        form: &mut HashMap<&'static str, String>,
    ) -> reqwest::RequestBuilder {
        match provider.client_auth {
            ClientAuth::Form => {
                form.insert(provider.client_id_param(), provider.client_id.clone());
                form.insert("client_secret", provider.client_secret.clone());
                request
            }
            ClientAuth::Basic => {
                // Twitter also wants the id in the body for public-client compatibility
                form.insert("client_id", provider.client_id.clone());
                request.basic_auth(&provider.client_id, Some(&provider.client_secret))
            }
        }
    }

    async fn post_token_form(
        &self,
        provider: &ProviderConfig,
        mut form: HashMap<&'static str, String>,
    ) -> Result<Credentials, VendorError> {
        let request = self
            .http_client
            .post(&provider.token_url)
            .header("Accept", "application/json");
        let request = self.authenticate(request, provider, &mut form);

        let response = request.form(&form).send().await?;

        // Check response status
        let response = check_status(response).await?;

        // Parse token response
        let token_response: TokenResponse = response.json().await?;

        debug!(
            platform = %provider.platform,
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token endpoint call successful"
        );

        token_response.into_credentials()
    }
}

/// Turns a non-success response into [`VendorError::Rejected`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, VendorError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(VendorError::Rejected {
        status,
        detail: vendor_detail(&body),
    })
}

/// Picks the human-readable part of a vendor error body.
fn vendor_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let pointers = [
        "/error_description",
        "/error/message",
        "/message",
        "/error",
        "/detail",
    ];
    pointers
        .iter()
        .find_map(|p| json.pointer(p).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl VendorClient for HttpVendorClient {
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<Credentials, VendorError> {
        debug!(
            platform = %provider.platform,
            token_url = %provider.token_url,
            "Exchanging authorization code for token"
        );

        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code".to_string());
        form.insert("code", code.to_string());
        form.insert("redirect_uri", redirect_uri.to_string());
        if let Some(verifier) = code_verifier {
            form.insert("code_verifier", verifier.to_string());
        }

        self.post_token_form(provider, form).await
    }

    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<VendorProfile, VendorError> {
        debug!(platform = %provider.platform, "Fetching account profile");

        let response = self
            .http_client
            .get(&provider.profile_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let body: serde_json::Value = check_status(response).await?.json().await?;

        parse_profile(provider.platform, &body).ok_or_else(|| {
            VendorError::Malformed(format!(
                "{} profile response has no account id",
                provider.platform
            ))
        })
    }

    async fn refresh_token(
        &self,
        provider: &ProviderConfig,
        refresh_token: &str,
    ) -> Result<Credentials, VendorError> {
        debug!(platform = %provider.platform, "Refreshing OAuth token");

        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("refresh_token", refresh_token.to_string());

        self.post_token_form(provider, form).await
    }

    async fn revoke(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<(), VendorError> {
        let Some(revoke_url) = &provider.revoke_url else {
            debug!(platform = %provider.platform, "Platform has no revocation endpoint");
            return Ok(());
        };

        let request = match provider.revoke_method {
            RevokeMethod::DeleteWithBearer => self
                .http_client
                .delete(revoke_url)
                .bearer_auth(access_token),
            RevokeMethod::PostForm => {
                let mut form = HashMap::new();
                form.insert("token", access_token.to_string());
                let request = self.http_client.post(revoke_url);
                let request = self.authenticate(request, provider, &mut form);
                request.form(&form)
            }
        };

        check_status(request.send().await?).await?;

        debug!(platform = %provider.platform, "Token revoked at vendor");
        Ok(())
    }
}
