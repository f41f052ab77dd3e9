//! Platform-account connection manager.
//!
//! Owns the lifecycle of a user's link to one external account:
//!
//! ```text
//! pending   --exchange ok-->     connected
//! connected --refresh ok-->      connected
//! connected --refresh fails-->   error
//! error     --refresh ok-->      connected
//! connected/error --disconnect--> revoked --disconnect--> revoked
//! ```
//!
//! Expiry is derived, never stored: a connected account whose token expired
//! stays `connected` and [`ConnectionManager::is_valid`] turns false.

use crate::accounts::{AccountStore, PlatformAccount};
use crate::auth::Session;
use crate::error::{ConnectionError, VendorError};
use crate::oauth::{
    pkce_pair, supports_refresh, ProviderConfig, ProviderRegistry, StateManager, VendorClient,
    VendorProfile,
};
use crate::platform::{AccountStatus, Platform};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};


/// Where to send the user, plus the state that must come back.
#[derive(Clone, Debug, Serialize)]
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub state: String,
}

/// Receives vendor revocation failures, which never fail a disconnect.
pub trait RevocationObserver: Send + Sync {
    fn revocation_failed(&self, account: &PlatformAccount, error: &VendorError);
}

/// Default observer: logs the failure.
pub struct LogRevocationFailures;

impl RevocationObserver for LogRevocationFailures {
    fn revocation_failed(&self, account: &PlatformAccount, error: &VendorError) {
        warn!(
            account_id = %account.id,
            platform = %account.platform,
            error = %error,
            "Vendor revocation failed, account disconnected locally"
        );
    }
}

/// Mediates the OAuth exchange for every supported platform and keeps the
/// stored credential state consistent with it.
pub struct ConnectionManager {
    providers: ProviderRegistry,
    vendor: Arc<dyn VendorClient>,
    accounts: Arc<AccountStore>,
    states: StateManager,
    revocation_observer: Arc<dyn RevocationObserver>,
    callback_base_url: String,
}

fn parse_platform(name: &str) -> Result<Platform, ConnectionError> {
    name.parse::<Platform>()
        .map_err(|_| ConnectionError::UnsupportedPlatform(name.to_string()))
}

impl ConnectionManager {
    pub fn new(
        providers: ProviderRegistry,
        vendor: Arc<dyn VendorClient>,
        accounts: Arc<AccountStore>,
        states: StateManager,
        callback_base_url: &str,
    ) -> Self {
        Self {
            providers,
            vendor,
            accounts,
            states,
            revocation_observer: Arc::new(LogRevocationFailures),
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_revocation_observer(mut self, observer: Arc<dyn RevocationObserver>) -> Self {
        self.revocation_observer = observer;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn states(&self) -> &StateManager {
        &self.states
    }

    /// True when vendors redirect back over https.
    pub fn has_secure_callback(&self) -> bool {
        self.callback_base_url.starts_with("https://")
    }

    /// Callback URL registered with the vendor; must match between start and exchange.
    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!(
            "{}/api/platforms/{}/oauth/callback",
            self.callback_base_url, platform
        )
    }

    fn provider(&self, platform: Platform) -> Result<&ProviderConfig, ConnectionError> {
        self.providers.get(platform).ok_or_else(|| {
            error!(platform = %platform, "OAuth provider config not found (missing client credentials?)");
            ConnectionError::NotConfigured(platform)
        })
    }

    /// Starts an authorization flow for the session's user.
    pub fn begin_authorization(
        &self,
        session: &Session,
        platform: &str,
    ) -> Result<AuthorizationRequest, ConnectionError> {
        let platform = parse_platform(platform)?;
        let provider = self.provider(platform)?;

        let (code_verifier, code_challenge) = if provider.requires_pkce {
            let (verifier, challenge) = pkce_pair();
            (Some(verifier), Some(challenge))
        } else {
            (None, None)
        };

        let state = self.states.create_state(
            &session.session_id,
            platform,
            &session.user_id,
            code_verifier,
        );
        let authorize_url = provider.build_auth_url(
            &state,
            &self.redirect_uri(platform),
            code_challenge.as_deref(),
        );

        info!(
            platform = %platform,
            user_id = %session.user_id,
            "Authorization flow started"
        );

        Ok(AuthorizationRequest {
            authorize_url,
            state,
        })
    }

    /// Completes a flow with the code returned by the vendor redirect.
    ///
    /// The pending context is consumed before anything else, so a state can
    /// never be replayed whatever the outcome. Nothing is persisted unless
    /// both the code exchange and the profile lookup succeed. The account is
    /// attached to the user who started the flow.
    pub async fn complete_authorization(
        &self,
        session_id: &str,
        platform: &str,
        state: &str,
        code: &str,
    ) -> Result<PlatformAccount, ConnectionError> {
        let platform = parse_platform(platform)?;

        let pending = self
            .states
            .validate_and_consume(session_id, platform, state)
            .ok_or_else(|| {
                warn!(platform = %platform, "Invalid or expired OAuth state");
                ConnectionError::InvalidOrExpiredState
            })?;

        let provider = self.provider(platform)?;

        let credentials = self
            .vendor
            .exchange_code(
                provider,
                code,
                &self.redirect_uri(platform),
                pending.code_verifier.as_deref(),
            )
            .await
            .map_err(|e| {
                error!(platform = %platform, error = %e, "Token exchange failed");
                match e {
                    VendorError::Unavailable(detail) => ConnectionError::VendorUnavailable(detail),
                    other => ConnectionError::TokenExchangeFailed(other.to_string()),
                }
            })?;

        let profile = self.fetch_profile(provider, &credentials.access_token).await?;

        let account = PlatformAccount::connected(
            &pending.user_id,
            platform,
            &profile.external_account_id,
            &profile.display_name,
            credentials,
        );
        let account = self.accounts.upsert(&account)?;

        info!(
            platform = %platform,
            user_id = %account.user_id,
            account_id = %account.id,
            has_refresh_token = account.refresh_token.is_some(),
            "Platform account connected"
        );

        Ok(account)
    }

    /// Consumes the pending context of a flow the vendor reported as denied.
    pub fn reject_authorization(
        &self,
        session_id: &str,
        platform: &str,
        state: Option<&str>,
        reason: &str,
    ) -> ConnectionError {
        if let (Ok(platform), Some(state)) = (parse_platform(platform), state) {
            self.states.validate_and_consume(session_id, platform, state);
        }
        warn!(platform = %platform, reason = %reason, "Authorization denied by platform");
        ConnectionError::AuthorizationDenied(reason.to_string())
    }

    /// Profile lookup with exactly one retry.
    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<VendorProfile, ConnectionError> {
        match self.vendor.fetch_profile(provider, access_token).await {
            Ok(profile) => Ok(profile),
            Err(first) => {
                warn!(
                    platform = %provider.platform,
                    error = %first,
                    "Profile fetch failed, retrying once"
                );
                self.vendor
                    .fetch_profile(provider, access_token)
                    .await
                    .map_err(|e| {
                        error!(platform = %provider.platform, error = %e, "Profile fetch failed");
                        ConnectionError::ProfileFetchFailed(e.to_string())
                    })
            }
        }
    }

    /// True iff the account is connected and its token has not expired.
    pub fn is_valid(&self, account: &PlatformAccount) -> bool {
        account.is_valid()
    }

    /// Refreshes the account's access token.
    ///
    /// A failed vendor call moves the account to `error` (tokens kept) and is
    /// also returned to the caller. Concurrent refreshes of one account are
    /// last-write-wins.
    pub async fn refresh(
        &self,
        account: &PlatformAccount,
    ) -> Result<PlatformAccount, ConnectionError> {
        if !supports_refresh(account.platform) {
            debug!(platform = %account.platform, "Platform has no refresh mechanism");
            return Err(ConnectionError::RefreshUnsupported(account.platform));
        }

        if matches!(
            account.status,
            AccountStatus::Revoked | AccountStatus::Disconnected | AccountStatus::Pending
        ) {
            return Err(ConnectionError::ReauthorizationRequired(account.status));
        }

        let Some(refresh_token) = account
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
        else {
            warn!(
                account_id = %account.id,
                platform = %account.platform,
                "No refresh token stored, leaving account unchanged"
            );
            return Ok(account.clone());
        };

        let provider = self.provider(account.platform)?;

        let mut updated = account.clone();
        match self.vendor.refresh_token(provider, refresh_token).await {
            Ok(credentials) => {
                updated.apply_refresh(credentials);
                self.save(&updated)?;

                info!(
                    account_id = %updated.id,
                    platform = %updated.platform,
                    "OAuth token refreshed successfully"
                );
                Ok(updated)
            }
            Err(e) => {
                error!(
                    account_id = %account.id,
                    platform = %account.platform,
                    error = %e,
                    "Token refresh failed"
                );
                updated.mark_error(format!("Token refresh failed: {}", e));
                self.save(&updated)?;

                Err(match e {
                    VendorError::Unavailable(detail) => ConnectionError::VendorUnavailable(detail),
                    other => ConnectionError::RefreshFailed(other.to_string()),
                })
            }
        }
    }

    /// Disconnects the account locally, revoking at the vendor on a
    /// best-effort basis. Idempotent.
    pub async fn disconnect(
        &self,
        account: &PlatformAccount,
    ) -> Result<PlatformAccount, ConnectionError> {
        if account.status == AccountStatus::Revoked {
            debug!(account_id = %account.id, "Account already revoked");
            return Ok(account.clone());
        }

        match self.providers.get(account.platform) {
            Some(provider) => {
                if let Err(e) = self.vendor.revoke(provider, &account.access_token).await {
                    self.revocation_observer.revocation_failed(account, &e);
                }
            }
            None => debug!(
                platform = %account.platform,
                "Provider not configured, skipping vendor revocation"
            ),
        }

        let mut updated = account.clone();
        updated.mark_revoked();
        self.save(&updated)?;

        info!(
            account_id = %updated.id,
            platform = %updated.platform,
            "Platform account disconnected"
        );

        Ok(updated)
    }

    fn save(&self, account: &PlatformAccount) -> Result<(), ConnectionError> {
        if self.accounts.save(account)? {
            Ok(())
        } else {
            Err(ConnectionError::AccountNotFound(account.id.clone()))
        }
    }

    /// Loads an account owned by `user_id`. Other users' ids read as missing.
    pub fn account_for(&self, user_id: &str, id: &str) -> Result<PlatformAccount, ConnectionError> {
        self.accounts
            .get_owned(user_id, id)?
            .ok_or_else(|| ConnectionError::AccountNotFound(id.to_string()))
    }

    pub fn list_accounts(&self, user_id: &str) -> Result<Vec<PlatformAccount>, ConnectionError> {
        Ok(self.accounts.list_by_user(user_id)?)
    }

    /// User-initiated deletion of an account row.
    pub fn delete_account(&self, user_id: &str, id: &str) -> Result<(), ConnectionError> {
        let account = self.account_for(user_id, id)?;
        self.accounts.delete(&account.id)?;

        info!(
            account_id = %account.id,
            platform = %account.platform,
            user_id = %user_id,
            "Platform account deleted"
        );
        Ok(())
    }
}
