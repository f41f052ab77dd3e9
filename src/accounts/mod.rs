//! Platform accounts and their encrypted storage.
//!
//! A [`PlatformAccount`] is one user's link to one external account on one
//! platform. Rows live in SQLite; access and refresh tokens are encrypted at
//! rest with AES-256-GCM.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       AccountStore                       │
//! │  - upsert by (user, platform, ext id)    │
//! │  - status updates, listing, deletion     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!      (seal)                (open)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher                        │
//! │  - AES-256-GCM, fresh nonce per token    │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite (platform_accounts)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use social_connect::accounts::{AccountStore, Credentials, PlatformAccount};
//! use social_connect::platform::Platform;
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("SOCIAL_CONNECT_ENCRYPTION_KEY")?;
//! let store = AccountStore::new("accounts.db", &encryption_key)?;
//!
//! let account = PlatformAccount::connected(
//!     "user1",
//!     Platform::Instagram,
//!     "17841400000000000",
//!     "acme_studio",
//!     Credentials {
//!         access_token: "IGQVJ...".to_string(),
//!         refresh_token: None,
//!         expires_at: None,
//!     },
//! );
//! let stored = store.upsert(&account)?;
//!
//! for account in store.list_by_user("user1")? {
//!     println!("{} {} valid={}", account.platform, account.display_name, account.is_valid());
//! }
//! # let _ = stored;
//! # Ok(())
//! # }
//! ```

use crate::platform::{AccountStatus, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::{SealedToken, TokenCipher};
pub use storage::AccountStore;

/// Token material returned by a vendor's token endpoint.
///
/// Tokens are opaque: they are only stored and forwarded, never parsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC); `None` means non-expiring
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when a refresh token is present and non-empty.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Stored record of one user's link to one external account.
///
/// Tokens are skipped on serialization so the record can be returned from
/// the HTTP API as-is.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlatformAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub external_account_id: String,
    pub display_name: String,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformAccount {
    /// Builds a freshly connected account with a new id.
    ///
    /// The id is replaced by the existing row's id when the store upserts
    /// onto an account that is already linked.
    pub fn connected(
        user_id: &str,
        platform: Platform,
        external_account_id: &str,
        display_name: &str,
        credentials: Credentials,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            platform,
            external_account_id: external_account_id.to_string(),
            display_name: display_name.to_string(),
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            token_expiry: credentials.expires_at,
            status: AccountStatus::Connected,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True iff the account is connected and its token has not expired.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// [`is_valid`](Self::is_valid) evaluated at an explicit instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AccountStatus::Connected
            && self.token_expiry.map_or(true, |expiry| expiry > now)
    }

    /// Current token material.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.token_expiry,
        }
    }

    /// Records a vendor failure. Tokens are left in place so a manual retry
    /// remains possible.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = AccountStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Applies refreshed credentials, keeping the old refresh token when the
    /// vendor did not rotate it.
    pub fn apply_refresh(&mut self, credentials: Credentials) {
        self.access_token = credentials.access_token;
        if credentials.refresh_token.is_some() {
            self.refresh_token = credentials.refresh_token;
        }
        self.token_expiry = credentials.expires_at;
        self.status = AccountStatus::Connected;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_revoked(&mut self) {
        self.status = AccountStatus::Revoked;
        self.error_message = None;
        self.updated_at = Utc::now();
    }
}
