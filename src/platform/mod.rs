//! Supported external platforms and account connection statuses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


/// External social/ad network reachable through OAuth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Facebook,
    Twitter,
    Linkedin,
    Tiktok,
    Youtube,
    Pinterest,
    Threads,
    GoogleAds,
}

impl Platform {
    /// Every supported platform, in display order.
    pub const ALL: [Platform; 9] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::Pinterest,
        Platform::Threads,
        Platform::GoogleAds,
    ];

    /// Wire name used in URLs, storage and environment variable prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::Pinterest => "pinterest",
            Platform::Threads => "threads",
            Platform::GoogleAds => "google_ads",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a platform name is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlatform(pub String);

impl fmt::Display for UnknownPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported platform '{}'", self.0)
    }
}

impl std::error::Error for UnknownPlatform {}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "x" is Twitter's current brand name
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "tiktok" => Ok(Platform::Tiktok),
            "youtube" => Ok(Platform::Youtube),
            "pinterest" => Ok(Platform::Pinterest),
            "threads" => Ok(Platform::Threads),
            "google_ads" | "google-ads" => Ok(Platform::GoogleAds),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

/// Connection status of a stored platform account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Authorization started but not completed
    Pending,
    /// Tokens exchanged and stored
    #[serde(alias = "active")]
    Connected,
    Disconnected,
    /// User disconnected the account; only re-authorization brings it back
    Revoked,
    /// Last vendor call failed; see the account's error message
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Connected => "connected",
            AccountStatus::Disconnected => "disconnected",
            AccountStatus::Revoked => "revoked",
            AccountStatus::Error => "error",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AccountStatus::Pending),
            "connected" | "active" => Ok(AccountStatus::Connected),
            "disconnected" => Ok(AccountStatus::Disconnected),
            "revoked" => Ok(AccountStatus::Revoked),
            "error" => Ok(AccountStatus::Error),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}
