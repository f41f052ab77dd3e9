//! OAuth provider configurations.
//!
//! Defines the OAuth 2.0 endpoints and vendor quirks of each supported
//! platform, plus the client credentials loaded from configuration.

use crate::platform::Platform;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// PKCE verifier length (RFC 7636 allows 43..=128)
const PKCE_VERIFIER_LEN: usize = 64;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// How a vendor expects its revocation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevokeMethod {
    /// POST form with `token` (and client credentials where required)
    PostForm,
    /// DELETE with the access token as bearer (Graph API permissions)
    DeleteWithBearer,
}

/// How the client authenticates to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id`/`client_secret` in the form body
    Form,
    /// HTTP Basic with the client credentials
    Basic,
}

/// Vendor-dictated endpoint table entry.
struct Endpoints {
    auth_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    revoke_url: Option<&'static str>,
    revoke_method: RevokeMethod,
    scopes: &'static [&'static str],
    supports_refresh: bool,
    requires_pkce: bool,
    client_auth: ClientAuth,
}

fn endpoints(platform: Platform) -> Endpoints {
    match platform {
        Platform::Instagram => Endpoints {
            auth_url: "https://api.instagram.com/oauth/authorize",
            token_url: "https://api.instagram.com/oauth/access_token",
            profile_url: "https://graph.instagram.com/me?fields=id,username",
            revoke_url: None,
            revoke_method: RevokeMethod::PostForm,
            scopes: &["instagram_business_basic", "instagram_business_content_publish"],
            supports_refresh: false,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::Facebook => Endpoints {
            auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            profile_url: "https://graph.facebook.com/v19.0/me?fields=id,name",
            revoke_url: Some("https://graph.facebook.com/v19.0/me/permissions"),
            revoke_method: RevokeMethod::DeleteWithBearer,
            scopes: &["pages_show_list", "pages_manage_posts", "pages_read_engagement"],
            supports_refresh: false,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::Twitter => Endpoints {
            auth_url: "https://twitter.com/i/oauth2/authorize",
            token_url: "https://api.twitter.com/2/oauth2/token",
            profile_url: "https://api.twitter.com/2/users/me",
            revoke_url: Some("https://api.twitter.com/2/oauth2/revoke"),
            revoke_method: RevokeMethod::PostForm,
            scopes: &["tweet.read", "tweet.write", "users.read", "offline.access"],
            supports_refresh: true,
            requires_pkce: true,
            client_auth: ClientAuth::Basic,
        },
        Platform::Linkedin => Endpoints {
            auth_url: "https://www.linkedin.com/oauth/v2/authorization",
            token_url: "https://www.linkedin.com/oauth/v2/accessToken",
            profile_url: "https://api.linkedin.com/v2/userinfo",
            revoke_url: Some("https://www.linkedin.com/oauth/v2/revoke"),
            revoke_method: RevokeMethod::PostForm,
            scopes: &["openid", "profile", "w_member_social"],
            supports_refresh: true,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::Tiktok => Endpoints {
            auth_url: "https://www.tiktok.com/v2/auth/authorize/",
            token_url: "https://open.tiktokapis.com/v2/oauth/token/",
            profile_url: "https://open.tiktokapis.com/v2/user/info/?fields=open_id,display_name",
            revoke_url: Some("https://open.tiktokapis.com/v2/oauth/revoke/"),
            revoke_method: RevokeMethod::PostForm,
            scopes: &["user.info.basic", "video.publish"],
            supports_refresh: true,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::Youtube => Endpoints {
            auth_url: GOOGLE_AUTH_URL,
            token_url: GOOGLE_TOKEN_URL,
            profile_url: "https://www.googleapis.com/youtube/v3/channels?part=snippet&mine=true",
            revoke_url: Some(GOOGLE_REVOKE_URL),
            revoke_method: RevokeMethod::PostForm,
            scopes: &[
                "https://www.googleapis.com/auth/youtube.upload",
                "https://www.googleapis.com/auth/youtube.readonly",
            ],
            supports_refresh: true,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::Pinterest => Endpoints {
            auth_url: "https://www.pinterest.com/oauth/",
            token_url: "https://api.pinterest.com/v5/oauth/token",
            profile_url: "https://api.pinterest.com/v5/user_account",
            revoke_url: None,
            revoke_method: RevokeMethod::PostForm,
            scopes: &["boards:read", "pins:read", "pins:write", "user_accounts:read"],
            supports_refresh: true,
            requires_pkce: false,
            client_auth: ClientAuth::Basic,
        },
        Platform::Threads => Endpoints {
            auth_url: "https://threads.net/oauth/authorize",
            token_url: "https://graph.threads.net/oauth/access_token",
            profile_url: "https://graph.threads.net/v1.0/me?fields=id,username",
            revoke_url: None,
            revoke_method: RevokeMethod::PostForm,
            scopes: &["threads_basic", "threads_content_publish"],
            supports_refresh: false,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
        Platform::GoogleAds => Endpoints {
            auth_url: GOOGLE_AUTH_URL,
            token_url: GOOGLE_TOKEN_URL,
            profile_url: "https://openidconnect.googleapis.com/v1/userinfo",
            revoke_url: Some(GOOGLE_REVOKE_URL),
            revoke_method: RevokeMethod::PostForm,
            scopes: &["https://www.googleapis.com/auth/adwords", "openid", "email"],
            supports_refresh: true,
            requires_pkce: false,
            client_auth: ClientAuth::Form,
        },
    }
}

/// Whether the platform's credential model has a refresh mechanism at all.
pub fn supports_refresh(platform: Platform) -> bool {
    endpoints(platform).supports_refresh
}

/// OAuth provider configuration
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub platform: Platform,

    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange (and refresh) endpoint URL
    pub token_url: String,

    /// Endpoint returning the authorized account's identity
    pub profile_url: String,

    /// Revocation endpoint, if the vendor has one
    pub revoke_url: Option<String>,

    pub revoke_method: RevokeMethod,

    /// Required OAuth scopes
    pub scopes: Vec<String>,

    pub client_id: String,

    pub client_secret: String,

    pub supports_refresh: bool,

    pub requires_pkce: bool,

    pub client_auth: ClientAuth,
}

impl ProviderConfig {
    /// Provider config with the vendor's production endpoints.
    pub fn new(platform: Platform, client_id: &str, client_secret: &str) -> Self {
        let endpoints = endpoints(platform);
        Self {
            platform,
            auth_url: endpoints.auth_url.to_string(),
            token_url: endpoints.token_url.to_string(),
            profile_url: endpoints.profile_url.to_string(),
            revoke_url: endpoints.revoke_url.map(str::to_string),
            revoke_method: endpoints.revoke_method,
            scopes: endpoints.scopes.iter().map(|s| s.to_string()).collect(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            supports_refresh: endpoints.supports_refresh,
            requires_pkce: endpoints.requires_pkce,
            client_auth: endpoints.client_auth,
        }
    }

    /// Form field carrying the client id (TikTok calls it `client_key`).
    pub fn client_id_param(&self) -> &'static str {
        match self.platform {
            Platform::Tiktok => "client_key",
            _ => "client_id",
        }
    }

    fn scope_separator(&self) -> &'static str {
        match self.platform {
            Platform::Facebook | Platform::Instagram | Platform::Threads | Platform::Tiktok
            | Platform::Pinterest => ",",
            _ => " ",
        }
    }

    /// Build authorization URL with state, redirect_uri and optional PKCE challenge
    pub fn build_auth_url(
        &self,
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> String {
        let scopes = self.scopes.join(self.scope_separator());
        let mut url = format!(
            "{}?{}={}&redirect_uri={}&scope={}&state={}&response_type=code",
            self.auth_url,
            self.client_id_param(),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        );

        // Google only issues refresh tokens for offline access with forced consent
        if matches!(self.platform, Platform::Youtube | Platform::GoogleAds) {
            url.push_str("&access_type=offline&prompt=consent");
        }

        if let Some(challenge) = code_challenge {
            url.push_str("&code_challenge=");
            url.push_str(&urlencoding::encode(challenge));
            url.push_str("&code_challenge_method=S256");
        }

        url
    }
}

/// Generates a PKCE `(code_verifier, code_challenge)` pair using S256.
pub fn pkce_pair() -> (String, String) {
    let verifier: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PKCE_VERIFIER_LEN)
        .map(char::from)
        .collect();
    let challenge = pkce_challenge(&verifier);
    (verifier, challenge)
}

/// S256 code challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Configured providers, keyed by platform.
///
/// A platform without client credentials is simply absent.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, config: ProviderConfig) {
        self.providers.insert(config.platform, config);
    }

    pub fn with(mut self, config: ProviderConfig) -> Self {
        self.insert(config);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&ProviderConfig> {
        self.providers.get(&platform)
    }

    pub fn is_configured(&self, platform: Platform) -> bool {
        self.providers.contains_key(&platform)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
