//! OAuth 2.0 plumbing for platform connections.
//!
//! Implements the pieces of the authorization code flow:
//! 1. User clicks "Connect" in the UI
//! 2. A state token is recorded for the user's session ([`StateManager`])
//! 3. User authorizes on the platform's site ([`ProviderConfig::build_auth_url`])
//! 4. Platform redirects back with `code` + `state`
//! 5. Code is exchanged for tokens and the profile is fetched ([`VendorClient`])

mod client;
mod profile;
mod provider;
mod state_store;

pub use client::{HttpVendorClient, VendorClient, DEFAULT_TIMEOUT_SECONDS};
pub use profile::{parse_profile, VendorProfile};
pub use provider::{
    pkce_challenge, pkce_pair, supports_refresh, ClientAuth, ProviderConfig, ProviderRegistry,
    RevokeMethod,
};
pub use state_store::{
    run_state_cleanup, MemoryStateStore, PendingAuthorization, StateKey, StateManager, StateStore,
};
