//! Normalization of vendor profile payloads.
//!
//! Each platform returns the authorized account's identity in its own shape;
//! everything is reduced to an external account id plus a display name.

use crate::platform::Platform;
use serde_json::Value;

/// Minimal identity of an authorized external account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorProfile {
    pub external_account_id: String,
    pub display_name: String,
}

fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Numeric ids (Pinterest, some Graph API versions) arrive as JSON numbers.
fn id(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts the identity from a platform's profile response.
///
/// Returns `None` when no usable external id is present; callers must never
/// substitute a placeholder.
pub fn parse_profile(platform: Platform, body: &Value) -> Option<VendorProfile> {
    let (external_account_id, display_name) = match platform {
        Platform::Instagram | Platform::Threads => {
            let id = id(body, "/id")?;
            let name = text(body, "/username");
            (id, name)
        }
        Platform::Facebook => {
            let id = id(body, "/id")?;
            (id, text(body, "/name"))
        }
        Platform::Twitter => {
            let id = id(body, "/data/id")?;
            (id, text(body, "/data/username").or_else(|| text(body, "/data/name")))
        }
        Platform::Linkedin | Platform::GoogleAds => {
            let id = id(body, "/sub")?;
            (id, text(body, "/name").or_else(|| text(body, "/email")))
        }
        Platform::Tiktok => {
            let id = id(body, "/data/user/open_id")?;
            (id, text(body, "/data/user/display_name"))
        }
        Platform::Youtube => {
            let id = id(body, "/items/0/id")?;
            (id, text(body, "/items/0/snippet/title"))
        }
        Platform::Pinterest => {
            let username = text(body, "/username");
            let id = id(body, "/id").or_else(|| username.map(str::to_string))?;
            (id, username)
        }
    };

    Some(VendorProfile {
        display_name: display_name
            .map(str::to_string)
            .unwrap_or_else(|| external_account_id.clone()),
        external_account_id,
    })
}
