//! Cookie extraction from a browser `storage_state.json` export.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::clock::{current_unix_timestamp, is_expired_unix};

const ALLOWED_COOKIE_DOMAINS: &[&str] = &[
    ".google.com",
    "notebooklm.google.com",
    ".notebooklm.google.com",
    ".googleusercontent.com",
];

#[derive(Debug, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
}

#[derive(Debug, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: String,
    /// Seconds since the epoch; `-1` marks a session cookie.
    #[serde(default)]
    expires: Option<f64>,
}

impl StoredCookie {
    fn expires_unix(&self) -> Option<u64> {
        self.expires
            .filter(|expires| expires.is_finite() && *expires > 0.0)
            .map(|expires| expires as u64)
    }
}

/// Parses storage-state JSON into a cookie map for the remote's domains.
///
/// Expired cookies are dropped. When a name appears under several domains,
/// the `.google.com` value wins.
pub fn parse_storage_state_cookies(raw: &str, now_unix: u64) -> Result<BTreeMap<String, String>> {
    let state: StorageState =
        serde_json::from_str(raw).context("failed to parse storage state JSON")?;
    let mut cookies = BTreeMap::new();
    let mut from_primary_domain = BTreeMap::new();
    for cookie in state.cookies {
        if !ALLOWED_COOKIE_DOMAINS.contains(&cookie.domain.as_str()) {
            continue;
        }
        if is_expired_unix(cookie.expires_unix(), now_unix) {
            tracing::debug!(cookie = %cookie.name, "skipping expired cookie");
            continue;
        }
        let primary = cookie.domain == ".google.com";
        if from_primary_domain.get(&cookie.name).copied().unwrap_or(false) && !primary {
            continue;
        }
        from_primary_domain.insert(cookie.name.clone(), primary);
        cookies.insert(cookie.name, cookie.value);
    }
    Ok(cookies)
}

pub fn load_storage_state_cookies(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read storage state {}", path.display()))?;
    parse_storage_state_cookies(&raw, current_unix_timestamp())
        .with_context(|| format!("invalid storage state {}", path.display()))
}
