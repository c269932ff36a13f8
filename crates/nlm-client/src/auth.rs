//! Session credentials and the home-page scrape that refreshes them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::NlmError;

/// Cookies without which the remote never accepts a call.
pub const REQUIRED_COOKIE_NAMES: &[&str] = &["SID"];

const CSRF_PAGE_KEY: &str = "SNlM0e";
const SESSION_PAGE_KEY: &str = "FdrFJe";
const SIGN_IN_HOST: &str = "accounts.google.com";

static PAGE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(SNlM0e|FdrFJe)"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("invalid page field pattern")
});

#[derive(Clone, PartialEq, Eq)]
/// Immutable credential bundle: cookies, forgery token and session id.
pub struct AuthTokens {
    cookies: BTreeMap<String, String>,
    csrf_token: String,
    session_id: String,
}

impl AuthTokens {
    /// Fails closed when a required cookie is missing or blank.
    pub fn new(
        cookies: BTreeMap<String, String>,
        csrf_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, NlmError> {
        let missing = missing_required_cookies(&cookies);
        if !missing.is_empty() {
            return Err(NlmError::Auth(format!(
                "missing required cookies: {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            cookies,
            csrf_token: csrf_token.into(),
            session_id: session_id.into(),
        })
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cookie_header(&self) -> String {
        format_cookie_header(&self.cookies)
    }

    /// A new bundle with refreshed cookies and page tokens.
    pub fn refreshed(
        &self,
        cookies: BTreeMap<String, String>,
        page: PageTokens,
    ) -> Result<Self, NlmError> {
        Self::new(cookies, page.csrf_token, page.session_id)
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("cookie_names", &self.cookies.keys().collect::<Vec<_>>())
            .field("csrf_token", &"[REDACTED]")
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// `name=value; name=value` in name order.
pub fn format_cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn missing_required_cookies(cookies: &BTreeMap<String, String>) -> Vec<&'static str> {
    REQUIRED_COOKIE_NAMES
        .iter()
        .copied()
        .filter(|name| {
            cookies
                .get(*name)
                .map(|value| value.trim().is_empty())
                .unwrap_or(true)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTokens {
    pub csrf_token: String,
    pub session_id: String,
}

/// Scrapes the forgery token and session id from the home page HTML.
pub fn extract_page_tokens(html: &str) -> Result<PageTokens, NlmError> {
    let mut csrf_token = None;
    let mut session_id = None;
    for captures in PAGE_FIELD.captures_iter(html) {
        let value = unescape_json_string(&captures[2])?;
        match &captures[1] {
            CSRF_PAGE_KEY if csrf_token.is_none() => csrf_token = Some(value),
            SESSION_PAGE_KEY if session_id.is_none() => session_id = Some(value),
            _ => {}
        }
    }

    let csrf_token = csrf_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| NlmError::Auth("home page did not expose a CSRF token".to_string()))?;
    let session_id = session_id.unwrap_or_else(|| {
        tracing::warn!("home page did not expose a session id; continuing without f.sid");
        String::new()
    });
    Ok(PageTokens {
        csrf_token,
        session_id,
    })
}

/// Page values are JSON string literals; `\u003d` and friends must be
/// decoded before the token is echoed back.
fn unescape_json_string(escaped: &str) -> Result<String, NlmError> {
    serde_json::from_str::<String>(&format!("\"{escaped}\""))
        .map_err(|error| NlmError::Auth(format!("home page token is not a JSON string: {error}")))
}

/// Folds `Set-Cookie` header values into `cookies`.
///
/// Deleted cookies (`Max-Age=0` or an empty value) are removed.
pub fn merge_set_cookie_headers<'a>(
    cookies: &mut BTreeMap<String, String>,
    headers: impl IntoIterator<Item = &'a str>,
) {
    for header in headers {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"');
        let expired = parts.any(|attribute| {
            attribute
                .trim()
                .eq_ignore_ascii_case("max-age=0")
        });
        if expired || value.is_empty() {
            cookies.remove(name);
        } else {
            cookies.insert(name.to_string(), value.to_string());
        }
    }
}

/// True when the session was bounced to the Google sign-in flow.
pub fn is_sign_in_redirect(url: &url::Url) -> bool {
    url.host_str() == Some(SIGN_IN_HOST)
}
