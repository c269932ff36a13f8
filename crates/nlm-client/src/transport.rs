use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use nlm_wire::{decode_batch, encode_request, ProtocolError, RpcCall, RpcPayload};
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::auth::{
    extract_page_tokens, format_cookie_header, is_sign_in_redirect, merge_set_cookie_headers,
    missing_required_cookies,
};
use crate::download::{requires_session_cookies, MediaFetcher};
use crate::retry::{new_request_id, parse_retry_after_ms, RequestIdSequence};
use crate::{AuthTokens, ClientConfig, NlmError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Per-id outcome of one batched request.
pub type BatchResults = BTreeMap<String, Result<RpcPayload, NlmError>>;

#[async_trait]
/// Issues batched RPCs against the remote.
///
/// Implementors provide [`RpcTransport::execute`]; the single-call helpers
/// are layered on top of it. `execute` fails as a whole only when the
/// request itself does; faults of individual calls stay in the map.
pub trait RpcTransport: Send + Sync {
    async fn execute(&self, calls: &[RpcCall], allow_null: bool)
        -> Result<BatchResults, NlmError>;

    /// One call; a null result comes back as `Value::Null`.
    async fn call(&self, method_id: &str, params: Value) -> Result<Value, NlmError> {
        let calls = [RpcCall::new(method_id, params)];
        let mut results = self.execute(&calls, false).await?;
        take_payload(&mut results, method_id).map(RpcPayload::into_value)
    }

    /// One call where a null result is reported as [`RpcPayload::NoResult`].
    async fn call_allow_null(
        &self,
        method_id: &str,
        params: Value,
    ) -> Result<RpcPayload, NlmError> {
        let calls = [RpcCall::new(method_id, params)];
        let mut results = self.execute(&calls, true).await?;
        take_payload(&mut results, method_id)
    }

    /// Several calls in one request, keyed by method id.
    async fn call_batch(&self, calls: &[RpcCall]) -> Result<BatchResults, NlmError> {
        self.execute(calls, true).await
    }
}

fn take_payload(results: &mut BatchResults, method_id: &str) -> Result<RpcPayload, NlmError> {
    results.remove(method_id).unwrap_or_else(|| {
        Err(NlmError::Protocol(ProtocolError::ResultNotFound {
            method_id: method_id.to_string(),
        }))
    })
}

/// Decodes a buffered body into per-id results.
pub fn decode_batch_results(
    raw: &[u8],
    method_ids: &[&str],
    allow_null: bool,
) -> Result<BatchResults, NlmError> {
    Ok(decode_batch(raw, method_ids, allow_null)?
        .into_iter()
        .map(|(method_id, outcome)| (method_id, outcome.map_err(NlmError::from)))
        .collect())
}

struct TokenState {
    tokens: Arc<AuthTokens>,
    generation: u64,
}

/// [`RpcTransport`] over HTTPS with one silent session refresh per call.
pub struct HttpRpcTransport {
    client: reqwest::Client,
    config: ClientConfig,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
    request_ids: RequestIdSequence,
}

impl HttpRpcTransport {
    pub fn new(config: ClientConfig, tokens: AuthTokens) -> Result<Self, NlmError> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, config, tokens))
    }

    /// Builds the bundle from cookies alone by probing the home page once.
    pub async fn connect(
        config: ClientConfig,
        cookies: BTreeMap<String, String>,
    ) -> Result<Self, NlmError> {
        let missing = missing_required_cookies(&cookies);
        if !missing.is_empty() {
            return Err(NlmError::Auth(format!(
                "missing required cookies: {}",
                missing.join(", ")
            )));
        }
        let client = build_client(&config)?;
        let (cookies, page) = fetch_home_page(&client, &config, &cookies).await?;
        let tokens = AuthTokens::new(cookies, page.csrf_token, page.session_id)?;
        Ok(Self::with_client(client, config, tokens))
    }

    fn with_client(client: reqwest::Client, config: ClientConfig, tokens: AuthTokens) -> Self {
        Self {
            client,
            config,
            state: RwLock::new(TokenState {
                tokens: Arc::new(tokens),
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
            request_ids: RequestIdSequence::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn tokens(&self) -> Arc<AuthTokens> {
        Arc::clone(&self.state.read().await.tokens)
    }

    /// Number of completed refreshes.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Forces a refresh unless another caller completes one first.
    pub async fn refresh_tokens(&self) -> Result<Arc<AuthTokens>, NlmError> {
        let seen = self.generation().await;
        self.refresh_after(seen).await
    }

    async fn snapshot(&self) -> (Arc<AuthTokens>, u64) {
        let state = self.state.read().await;
        (Arc::clone(&state.tokens), state.generation)
    }

    async fn refresh_after(&self, seen_generation: u64) -> Result<Arc<AuthTokens>, NlmError> {
        let _refresh_guard = self.refresh_lock.lock().await;
        let current = {
            let state = self.state.read().await;
            if state.generation != seen_generation {
                tracing::debug!(
                    generation = state.generation,
                    "reusing session refreshed by a concurrent caller"
                );
                return Ok(Arc::clone(&state.tokens));
            }
            Arc::clone(&state.tokens)
        };

        let (cookies, page) = fetch_home_page(&self.client, &self.config, current.cookies()).await?;
        let refreshed = Arc::new(current.refreshed(cookies, page)?);
        let mut state = self.state.write().await;
        state.tokens = Arc::clone(&refreshed);
        state.generation = state.generation.saturating_add(1);
        tracing::debug!(generation = state.generation, "session tokens refreshed");
        Ok(refreshed)
    }

    fn is_auth_failure(&self, error: &NlmError) -> bool {
        match error {
            NlmError::Auth(_) => true,
            NlmError::Transport {
                status: Some(status),
                ..
            } => self.config.is_auth_failure_status(*status),
            NlmError::Rpc { code, .. } => self.config.is_auth_failure_fault(*code),
            _ => false,
        }
    }

    /// Folds a batch whose any call was rejected for auth reasons into that
    /// error, so the whole request takes the refresh path.
    fn reject_on_auth_fault(&self, results: BatchResults) -> Result<BatchResults, NlmError> {
        let rejected = results
            .values()
            .find_map(|outcome| outcome.as_ref().err().filter(|error| self.is_auth_failure(error)))
            .cloned();
        match rejected {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }

    async fn send_once(
        &self,
        calls: &[RpcCall],
        tokens: &AuthTokens,
        allow_null: bool,
        attempt: usize,
    ) -> Result<BatchResults, NlmError> {
        let encoded = encode_request(calls, tokens.csrf_token(), tokens.session_id())?;
        let query = encoded.query_pairs(
            &self.config.source_path,
            &self.config.language,
            self.request_ids.next_id(),
        );
        let request_id = new_request_id();
        tracing::debug!(
            method_ids = %encoded.rpc_ids,
            request_id = %request_id,
            attempt,
            "sending batchexecute request"
        );

        let response = self
            .client
            .post(self.config.rpc_url())
            .query(&query)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(COOKIE, tokens.cookie_header())
            .header("x-same-domain", "1")
            .header("x-nlm-request-id", request_id.as_str())
            .header("x-nlm-retry-attempt", attempt.to_string())
            .body(encoded.body)
            .send()
            .await
            .map_err(|error| {
                tracing::warn!(
                    method_ids = %encoded.rpc_ids,
                    timeout = error.is_timeout(),
                    connect = error.is_connect(),
                    error = %error,
                    "batchexecute request failed"
                );
                NlmError::from(error)
            })?;

        if is_sign_in_redirect(response.url()) {
            return Err(NlmError::Auth(
                "request was redirected to the sign-in page".to_string(),
            ));
        }

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                method_ids = %encoded.rpc_ids,
                status = status.as_u16(),
                "batchexecute returned an error status"
            );
            return Err(NlmError::Transport {
                message: format!(
                    "batchexecute returned HTTP {status}: {}",
                    truncate_chars(&body, MAX_ERROR_BODY_CHARS)
                ),
                status: Some(status.as_u16()),
                retry_after_ms,
            });
        }

        let raw = response.bytes().await?;
        let method_ids: Vec<&str> = calls.iter().map(|call| call.method_id.as_str()).collect();
        let results = decode_batch_results(&raw, &method_ids, allow_null)?;
        self.reject_on_auth_fault(results)
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn execute(
        &self,
        calls: &[RpcCall],
        allow_null: bool,
    ) -> Result<BatchResults, NlmError> {
        let (tokens, generation) = self.snapshot().await;
        let error = match self.send_once(calls, &tokens, allow_null, 0).await {
            Err(error) if self.is_auth_failure(&error) => error,
            other => return other,
        };

        tracing::warn!(generation, error = %error, "session rejected; refreshing once");
        let tokens = self.refresh_after(generation).await?;
        match self.send_once(calls, &tokens, allow_null, 1).await {
            Err(retry_error) if self.is_auth_failure(&retry_error) => Err(NlmError::Auth(format!(
                "session still rejected after refresh: {retry_error}"
            ))),
            other => other,
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpRpcTransport {
    /// Downloads over the session's HTTP client. Cookies are attached only
    /// for Google user-content hosts.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, NlmError> {
        let mut request = self.client.get(url);
        if requires_session_cookies(url) {
            let tokens = self.tokens().await;
            request = request.header(COOKIE, tokens.cookie_header());
        }
        let response = request.send().await?;
        if is_sign_in_redirect(response.url()) {
            return Err(NlmError::Auth(
                "media download was redirected to the sign-in page".to_string(),
            ));
        }

        let status = response.status();
        if self.config.is_auth_failure_status(status.as_u16()) {
            return Err(NlmError::Auth(format!("media download rejected the session ({status})")));
        }
        if !status.is_success() {
            return Err(NlmError::Transport {
                message: format!("media download returned HTTP {status}"),
                status: Some(status.as_u16()),
                retry_after_ms: parse_retry_after_ms(response.headers()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn build_client(config: &ClientConfig) -> Result<reqwest::Client, NlmError> {
    config
        .validate()
        .map_err(|error| NlmError::Config(format!("{error:#}")))?;
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .build()
        .map_err(|error| NlmError::Config(format!("failed to build HTTP client: {error}")))
}

/// Loads the home page with `cookies`, returning the merged cookie jar and
/// the scraped page tokens.
async fn fetch_home_page(
    client: &reqwest::Client,
    config: &ClientConfig,
    cookies: &BTreeMap<String, String>,
) -> Result<(BTreeMap<String, String>, crate::auth::PageTokens), NlmError> {
    let response = client
        .get(config.home_url())
        .header(COOKIE, format_cookie_header(cookies))
        .send()
        .await?;
    if is_sign_in_redirect(response.url()) {
        return Err(NlmError::Auth(
            "session expired: home page redirected to sign-in".to_string(),
        ));
    }

    let status = response.status();
    if config.is_auth_failure_status(status.as_u16()) {
        return Err(NlmError::Auth(format!("home page rejected the session ({status})")));
    }
    if !status.is_success() {
        return Err(NlmError::Transport {
            message: format!("home page returned HTTP {status}"),
            status: Some(status.as_u16()),
            retry_after_ms: parse_retry_after_ms(response.headers()),
        });
    }

    let mut merged = cookies.clone();
    merge_set_cookie_headers(
        &mut merged,
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    );
    let html = response.text().await?;
    let page = extract_page_tokens(&html)?;
    Ok((merged, page))
}

fn truncate_chars(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((index, _)) => &raw[..index],
        None => raw,
    }
}
