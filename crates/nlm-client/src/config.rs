//! Client configuration.
//!
//! Every knob has a default matching the production web endpoint, so an
//! empty TOML document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::PollSchedule;

pub const DEFAULT_BASE_URL: &str = "https://notebooklm.google.com";
pub const DEFAULT_RPC_PATH: &str = "/_/LabsTailwindUi/data/batchexecute";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: String,
    pub rpc_path: String,
    pub language: String,
    /// `source-path` query value, `/` or `/notebook/<id>`.
    pub source_path: String,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    /// HTTP statuses that mean the session was rejected.
    pub auth_failure_http_statuses: Vec<u16>,
    /// Remote fault codes that mean the session was rejected (16 is the
    /// gRPC `UNAUTHENTICATED` code the endpoint reports).
    pub auth_failure_fault_codes: Vec<i64>,
    pub poll: PollPolicyConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            language: "en".to_string(),
            source_path: "/".to_string(),
            request_timeout_ms: 30_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            auth_failure_http_statuses: vec![401, 403],
            auth_failure_fault_codes: vec![16, 401],
            poll: PollPolicyConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse client config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read client config {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid client config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("base_url must be an http(s) URL, got '{}'", self.base_url);
        }
        if !self.rpc_path.starts_with('/') {
            bail!("rpc_path must start with '/'");
        }
        if !self.source_path.starts_with('/') {
            bail!("source_path must start with '/'");
        }
        if self.language.trim().is_empty() {
            bail!("language must not be empty");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than 0");
        }
        self.poll.validate()
    }

    pub fn rpc_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.rpc_path)
    }

    pub fn home_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn is_auth_failure_status(&self, status: u16) -> bool {
        self.auth_failure_http_statuses.contains(&status)
    }

    pub fn is_auth_failure_fault(&self, code: Option<i64>) -> bool {
        code.is_some_and(|code| self.auth_failure_fault_codes.contains(&code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Backoff and tolerance settings for task polling.
pub struct PollPolicyConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub deadline_ms: u64,
    pub max_consecutive_transport_errors: u32,
}

impl Default for PollPolicyConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 2_000,
            max_interval_ms: 10_000,
            backoff_factor: 1.5,
            jitter: true,
            deadline_ms: 300_000,
            max_consecutive_transport_errors: 3,
        }
    }
}

impl PollPolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval_ms == 0 {
            bail!("poll.initial_interval_ms must be greater than 0");
        }
        if self.max_interval_ms < self.initial_interval_ms {
            bail!("poll.max_interval_ms must be >= poll.initial_interval_ms");
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            bail!("poll.backoff_factor must be finite and >= 1.0");
        }
        if self.deadline_ms == 0 {
            bail!("poll.deadline_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::exponential(
            Duration::from_millis(self.initial_interval_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_interval_ms),
            self.jitter,
        )
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ClientConfig, PollPolicyConfig, DEFAULT_BASE_URL};

    #[test]
    fn empty_document_yields_defaults() {
        let config = ClientConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            config.rpc_url(),
            "https://notebooklm.google.com/_/LabsTailwindUi/data/batchexecute"
        );
        assert_eq!(config.home_url(), "https://notebooklm.google.com/");
    }

    #[test]
    fn overrides_merge_with_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
base_url = "http://127.0.0.1:9000/"
request_timeout_ms = 500

[poll]
initial_interval_ms = 100
max_interval_ms = 400
jitter = false
"#,
        )
        .expect("config");
        assert_eq!(config.rpc_url(), "http://127.0.0.1:9000/_/LabsTailwindUi/data/batchexecute");
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
        assert_eq!(config.poll.max_consecutive_transport_errors, 3);
        assert_eq!(
            config.poll.schedule().intervals(),
            &[
                Duration::from_millis(100),
                Duration::from_millis(150),
                Duration::from_millis(225),
                Duration::from_millis(337),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = ClientConfig::from_toml_str("base_ur1 = \"https://x\"").expect_err("typo");
        assert!(format!("{error:#}").contains("base_ur1"));
    }

    #[test]
    fn regression_zero_timeout_is_rejected() {
        let error = ClientConfig::from_toml_str("request_timeout_ms = 0").expect_err("zero");
        assert!(error.to_string().contains("request_timeout_ms"));
    }

    #[test]
    fn poll_policy_validation_bounds() {
        let mut policy = PollPolicyConfig {
            backoff_factor: 0.5,
            ..PollPolicyConfig::default()
        };
        assert!(policy.validate().is_err());
        policy.backoff_factor = 2.0;
        policy.max_interval_ms = 1;
        assert!(policy.validate().is_err());
        policy.max_interval_ms = 10_000;
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn auth_failure_classes_are_configurable() {
        let config = ClientConfig {
            auth_failure_http_statuses: vec![401],
            auth_failure_fault_codes: vec![16],
            ..ClientConfig::default()
        };
        assert!(config.is_auth_failure_status(401));
        assert!(!config.is_auth_failure_status(403));
        assert!(config.is_auth_failure_fault(Some(16)));
        assert!(!config.is_auth_failure_fault(Some(403)));
        assert!(!config.is_auth_failure_fault(None));
    }

    #[test]
    fn load_reads_from_disk() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nlm.toml");
        std::fs::write(&path, "language = \"de\"\n").expect("write");
        let config = ClientConfig::load(&path).expect("load");
        assert_eq!(config.language, "de");
        assert!(ClientConfig::load(&tempdir.path().join("missing.toml")).is_err());
    }
}
