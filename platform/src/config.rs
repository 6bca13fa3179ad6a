use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "https://cloud.coiled.io";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub server: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub account: Option<String>,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Delay between build status checks
    pub poll_interval: Duration,
    /// Upper bound on waiting for a build to finish
    pub build_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            token: None,
            account: None,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            build_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PlatformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_build_timeout(mut self, build_timeout: Duration) -> Self {
        self.build_timeout = build_timeout;
        self
    }

    /// Server URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server.trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.is_empty() {
            return Err("Server URL cannot be empty".to_string());
        }

        if !self.server.starts_with("http://") && !self.server.starts_with("https://") {
            return Err("Server URL must start with http:// or https://".to_string());
        }

        if let Some(token) = &self.token {
            if token.trim().is_empty() {
                return Err("API token cannot be blank".to_string());
            }
        }

        if let Some(account) = &self.account {
            if account.trim().is_empty() {
                return Err("Account cannot be blank".to_string());
            }
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("Poll interval must be greater than 0".to_string());
        }

        if self.build_timeout < self.poll_interval {
            return Err("Build timeout must be at least one poll interval".to_string());
        }

        Ok(())
    }
}
