//! Client configuration
//!
//! Read-only to the handshake: the environment selects one of two fixed base
//! URLs, and the API key is the single long-lived secret everything else is
//! derived from.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL of the bunq sandbox
pub const SANDBOX_BASE_URL: &str = "https://public-api.sandbox.bunq.com/v1";

/// Base URL of bunq production
pub const PRODUCTION_BASE_URL: &str = "https://api.bunq.com/v1";

/// bunq environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    /// Fixed API base URL for this environment
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::Sandbox
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("Unknown bunq environment: {}", other)),
        }
    }
}

/// Main client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BunqConfig {
    /// Sandbox or production
    pub environment: Environment,
    /// API key secret (empty means "not configured")
    #[serde(default)]
    pub api_key: String,
    /// Label shown in the bunq app's device list
    pub device_description: String,
    /// Value of `X-Bunq-Language`
    pub language: String,
    /// Value of `X-Bunq-Region`
    pub region: String,
    /// Value of `X-Bunq-Geolocation`
    pub geolocation: String,
    /// Value of `User-Agent`
    pub user_agent: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Overrides the environment's base URL (local mocks, proxies)
    #[serde(default)]
    pub base_url_override: Option<String>,
}

impl Default for BunqConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            api_key: String::new(), // Must be set before setup
            device_description: "bunqlink".to_string(),
            language: "en_US".to_string(),
            region: "nl_NL".to_string(),
            geolocation: "0 0 0 0 000".to_string(),
            user_agent: format!("bunqlink/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            base_url_override: None,
        }
    }
}

impl std::fmt::Debug for BunqConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunqConfig")
            .field("environment", &self.environment)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("device_description", &self.device_description)
            .field("language", &self.language)
            .field("region", &self.region)
            .field("geolocation", &self.geolocation)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("base_url_override", &self.base_url_override)
            .finish()
    }
}

impl BunqConfig {
    /// Create a sandbox configuration for an API key
    pub fn sandbox(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Create a production configuration for an API key
    pub fn production(api_key: impl Into<String>) -> Self {
        Self {
            environment: Environment::Production,
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Point the client at a different host (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Effective base URL, without trailing slash
    pub fn base_url(&self) -> String {
        self.base_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// The configured API key, if any
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(environment) = std::env::var("BUNQ_ENVIRONMENT") {
            config.environment = environment.parse()?;
        }
        if let Ok(api_key) = std::env::var("BUNQ_API_KEY") {
            config.api_key = api_key;
        }
        if let Ok(description) = std::env::var("BUNQ_DEVICE_DESCRIPTION") {
            config.device_description = description;
        }
        if let Ok(base_url) = std::env::var("BUNQ_BASE_URL") {
            config.base_url_override = Some(base_url);
        }
        if let Ok(timeout) = std::env::var("BUNQ_TIMEOUT") {
            config.timeout = humantime::parse_duration(&timeout)
                .map_err(|e| format!("Invalid BUNQ_TIMEOUT: {}", e))?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.api_key().is_none() {
            errors.push("API key not configured".to_string());
        }
        if self.device_description.trim().is_empty() {
            errors.push("Device description must not be empty".to_string());
        }
        if self.timeout.is_zero() {
            errors.push("Request timeout must be greater than zero".to_string());
        }
        if let Some(url) = &self.base_url_override {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("Base URL must be http(s): {}", url));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
