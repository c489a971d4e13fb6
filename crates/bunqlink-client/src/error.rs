//! Error types for the bunq client
//!
//! Errors are designed to be:
//! - Presentable verbatim to the user (the top-level message is meaningful)
//! - Classifiable, so the orchestrator can decide whether a refresh helps
//! - Never silently downgraded when they concern response authenticity

use bunqlink_crypto::CryptoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bunq client operations
pub type BunqResult<T> = Result<T, BunqError>;

/// One entry of bunq's `Error` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub error_description_translated: String,
}

/// bunq client error types
#[derive(Debug, Error)]
pub enum BunqError {
    // =========================================================================
    // Setup Errors
    // =========================================================================
    /// Required configuration is missing (e.g. the API key)
    #[error("{0}")]
    Configuration(String),

    /// A well-formed response lacked a field the handshake needs
    #[error("{0}")]
    Protocol(String),

    // =========================================================================
    // Security Errors
    // =========================================================================
    /// Response signature missing or invalid; never retried
    #[error("{0}")]
    Security(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Non-2xx status or `Error` envelope from bunq
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// First error description, or a generic status line
        message: String,
        /// Raw error entries as returned by the server
        errors: Vec<ErrorItem>,
    },

    /// Network failure or unparseable response body
    #[error("{0}")]
    Transport(String),

    /// The caller cancelled the operation
    #[error("Request cancelled")]
    Cancelled,

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Key handling or signing failed
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// The credential store failed
    #[error("Credential store error: {0}")]
    Storage(String),

    /// Misuse of the client (e.g. signing requested without a key)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BunqError {
    pub fn api_key_missing() -> Self {
        Self::Configuration("API key not configured".to_string())
    }

    pub fn no_installation_token() -> Self {
        Self::Protocol("No installation token received".to_string())
    }

    pub fn no_device_id() -> Self {
        Self::Protocol("No device ID received".to_string())
    }

    pub fn invalid_session_response() -> Self {
        Self::Protocol("Invalid session response".to_string())
    }

    pub fn missing_server_signature() -> Self {
        Self::Security("Missing server signature".to_string())
    }

    pub fn signature_verification_failed() -> Self {
        Self::Security("Response signature verification failed".to_string())
    }

    pub fn invalid_server_key() -> Self {
        Self::Security("Stored server public key is invalid".to_string())
    }

    /// Build an API error from the server's error entries
    pub fn api(status: u16, errors: Vec<ErrorItem>) -> Self {
        let message = errors
            .first()
            .map(|e| e.error_description.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        Self::Api {
            status,
            message,
            errors,
        }
    }

    /// HTTP status code, when the error came from the server
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for authentication-class failures (expired or revoked session)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }

    /// Whether opening a new session could make the same call succeed
    pub fn is_retryable_by_refresh(&self) -> bool {
        self.is_auth_error()
    }

    /// True for errors that must never be retried or swallowed
    pub fn is_security_error(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// True when the remote answered 404 (often "not available for this account")
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Translated descriptions, for hosts that show localized messages
    pub fn translated_messages(&self) -> Vec<&str> {
        match self {
            Self::Api { errors, .. } => errors
                .iter()
                .map(|e| e.error_description_translated.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<reqwest::Error> for BunqError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for BunqError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("Invalid JSON response: {}", err))
    }
}
