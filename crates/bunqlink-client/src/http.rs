//! HTTP client for the bunq API
//!
//! Every call goes through [`BunqClient::request`], which:
//! - attaches the fixed bunq headers and a fresh request id
//! - signs the exact body bytes when asked to
//! - reads the response as raw text and verifies the server signature
//!   before anything is parsed
//! - turns `Error` envelopes and non-2xx statuses into [`BunqError::Api`]

use bunqlink_crypto::{sign_body, verify_body, PrivateKey, PublicKey};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::config::BunqConfig;
use crate::envelope::{error_items, ResponseEnvelope};
use crate::error::{BunqError, BunqResult};
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

// ============================================================================
// Wire Constants
// ============================================================================

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CACHE_CONTROL: &str = "Cache-Control";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_REQUEST_ID: &str = "X-Bunq-Client-Request-Id";
pub const HEADER_GEOLOCATION: &str = "X-Bunq-Geolocation";
pub const HEADER_LANGUAGE: &str = "X-Bunq-Language";
pub const HEADER_REGION: &str = "X-Bunq-Region";
pub const HEADER_AUTHENTICATION: &str = "X-Bunq-Client-Authentication";
pub const HEADER_CLIENT_SIGNATURE: &str = "X-Bunq-Client-Signature";
pub const HEADER_SERVER_SIGNATURE: &str = "X-Bunq-Server-Signature";

// ============================================================================
// Request Options
// ============================================================================

/// When to check `X-Bunq-Server-Signature`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verification {
    /// Verify whenever a server public key is supplied
    #[default]
    Auto,
    /// Verification is mandatory; a missing server key is a security failure
    Required,
    /// Never verify (installation, before the server key is known)
    Skip,
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Value of `X-Bunq-Client-Authentication` (installation or session token)
    pub auth_token: Option<String>,
    /// Whether the body must be signed
    pub sign: bool,
    /// Key used for `X-Bunq-Client-Signature`
    pub signing_key: Option<PrivateKey>,
    /// Key used to verify `X-Bunq-Server-Signature`
    pub server_public_key: Option<PublicKey>,
    pub verification: Verification,
    /// Overrides the configured base URL for this call
    pub base_url: Option<String>,
    pub cancel: Option<Cancellation>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sign the body with this key
    pub fn signed_with(mut self, key: PrivateKey) -> Self {
        self.sign = true;
        self.signing_key = Some(key);
        self
    }

    /// Mark the call as requiring a signature; the key must be supplied too
    pub fn require_signing(mut self) -> Self {
        self.sign = true;
        self
    }

    pub fn verify_with(mut self, key: PublicKey) -> Self {
        self.server_public_key = Some(key);
        self
    }

    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn cancellable(mut self, cancel: Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// bunq HTTP client
#[derive(Clone)]
pub struct BunqClient {
    config: Arc<BunqConfig>,
    transport: Arc<dyn Transport>,
}

impl BunqClient {
    /// Create a client with the reqwest transport
    pub fn new(config: BunqConfig) -> BunqResult<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client with a custom transport
    pub fn with_transport(config: BunqConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &BunqConfig {
        &self.config
    }

    /// Send a request and return the parsed success envelope
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> BunqResult<ResponseEnvelope> {
        let request = self.build_request(method, path, body, options)?;
        let request_id = request.header(HEADER_REQUEST_ID).unwrap_or_default().to_string();

        debug!(
            method = %method,
            path = %path,
            request_id = %request_id,
            signed = options.sign,
            "Sending bunq request"
        );

        let response = match &options.cancel {
            Some(cancel) => {
                if cancel.is_cancelled() {
                    return Err(BunqError::Cancelled);
                }
                tokio::select! {
                    result = self.transport.send(request) => result?,
                    _ = cancel.cancelled() => {
                        debug!(request_id = %request_id, "bunq request cancelled");
                        return Err(BunqError::Cancelled);
                    }
                }
            }
            None => self.transport.send(request).await?,
        };

        self.handle_response(method, path, response, options)
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> BunqResult<HttpRequest> {
        let base_url = options
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.config.base_url());
        let url = format!("{}/{}", base_url, path.trim_start_matches('/'));

        let body = match body {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| BunqError::Internal(format!("Request body serialization: {}", e)))?,
            None => String::new(),
        };

        let mut headers = vec![
            (HEADER_CONTENT_TYPE.to_string(), "application/json".to_string()),
            (HEADER_CACHE_CONTROL.to_string(), "no-cache".to_string()),
            (HEADER_USER_AGENT.to_string(), self.config.user_agent.clone()),
            (HEADER_REQUEST_ID.to_string(), Uuid::new_v4().to_string()),
            (HEADER_GEOLOCATION.to_string(), self.config.geolocation.clone()),
            (HEADER_LANGUAGE.to_string(), self.config.language.clone()),
            (HEADER_REGION.to_string(), self.config.region.clone()),
        ];

        if let Some(token) = &options.auth_token {
            headers.push((HEADER_AUTHENTICATION.to_string(), token.clone()));
        }

        if options.sign {
            let key = options.signing_key.as_ref().ok_or_else(|| {
                BunqError::Internal(format!(
                    "{} {} requires signing but no private key was supplied",
                    method, path
                ))
            })?;
            headers.push((HEADER_CLIENT_SIGNATURE.to_string(), sign_body(key, body.as_bytes())?));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    fn handle_response(
        &self,
        method: Method,
        path: &str,
        response: HttpResponse,
        options: &RequestOptions,
    ) -> BunqResult<ResponseEnvelope> {
        if !response.is_success() {
            let errors = serde_json::from_str::<Value>(&response.body)
                .ok()
                .and_then(|body| error_items(&body))
                .unwrap_or_default();
            return Err(log_api_error(method, path, BunqError::api(response.status, errors)));
        }

        // Exact bytes first; nothing is parsed from an unauthenticated body.
        match options.verification {
            Verification::Skip => {}
            Verification::Auto => {
                if let Some(key) = &options.server_public_key {
                    verify_response(key, &response)?;
                }
            }
            Verification::Required => {
                let key = options.server_public_key.as_ref().ok_or_else(|| {
                    BunqError::Security("Server public key not available for verification".to_string())
                })?;
                verify_response(key, &response)?;
            }
        }

        if response.body.trim().is_empty() {
            return Ok(ResponseEnvelope::default());
        }

        let body: Value = serde_json::from_str(&response.body)?;

        if let Some(errors) = error_items(&body) {
            return Err(log_api_error(method, path, BunqError::api(response.status, errors)));
        }

        ResponseEnvelope::from_value(&body)
    }
}

impl std::fmt::Debug for BunqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BunqClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Check the server signature over the exact response body
fn verify_response(key: &PublicKey, response: &HttpResponse) -> BunqResult<()> {
    let signature = response.header(HEADER_SERVER_SIGNATURE).ok_or_else(|| {
        error!(status = response.status, "bunq response carried no server signature");
        BunqError::missing_server_signature()
    })?;

    match verify_body(key, response.body.as_bytes(), signature) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => {
            error!(status = response.status, "bunq response signature did not verify");
            Err(BunqError::signature_verification_failed())
        }
    }
}

fn log_api_error(method: Method, path: &str, err: BunqError) -> BunqError {
    let status = err.status_code().unwrap_or_default();
    if status == 404 {
        debug!(method = %method, path = %path, status, error = %err, "bunq API returned not found");
    } else {
        warn!(method = %method, path = %path, status, error = %err, "bunq API error");
    }
    err
}
