//! Installation - first handshake step
//!
//! Exchanges the client public key for an installation token and the
//! server's public key. The call is neither signed nor authenticated: it is
//! the public-key exchange itself.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{BunqError, BunqResult};
use crate::http::{BunqClient, RequestOptions, Verification};
use crate::transport::Method;

const INSTALLATION_PATH: &str = "installation";

/// Result of a completed installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    /// Installation token, used to authenticate device and session calls
    pub token: String,
    /// Server public key (PEM); empty when the environment omitted it
    pub server_public_key: String,
}

#[derive(Deserialize)]
struct TokenItem {
    token: String,
}

#[derive(Deserialize)]
struct ServerPublicKeyItem {
    server_public_key: String,
}

/// Performs the installation step
#[derive(Debug, Clone)]
pub struct InstallationManager {
    client: BunqClient,
}

impl InstallationManager {
    pub fn new(client: BunqClient) -> Self {
        Self { client }
    }

    /// Register a client public key (PEM) with bunq
    pub async fn create_installation(&self, client_public_key: &str) -> BunqResult<Installation> {
        self.create_installation_with(client_public_key, RequestOptions::new())
            .await
    }

    /// Same as [`create_installation`](Self::create_installation), with
    /// caller options (cancellation, base URL)
    pub async fn create_installation_with(
        &self,
        client_public_key: &str,
        options: RequestOptions,
    ) -> BunqResult<Installation> {
        let body = json!({ "client_public_key": client_public_key });
        let options = options.verification(Verification::Skip);

        let envelope = self
            .client
            .request(Method::Post, INSTALLATION_PATH, Some(&body), &options)
            .await?;

        let token = envelope
            .find_as::<TokenItem>("Token")
            .map(|t| t.token)
            .ok_or_else(BunqError::no_installation_token)?;

        let server_public_key = match envelope.find_as::<ServerPublicKeyItem>("ServerPublicKey") {
            Some(item) => item.server_public_key,
            None => {
                warn!("Installation response carried no server public key");
                String::new()
            }
        };

        info!("Installation created");

        Ok(Installation {
            token,
            server_public_key,
        })
    }
}
