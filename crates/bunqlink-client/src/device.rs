//! Device registration - second handshake step
//!
//! Binds the API key to the keypair that performed the installation. The call
//! is signed with the client private key and authenticated with the
//! installation token, which proves both are held by the same caller.

use bunqlink_crypto::PrivateKey;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{BunqError, BunqResult};
use crate::http::{BunqClient, RequestOptions};
use crate::transport::Method;

const DEVICE_SERVER_PATH: &str = "device-server";

/// IP allow-list sent with the registration; `*` permits any address
pub const PERMITTED_IPS_WILDCARD: &str = "*";

#[derive(Deserialize)]
struct IdItem {
    id: u64,
}

/// Performs the device registration step
#[derive(Debug, Clone)]
pub struct DeviceRegistrar {
    client: BunqClient,
}

impl DeviceRegistrar {
    pub fn new(client: BunqClient) -> Self {
        Self { client }
    }

    /// Register this client as a device and return the device id
    pub async fn register_device(
        &self,
        installation_token: &str,
        api_key: &str,
        private_key: &PrivateKey,
    ) -> BunqResult<u64> {
        self.register_device_with(installation_token, api_key, private_key, RequestOptions::new())
            .await
    }

    /// Same as [`register_device`](Self::register_device), with caller options
    pub async fn register_device_with(
        &self,
        installation_token: &str,
        api_key: &str,
        private_key: &PrivateKey,
        options: RequestOptions,
    ) -> BunqResult<u64> {
        let body = json!({
            "description": self.client.config().device_description,
            "secret": api_key,
            "permitted_ips": [PERMITTED_IPS_WILDCARD],
        });
        let options = options
            .authenticated(installation_token)
            .signed_with(private_key.clone());

        let envelope = self
            .client
            .request(Method::Post, DEVICE_SERVER_PATH, Some(&body), &options)
            .await?;

        let device_id = envelope
            .find_as::<IdItem>("Id")
            .map(|item| item.id)
            .ok_or_else(BunqError::no_device_id)?;

        info!(device_id, "Device registered");

        Ok(device_id)
    }
}
