//! Session orchestration
//!
//! Decides, per call, whether stored credentials can be reused, whether only
//! the session needs refreshing, or whether the full three-step handshake
//! has to run:
//!
//! ```text
//! Uninitialized ──install──▶ Installed ──register──▶ DeviceRegistered ──session──▶ SessionActive
//!       ▲                                                                               │
//!       └──── API key rotated / logout ◀──── (stale) ──── refresh ──────────────────────┘
//! ```
//!
//! Setup and refresh are serialised behind one async mutex. A caller whose
//! session token was rejected only refreshes if the stored token is still the
//! one it used; overlapping 401s therefore share a single refresh.

use bunqlink_crypto::{
    api_key_fingerprint, KeyProvisioner, PrivateKey, PublicKey, RsaKeyProvisioner,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cancel::Cancellation;
use crate::config::BunqConfig;
use crate::credentials::{CredentialVault, InstallationRecord, SessionRecord, SessionState};
use crate::device::DeviceRegistrar;
use crate::envelope::ResponseEnvelope;
use crate::error::{BunqError, BunqResult};
use crate::http::{BunqClient, RequestOptions};
use crate::installation::InstallationManager;
use crate::session::{Session, SessionManager};
use crate::store::CredentialStore;
use crate::transport::Method;

/// Owns the credential lifecycle and exposes the business request interface
pub struct SessionOrchestrator {
    client: BunqClient,
    installation: InstallationManager,
    devices: DeviceRegistrar,
    sessions: SessionManager,
    vault: CredentialVault,
    provisioner: Arc<dyn KeyProvisioner>,
    handshake: Mutex<()>,
}

impl SessionOrchestrator {
    /// Create an orchestrator that generates RSA keys with the OS RNG
    pub fn new(client: BunqClient, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_provisioner(client, store, Arc::new(RsaKeyProvisioner::new()))
    }

    /// Create an orchestrator with a custom key provisioner
    pub fn with_provisioner(
        client: BunqClient,
        store: Arc<dyn CredentialStore>,
        provisioner: Arc<dyn KeyProvisioner>,
    ) -> Self {
        let vault = CredentialVault::new(store, client.config().environment);
        Self {
            installation: InstallationManager::new(client.clone()),
            devices: DeviceRegistrar::new(client.clone()),
            sessions: SessionManager::new(client.clone()),
            client,
            vault,
            provisioner,
            handshake: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BunqConfig {
        self.client.config()
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// Current handshake state, as far as the store knows
    pub async fn state(&self) -> BunqResult<SessionState> {
        let record = self.vault.load().await?;
        Ok(SessionState::of(record.as_ref()))
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    /// Run install → device registration → session from scratch
    ///
    /// This is the only path that creates a keypair.
    pub async fn perform_full_setup(&self) -> BunqResult<InstallationRecord> {
        let _guard = self.handshake.lock().await;
        self.full_setup(None).await
    }

    /// [`perform_full_setup`](Self::perform_full_setup) that stops when
    /// `cancel` fires; nothing is persisted in that case
    pub async fn perform_full_setup_with(&self, cancel: Cancellation) -> BunqResult<InstallationRecord> {
        let _guard = self.handshake.lock().await;
        self.full_setup(Some(&cancel)).await
    }

    /// Open a new session on the existing installation, or fall back to a
    /// full setup when the installation token or private key is missing
    pub async fn refresh_session(&self) -> BunqResult<InstallationRecord> {
        let _guard = self.handshake.lock().await;
        self.refresh(None).await
    }

    /// [`refresh_session`](Self::refresh_session) with cancellation
    pub async fn refresh_session_with(&self, cancel: Cancellation) -> BunqResult<InstallationRecord> {
        let _guard = self.handshake.lock().await;
        self.refresh(Some(&cancel)).await
    }

    /// Return a record with a usable session, creating one if needed
    pub async fn ensure_session(&self) -> BunqResult<InstallationRecord> {
        let api_key = self.api_key()?;
        if let Some(record) = self.vault.load().await? {
            if record.session.is_some() && !self.key_rotated(&record, api_key) {
                return Ok(record);
            }
        }

        let _guard = self.handshake.lock().await;
        // Another caller may have finished while we waited.
        if let Some(record) = self.vault.load().await? {
            if record.session.is_some() && !self.key_rotated(&record, api_key) {
                return Ok(record);
            }
        }
        self.refresh(None).await
    }

    /// Forget every stored credential, deleting the remote session first
    /// when possible
    pub async fn logout(&self) -> BunqResult<()> {
        let _guard = self.handshake.lock().await;

        if let Some(record) = self.vault.load().await? {
            if let Some(session) = &record.session {
                if let Some(session_id) = session.session_id {
                    match PrivateKey::from_pem(&record.key_pair.private_key) {
                        Ok(key) => {
                            let options = self
                                .verifying_options(&record, RequestOptions::new())
                                .unwrap_or_default();
                            if let Err(err) = self
                                .sessions
                                .delete_session(&session.token, &key, session_id, options)
                                .await
                            {
                                warn!(error = %err, "Could not delete remote session, clearing local credentials anyway");
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "Stored private key unreadable, skipping remote logout");
                        }
                    }
                }
            }
        }

        self.vault.clear().await?;
        info!(environment = %self.config().environment, "Credentials cleared");
        Ok(())
    }

    fn api_key(&self) -> BunqResult<&str> {
        self.client
            .config()
            .api_key()
            .ok_or_else(BunqError::api_key_missing)
    }

    fn key_rotated(&self, record: &InstallationRecord, api_key: &str) -> bool {
        record
            .api_key_fingerprint
            .as_deref()
            .map(|stored| stored != api_key_fingerprint(api_key))
            .unwrap_or(false)
    }

    /// Clear everything if the stored fingerprint belongs to another API key
    ///
    /// Assumed policy: a rotated key invalidates the installation, device and
    /// session together, and the orchestrator starts over from Uninitialized.
    async fn discard_if_rotated(&self, api_key: &str) -> BunqResult<()> {
        if let Some(stored) = self.vault.api_key_fingerprint().await? {
            if stored != api_key_fingerprint(api_key) {
                warn!("Configured API key differs from the one used at setup; discarding stored credentials");
                self.vault.clear().await?;
            }
        }
        Ok(())
    }

    async fn full_setup(&self, cancel: Option<&Cancellation>) -> BunqResult<InstallationRecord> {
        let api_key = self.api_key()?;
        let base = base_options(cancel);

        info!(environment = %self.config().environment, "Running full bunq setup");

        let key_pair = self.provisioner.generate_key_pair().await?;
        let key_pem = key_pair.to_pem()?;

        // The server key is stored as received and only takes effect for
        // business calls once persisted.
        let installation = self
            .installation
            .create_installation_with(&key_pem.public_key, base.clone())
            .await?;

        let device_id = self
            .devices
            .register_device_with(
                &installation.token,
                api_key,
                key_pair.private_key(),
                base.clone(),
            )
            .await?;

        let session = self
            .sessions
            .create_session_with(&installation.token, api_key, key_pair.private_key(), base)
            .await?;

        ensure_not_cancelled(cancel)?;

        let record = InstallationRecord {
            key_pair: key_pem,
            installation_token: installation.token,
            server_public_key: installation.server_public_key,
            device_id: Some(device_id),
            api_key_fingerprint: Some(api_key_fingerprint(api_key)),
            session: Some(session_record(&session)),
        };
        self.vault.save_installation(&record).await?;

        info!(device_id, user_id = session.user_id, "bunq setup complete");
        Ok(record)
    }

    async fn refresh(&self, cancel: Option<&Cancellation>) -> BunqResult<InstallationRecord> {
        let api_key = self.api_key()?;
        self.discard_if_rotated(api_key).await?;

        let mut record = match self.vault.load().await? {
            Some(record) => record,
            None => {
                debug!("No installation stored, falling back to full setup");
                return self.full_setup(cancel).await;
            }
        };

        let private_key = PrivateKey::from_pem(&record.key_pair.private_key)?;

        let session = self
            .sessions
            .create_session_with(
                &record.installation_token,
                api_key,
                &private_key,
                base_options(cancel),
            )
            .await?;

        ensure_not_cancelled(cancel)?;

        let session = session_record(&session);
        self.vault.save_session(&session).await?;
        record.session = Some(session);

        if record.api_key_fingerprint.is_none() {
            let fingerprint = api_key_fingerprint(api_key);
            self.vault.save_api_key_fingerprint(&fingerprint).await?;
            record.api_key_fingerprint = Some(fingerprint);
        }

        info!("bunq session refreshed");
        Ok(record)
    }

    /// Refresh unless someone already replaced `stale_token`
    async fn refresh_if_stale(&self, stale_token: &str) -> BunqResult<InstallationRecord> {
        let _guard = self.handshake.lock().await;

        if let Some(record) = self.vault.load().await? {
            let current = record.session.as_ref().map(|s| s.token.as_str());
            if current.is_some() && current != Some(stale_token) {
                debug!("Session already refreshed by a concurrent caller");
                return Ok(record);
            }
        }

        self.refresh(None).await
    }

    /// Attach the persisted server key, if any, for response verification
    fn verifying_options(
        &self,
        record: &InstallationRecord,
        base: RequestOptions,
    ) -> BunqResult<RequestOptions> {
        if record.server_public_key.is_empty() {
            return Ok(base);
        }
        let key = PublicKey::from_pem(&record.server_public_key).map_err(|err| {
            error!(error = %err, "Stored server public key cannot be parsed");
            BunqError::invalid_server_key()
        })?;
        Ok(base.verify_with(key))
    }

    // =========================================================================
    // Business Requests
    // =========================================================================

    /// Send an authenticated, signed and verified request
    ///
    /// An authentication failure triggers one session refresh and one retry;
    /// a second failure is returned unchanged.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> BunqResult<ResponseEnvelope> {
        self.request_with(method, path, body, RequestOptions::new())
            .await
    }

    /// [`request`](Self::request) with caller options (cancellation,
    /// verification mode, base URL); authentication and signing are filled in
    pub async fn request_with(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> BunqResult<ResponseEnvelope> {
        let mut record = self.ensure_session().await?;
        let mut refreshed = false;

        loop {
            let token = record
                .session
                .as_ref()
                .map(|s| s.token.clone())
                .ok_or_else(|| BunqError::Internal("No session after setup".to_string()))?;

            let private_key = PrivateKey::from_pem(&record.key_pair.private_key)?;
            let call_options = self
                .verifying_options(&record, options.clone())?
                .authenticated(token.clone())
                .signed_with(private_key);

            match self.client.request(method, path, body, &call_options).await {
                Err(err) if err.is_retryable_by_refresh() && !refreshed => {
                    info!(method = %method, path = %path, "Session rejected, refreshing once");
                    refreshed = true;
                    record = self.refresh_if_stale(&token).await?;
                }
                result => return result,
            }
        }
    }

    pub async fn get(&self, path: &str) -> BunqResult<ResponseEnvelope> {
        self.request(Method::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> BunqResult<ResponseEnvelope> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> BunqResult<ResponseEnvelope> {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> BunqResult<ResponseEnvelope> {
        self.request(Method::Delete, path, None).await
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("client", &self.client)
            .field("vault", &self.vault)
            .finish_non_exhaustive()
    }
}

fn base_options(cancel: Option<&Cancellation>) -> RequestOptions {
    match cancel {
        Some(cancel) => RequestOptions::new().cancellable(cancel.clone()),
        None => RequestOptions::new(),
    }
}

fn ensure_not_cancelled(cancel: Option<&Cancellation>) -> BunqResult<()> {
    match cancel {
        Some(cancel) if cancel.is_cancelled() => Err(BunqError::Cancelled),
        _ => Ok(()),
    }
}

fn session_record(session: &Session) -> SessionRecord {
    SessionRecord {
        token: session.token.clone(),
        user_id: session.user_id,
        session_id: session.session_id,
    }
}
