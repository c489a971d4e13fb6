//! Persisted credential record
//!
//! Installation-level fields and session-level fields live in two nested
//! structures so a refresh can replace the session without touching the
//! installation. On disk every field is its own key, namespaced per
//! environment: `bunq.<environment>.<field>`.

use bunqlink_crypto::KeyPairPem;
use std::sync::Arc;

use crate::config::Environment;
use crate::error::BunqResult;
use crate::store::CredentialStore;

/// Every persisted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    RsaPublicKey,
    RsaPrivateKey,
    InstallationToken,
    ServerPublicKey,
    DeviceId,
    SessionToken,
    UserId,
    SessionId,
    ApiKeyFingerprint,
}

impl CredentialField {
    /// All fields, in write order
    pub const ALL: [CredentialField; 9] = [
        Self::RsaPublicKey,
        Self::RsaPrivateKey,
        Self::InstallationToken,
        Self::ServerPublicKey,
        Self::DeviceId,
        Self::SessionToken,
        Self::UserId,
        Self::SessionId,
        Self::ApiKeyFingerprint,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RsaPublicKey => "rsaPublicKey",
            Self::RsaPrivateKey => "rsaPrivateKey",
            Self::InstallationToken => "installationToken",
            Self::ServerPublicKey => "serverPublicKey",
            Self::DeviceId => "deviceId",
            Self::SessionToken => "sessionToken",
            Self::UserId => "userId",
            Self::SessionId => "sessionId",
            Self::ApiKeyFingerprint => "apiKeyFingerprint",
        }
    }

    /// Store key for this field in an environment
    pub fn storage_key(&self, environment: Environment) -> String {
        format!("bunq.{}.{}", environment.as_str(), self.name())
    }
}

/// Session-level credentials; replaced on every refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: u64,
    pub session_id: Option<u64>,
}

/// Installation-level credentials, owning the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    pub key_pair: KeyPairPem,
    pub installation_token: String,
    /// Empty when the installation response omitted it
    pub server_public_key: String,
    pub device_id: Option<u64>,
    pub api_key_fingerprint: Option<String>,
    pub session: Option<SessionRecord>,
}

/// Handshake progress derived from what is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Installed,
    DeviceRegistered,
    SessionActive,
}

impl SessionState {
    pub fn of(record: Option<&InstallationRecord>) -> Self {
        match record {
            None => Self::Uninitialized,
            Some(r) if r.session.is_some() => Self::SessionActive,
            Some(r) if r.device_id.is_some() => Self::DeviceRegistered,
            Some(_) => Self::Installed,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Installed => "installed",
            Self::DeviceRegistered => "device registered",
            Self::SessionActive => "session active",
        };
        f.write_str(name)
    }
}

/// Typed access to the credential fields of one environment
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    environment: Environment,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn CredentialStore>, environment: Environment) -> Self {
        Self { store, environment }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    fn key(&self, field: CredentialField) -> String {
        field.storage_key(self.environment)
    }

    async fn get(&self, field: CredentialField) -> BunqResult<Option<String>> {
        Ok(self
            .store
            .get_item(&self.key(field))
            .await?
            .filter(|value| !value.is_empty()))
    }

    /// Load the record
    ///
    /// Returns `None` unless both the installation token and the private key
    /// are stored: without them no session can be opened or refreshed.
    pub async fn load(&self) -> BunqResult<Option<InstallationRecord>> {
        let installation_token = self.get(CredentialField::InstallationToken).await?;
        let private_key = self.get(CredentialField::RsaPrivateKey).await?;

        let (installation_token, private_key) = match (installation_token, private_key) {
            (Some(token), Some(key)) => (token, key),
            _ => return Ok(None),
        };

        let session = match (
            self.get(CredentialField::SessionToken).await?,
            self.get(CredentialField::UserId).await?.and_then(|id| id.parse().ok()),
        ) {
            (Some(token), Some(user_id)) => Some(SessionRecord {
                token,
                user_id,
                session_id: self
                    .get(CredentialField::SessionId)
                    .await?
                    .and_then(|id| id.parse().ok()),
            }),
            _ => None,
        };

        Ok(Some(InstallationRecord {
            key_pair: KeyPairPem {
                public_key: self.get(CredentialField::RsaPublicKey).await?.unwrap_or_default(),
                private_key,
            },
            installation_token,
            server_public_key: self.get(CredentialField::ServerPublicKey).await?.unwrap_or_default(),
            device_id: self
                .get(CredentialField::DeviceId)
                .await?
                .and_then(|id| id.parse().ok()),
            api_key_fingerprint: self.get(CredentialField::ApiKeyFingerprint).await?,
            session,
        }))
    }

    /// Stored API key fingerprint, independent of record completeness
    pub async fn api_key_fingerprint(&self) -> BunqResult<Option<String>> {
        self.get(CredentialField::ApiKeyFingerprint).await
    }

    /// Persist a whole record in one write
    ///
    /// Fields are written in handshake order: keypair, installation token,
    /// server key, device id, session token, user id.
    pub async fn save_installation(&self, record: &InstallationRecord) -> BunqResult<()> {
        let mut present = vec![
            (self.key(CredentialField::RsaPublicKey), record.key_pair.public_key.clone()),
            (self.key(CredentialField::RsaPrivateKey), record.key_pair.private_key.clone()),
            (self.key(CredentialField::InstallationToken), record.installation_token.clone()),
            (self.key(CredentialField::ServerPublicKey), record.server_public_key.clone()),
        ];
        let mut absent = Vec::new();

        match record.device_id {
            Some(id) => present.push((self.key(CredentialField::DeviceId), id.to_string())),
            None => absent.push(self.key(CredentialField::DeviceId)),
        }
        match &record.session {
            Some(session) => present.extend(self.session_entries(session, &mut absent)),
            None => absent.extend([
                self.key(CredentialField::SessionToken),
                self.key(CredentialField::UserId),
                self.key(CredentialField::SessionId),
            ]),
        }
        match &record.api_key_fingerprint {
            Some(fp) => present.push((self.key(CredentialField::ApiKeyFingerprint), fp.clone())),
            None => absent.push(self.key(CredentialField::ApiKeyFingerprint)),
        }

        if !absent.is_empty() {
            self.store.remove_items(&absent).await?;
        }
        self.store.set_items(&present).await
    }

    /// Replace only the session fields
    pub async fn save_session(&self, session: &SessionRecord) -> BunqResult<()> {
        let mut absent = Vec::new();
        let present = self.session_entries(session, &mut absent);

        self.store.set_items(&present).await?;
        if !absent.is_empty() {
            self.store.remove_items(&absent).await?;
        }
        Ok(())
    }

    /// Record which API key the stored installation belongs to
    pub async fn save_api_key_fingerprint(&self, fingerprint: &str) -> BunqResult<()> {
        self.store
            .set_item(&self.key(CredentialField::ApiKeyFingerprint), fingerprint)
            .await
    }

    fn session_entries(&self, session: &SessionRecord, absent: &mut Vec<String>) -> Vec<(String, String)> {
        let mut entries = vec![
            (self.key(CredentialField::SessionToken), session.token.clone()),
            (self.key(CredentialField::UserId), session.user_id.to_string()),
        ];
        match session.session_id {
            Some(id) => entries.push((self.key(CredentialField::SessionId), id.to_string())),
            None => absent.push(self.key(CredentialField::SessionId)),
        }
        entries
    }

    /// Remove every field of this environment
    pub async fn clear(&self) -> BunqResult<()> {
        let keys: Vec<String> = CredentialField::ALL.iter().map(|f| self.key(*f)).collect();
        self.store.remove_items(&keys).await
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
