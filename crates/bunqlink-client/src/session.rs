//! Session Management - third handshake step
//!
//! Opens a user-bound session with the installation token and API key. The
//! same call refreshes an expired session: it never touches the keypair or
//! the installation.
//!
//! The session response names the authenticated identity through exactly one
//! of three tagged variants (`UserPerson`, `UserCompany`, `UserApiKey`).

use bunqlink_crypto::PrivateKey;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::envelope::ResponseEnvelope;
use crate::error::{BunqError, BunqResult};
use crate::http::{BunqClient, RequestOptions};
use crate::transport::Method;

const SESSION_SERVER_PATH: &str = "session-server";

/// Id and display name shared by every user variant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSummary {
    pub id: u64,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The identity a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentity {
    Person(UserSummary),
    Company(UserSummary),
    ApiKey(UserSummary),
}

impl UserIdentity {
    /// Tag names, in the order they are looked up
    pub const VARIANTS: [&'static str; 3] = ["UserPerson", "UserCompany", "UserApiKey"];

    /// Pick whichever user variant the envelope carries
    pub fn from_envelope(envelope: &ResponseEnvelope) -> Option<Self> {
        Self::VARIANTS.iter().find_map(|tag| {
            let summary = envelope.find(tag).and_then(Self::summary)?;
            Some(match *tag {
                "UserPerson" => Self::Person(summary),
                "UserCompany" => Self::Company(summary),
                _ => Self::ApiKey(summary),
            })
        })
    }

    fn summary(value: &Value) -> Option<UserSummary> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn user_id(&self) -> u64 {
        self.summary_ref().id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.summary_ref().display_name.as_deref()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Person(_) => "UserPerson",
            Self::Company(_) => "UserCompany",
            Self::ApiKey(_) => "UserApiKey",
        }
    }

    fn summary_ref(&self) -> &UserSummary {
        match self {
            Self::Person(s) | Self::Company(s) | Self::ApiKey(s) => s,
        }
    }
}

/// An opened session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: u64,
    pub identity: UserIdentity,
    /// Id of the session item, needed to delete it on logout
    pub session_id: Option<u64>,
}

#[derive(Deserialize)]
struct TokenItem {
    token: String,
}

#[derive(Deserialize)]
struct IdItem {
    id: u64,
}

/// Opens, refreshes and deletes sessions
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: BunqClient,
}

impl SessionManager {
    pub fn new(client: BunqClient) -> Self {
        Self { client }
    }

    /// Create a session for the API key
    pub async fn create_session(
        &self,
        installation_token: &str,
        api_key: &str,
        private_key: &PrivateKey,
    ) -> BunqResult<Session> {
        self.create_session_with(installation_token, api_key, private_key, RequestOptions::new())
            .await
    }

    /// Same as [`create_session`](Self::create_session), with caller options
    pub async fn create_session_with(
        &self,
        installation_token: &str,
        api_key: &str,
        private_key: &PrivateKey,
        options: RequestOptions,
    ) -> BunqResult<Session> {
        let body = json!({ "secret": api_key });
        let options = options
            .authenticated(installation_token)
            .signed_with(private_key.clone());

        let envelope = self
            .client
            .request(Method::Post, SESSION_SERVER_PATH, Some(&body), &options)
            .await?;

        let session = Self::parse_session(&envelope)?;

        info!(
            user_id = session.user_id,
            user_type = session.identity.type_name(),
            "Session created"
        );

        Ok(session)
    }

    /// Token plus a resolved identity, or the whole response is invalid
    fn parse_session(envelope: &ResponseEnvelope) -> BunqResult<Session> {
        let token = envelope.find_as::<TokenItem>("Token").map(|t| t.token);
        let identity = UserIdentity::from_envelope(envelope);

        match (token, identity) {
            (Some(token), Some(identity)) => Ok(Session {
                token,
                user_id: identity.user_id(),
                identity,
                session_id: envelope.find_as::<IdItem>("Id").map(|item| item.id),
            }),
            _ => Err(BunqError::invalid_session_response()),
        }
    }

    /// Delete a session on the server (logout)
    pub async fn delete_session(
        &self,
        session_token: &str,
        private_key: &PrivateKey,
        session_id: u64,
        options: RequestOptions,
    ) -> BunqResult<()> {
        let options = options
            .authenticated(session_token)
            .signed_with(private_key.clone());
        let path = format!("session/{}", session_id);

        self.client.request(Method::Delete, &path, None, &options).await?;

        debug!(session_id, "Session deleted");
        Ok(())
    }
}
