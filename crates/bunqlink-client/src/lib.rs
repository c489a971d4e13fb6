//! bunqlink Client - trust establishment and request signing for the bunq API
//!
//! Turns a single long-lived API key into a mutually authenticated,
//! per-request-signed session and keeps it alive across restarts.
//!
//! - **Installation**: client public key in, installation token and server
//!   public key out
//! - **Device registration**: binds the API key to the keypair
//! - **Session**: short-lived token bound to a user identity
//! - **Signing / verification**: RSA-SHA256 over exact body bytes, both ways
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionOrchestrator                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  cold start:  Installation → DeviceRegistrar → SessionManager│
//! │  warm start:                                   SessionManager│
//! │                              │                               │
//! │                              ▼                               │
//! │                          BunqClient                          │
//! │          (headers, signing, verification, envelope)          │
//! │                              │                               │
//! │                              ▼                               │
//! │                          Transport                           │
//! └─────────────────────────────────────────────────────────────┘
//!           credentials ⇄ CredentialVault ⇄ CredentialStore
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use bunqlink_client::{BunqClient, BunqConfig, FileStore, SessionOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BunqClient::new(BunqConfig::sandbox("sandbox_api_key"))?;
//!     let store = Arc::new(FileStore::new("credentials.json"));
//!     let bunq = SessionOrchestrator::new(client, store);
//!
//!     // Runs the handshake on first use, reuses the session afterwards
//!     let users = bunq.get("user").await?;
//!     println!("{:?}", users.items);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod credentials;
pub mod device;
pub mod envelope;
pub mod error;
pub mod http;
pub mod installation;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod transport;

pub use cancel::Cancellation;
pub use config::{BunqConfig, Environment};
pub use credentials::{CredentialField, CredentialVault, InstallationRecord, SessionRecord, SessionState};
pub use device::DeviceRegistrar;
pub use envelope::{Pagination, ResponseEnvelope, ResponseItem};
pub use error::{BunqError, BunqResult, ErrorItem};
pub use http::{BunqClient, RequestOptions, Verification};
pub use installation::{Installation, InstallationManager};
pub use orchestrator::SessionOrchestrator;
pub use session::{Session, SessionManager, UserIdentity, UserSummary};
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

pub use bunqlink_crypto as crypto;
