//! In-process bunq double shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bunqlink_client::crypto::{sign_body, verify_body, CryptoResult, KeyPair, KeyProvisioner, PublicKey};
use bunqlink_client::http::{HEADER_AUTHENTICATION, HEADER_CLIENT_SIGNATURE, HEADER_SERVER_SIGNATURE};
use bunqlink_client::{
    BunqClient, BunqConfig, BunqResult, CredentialStore, HttpRequest, HttpResponse, MemoryStore,
    SessionOrchestrator, Transport,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

pub const INSTALLATION_TOKEN: &str = "install-token";
pub const DEVICE_ID: u64 = 12345;
pub const USER_ID: u64 = 999;

/// Client and server keypairs, generated once per test binary
pub fn keys() -> &'static (KeyPair, KeyPair) {
    static KEYS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
    KEYS.get_or_init(|| {
        (
            KeyPair::generate(2048).expect("client key"),
            KeyPair::generate(2048).expect("server key"),
        )
    })
}

pub fn server_public_pem() -> String {
    keys().1.public_key().to_pem().unwrap()
}

/// Hands out the cached client keypair instead of generating one
pub struct FixedProvisioner;

#[async_trait]
impl KeyProvisioner for FixedProvisioner {
    async fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        Ok(keys().0.clone())
    }
}

pub fn session_token(n: u64) -> String {
    if n <= 1 {
        "session-token".to_string()
    } else {
        format!("session-token-{}", n)
    }
}

#[derive(Default)]
struct MockState {
    requests: Vec<HttpRequest>,
    client_key: Option<PublicKey>,
    sessions_opened: u64,
    valid_session: Option<String>,
    queued: HashMap<String, VecDeque<HttpResponse>>,
    tamper: bool,
    omit_server_key: bool,
}

/// Minimal stateful bunq: issues tokens, checks client signatures and
/// signs every response with the server key
#[derive(Default)]
pub struct MockBunq {
    state: Mutex<MockState>,
}

impl MockBunq {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests whose route (`"POST installation"`) matches
    pub fn count(&self, route: &str) -> usize {
        self.requests().iter().filter(|r| route_of(r) == route).count()
    }

    /// Reject every session token issued so far
    pub fn expire_sessions(&self) {
        self.state.lock().unwrap().valid_session = None;
    }

    /// Answer the next call to `route` with `response` instead of the default
    pub fn enqueue(&self, route: &str, response: HttpResponse) {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(route.to_string())
            .or_default()
            .push_back(response);
    }

    /// Sign something other than what is sent
    pub fn tamper_signatures(&self, tamper: bool) {
        self.state.lock().unwrap().tamper = tamper;
    }

    pub fn omit_server_key(&self) {
        self.state.lock().unwrap().omit_server_key = true;
    }

    fn respond(&self, request: &HttpRequest) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        let route = route_of(request);

        if let Some(response) = state.queued.get_mut(&route).and_then(VecDeque::pop_front) {
            return response;
        }

        if route != "POST installation" {
            if let Some(rejection) = check_client_signature(&state, request) {
                return rejection;
            }
        }

        let auth = request.header(HEADER_AUTHENTICATION).map(str::to_string);

        match route.as_str() {
            "POST installation" => {
                let body: Value = serde_json::from_str(&request.body).unwrap_or_default();
                state.client_key = body["client_public_key"]
                    .as_str()
                    .and_then(|pem| PublicKey::from_pem(pem).ok());

                let mut items = vec![
                    json!({"Id": {"id": 1}}),
                    json!({"Token": {"token": INSTALLATION_TOKEN}}),
                ];
                if !state.omit_server_key {
                    items.push(json!({"ServerPublicKey": {"server_public_key": server_public_pem()}}));
                }
                ok(json!({ "Response": items }))
            }
            "POST device-server" => {
                if auth.as_deref() != Some(INSTALLATION_TOKEN) {
                    return unauthorised();
                }
                ok(json!({"Response": [{"Id": {"id": DEVICE_ID}}]}))
            }
            "POST session-server" => {
                if auth.as_deref() != Some(INSTALLATION_TOKEN) {
                    return unauthorised();
                }
                state.sessions_opened += 1;
                let n = state.sessions_opened;
                let token = session_token(n);
                state.valid_session = Some(token.clone());
                ok(json!({"Response": [
                    {"Id": {"id": n}},
                    {"Token": {"token": token}},
                    {"UserPerson": {"id": USER_ID, "display_name": "Test User"}}
                ]}))
            }
            "GET user" => {
                if auth.is_none() || auth != state.valid_session {
                    return unauthorised();
                }
                ok(json!({"Response": [{"UserPerson": {"id": USER_ID, "display_name": "Test User"}}]}))
            }
            route if route.starts_with("DELETE session/") => {
                state.valid_session = None;
                ok(json!({"Response": []}))
            }
            _ => error(404, "Route not found"),
        }
    }

    fn sign(&self, response: HttpResponse) -> HttpResponse {
        if response.header(HEADER_SERVER_SIGNATURE).is_some() {
            return response;
        }
        let signed_bytes = if self.state.lock().unwrap().tamper {
            format!("{} ", response.body)
        } else {
            response.body.clone()
        };
        let signature = sign_body(keys().1.private_key(), signed_bytes.as_bytes()).unwrap();
        response.with_header(HEADER_SERVER_SIGNATURE, signature)
    }
}

#[async_trait]
impl Transport for MockBunq {
    async fn send(&self, request: HttpRequest) -> BunqResult<HttpResponse> {
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;
        let response = self.respond(&request);
        Ok(self.sign(response))
    }
}

fn route_of(request: &HttpRequest) -> String {
    let path = request.url.split_once("/v1/").map(|(_, path)| path).unwrap_or_default();
    format!("{} {}", request.method, path)
}

fn check_client_signature(state: &MockState, request: &HttpRequest) -> Option<HttpResponse> {
    let signature = request.header(HEADER_CLIENT_SIGNATURE)?;
    let key = state.client_key.as_ref()?;
    match verify_body(key, request.body.as_bytes(), signature) {
        Ok(true) => None,
        _ => Some(error(400, "Request signature invalid")),
    }
}

pub fn ok(body: Value) -> HttpResponse {
    HttpResponse::new(200, body.to_string())
}

pub fn error(status: u16, description: &str) -> HttpResponse {
    HttpResponse::new(
        status,
        json!({"Error": [{
            "error_description": description,
            "error_description_translated": description,
        }]})
        .to_string(),
    )
}

pub fn unauthorised() -> HttpResponse {
    error(401, "Insufficient authorisation")
}

/// Memory store that also remembers the key order of every batch write
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<Vec<String>>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<Vec<String>> {
        self.writes.lock().unwrap().clone()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.snapshot().await
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get_item(&self, key: &str) -> BunqResult<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> BunqResult<()> {
        self.writes.lock().unwrap().push(vec![key.to_string()]);
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> BunqResult<()> {
        self.inner.remove_item(key).await
    }

    async fn set_items(&self, items: &[(String, String)]) -> BunqResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push(items.iter().map(|(key, _)| key.clone()).collect());
        self.inner.set_items(items).await
    }

    async fn remove_items(&self, keys: &[String]) -> BunqResult<()> {
        self.inner.remove_items(keys).await
    }
}

pub fn config(api_key: &str) -> BunqConfig {
    BunqConfig::sandbox(api_key).with_base_url("https://bunq.test/v1")
}

pub fn orchestrator(
    api_key: &str,
    bunq: &Arc<MockBunq>,
    store: Arc<dyn CredentialStore>,
) -> SessionOrchestrator {
    let client = BunqClient::with_transport(config(api_key), bunq.clone());
    SessionOrchestrator::with_provisioner(client, store, Arc::new(FixedProvisioner))
}
