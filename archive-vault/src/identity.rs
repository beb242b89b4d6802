//! Identity provider clients
//!
//! The vault never authenticates users itself; it asks an external provider
//! for an anonymous session and follows the provider's session changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use archive_common::config::VaultConfig;
use archive_common::{Error, Result, SessionId};

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";
const USER_AGENT: &str = concat!("cyber-archive/", env!("CARGO_PKG_VERSION"));
/// Refresh this long before the provider-declared expiry
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Request a new anonymous session
    async fn begin_anonymous_session(&self) -> Result<SessionId>;

    /// Receiver that observes every session change (None = signed out)
    fn on_session_change(&self) -> watch::Receiver<Option<SessionId>>;
}

/// Supplies a bearer token for store requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>>;
}

/// In-process identity provider
///
/// Issues random session ids; used by the memory backend and tests.
pub struct MemoryIdentity {
    session_tx: watch::Sender<Option<SessionId>>,
    offline: AtomicBool,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            session_tx,
            offline: AtomicBool::new(false),
        }
    }

    /// Make subsequent sign-in attempts fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Replace the current session, as a provider-side sign-in would
    pub fn switch_session(&self, session: SessionId) {
        self.session_tx.send_replace(Some(session));
    }

    /// Drop the current session, as a provider-side sign-out would
    pub fn sign_out(&self) {
        self.session_tx.send_replace(None);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn begin_anonymous_session(&self) -> Result<SessionId> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("identity provider unreachable".to_string()));
        }
        let session = SessionId::new(uuid::Uuid::new_v4().simple().to_string());
        self.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    fn on_session_change(&self) -> watch::Receiver<Option<SessionId>> {
        self.session_tx.subscribe()
    }
}

#[async_trait]
impl TokenSource for MemoryIdentity {
    async fn bearer_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

#[derive(Debug)]
struct Credentials {
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

/// Hosted identity toolkit client (anonymous sign-up over REST)
pub struct FirebaseIdentity {
    http_client: reqwest::Client,
    api_key: String,
    credentials: Mutex<Option<Credentials>>,
    session_tx: watch::Sender<Option<SessionId>>,
}

impl FirebaseIdentity {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("api_key is required for firestore backend".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        let (session_tx, _) = watch::channel(None);

        Ok(Self {
            http_client,
            api_key,
            credentials: Mutex::new(None),
            session_tx,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credentials> {
        debug!("Refreshing identity token");
        let response = self
            .http_client
            .post(REFRESH_URL)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let body: RefreshResponse = parse_response(response).await?;
        Ok(Credentials {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(&body.expires_in),
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn begin_anonymous_session(&self) -> Result<SessionId> {
        let response = self
            .http_client
            .post(SIGN_UP_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&SignUpRequest {
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let body: SignUpResponse = parse_response(response).await?;
        let session = SessionId::new(body.local_id);

        *self.credentials.lock().await = Some(Credentials {
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_at: expiry(&body.expires_in),
        });
        self.session_tx.send_replace(Some(session.clone()));

        Ok(session)
    }

    fn on_session_change(&self) -> watch::Receiver<Option<SessionId>> {
        self.session_tx.subscribe()
    }
}

#[async_trait]
impl TokenSource for FirebaseIdentity {
    async fn bearer_token(&self) -> Result<Option<String>> {
        let mut guard = self.credentials.lock().await;
        let Some(current) = guard.as_ref() else {
            return Ok(None);
        };

        if Instant::now() + REFRESH_MARGIN < current.expires_at {
            return Ok(Some(current.id_token.clone()));
        }

        let refreshed = self.refresh(&current.refresh_token).await?;
        let token = refreshed.id_token.clone();
        *guard = Some(refreshed);
        Ok(Some(token))
    }
}

fn expiry(expires_in: &str) -> Instant {
    let secs = expires_in.parse::<u64>().unwrap_or(3600);
    Instant::now() + Duration::from_secs(secs)
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        return Err(Error::Transport(format!(
            "identity provider returned {}: {}",
            status.as_u16(),
            message
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Transport(format!("identity response: {}", e)))
}
