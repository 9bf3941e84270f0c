use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::User;

const OAUTH_PROVIDER: &str = "google";
const CALLBACK_PATH: &str = "/auth/callback";
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);
const SERVER_DRAIN: Duration = Duration::from_secs(2);
// Refresh a little before the backend would reject the token.
const EXPIRY_MARGIN_SECS: i64 = 60;

const CALLBACK_PAGE: &str = "<!doctype html><html><body style=\"font-family:sans-serif\">\
<h2>Signed in to Markd</h2><p>You can close this tab and return to the terminal.</p></body></html>";
const FAILED_PAGE: &str = "<!doctype html><html><body style=\"font-family:sans-serif\">\
<h2>Sign-in failed</h2><p>Return to the terminal for details.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at - EXPIRY_MARGIN_SECS
    }

    /// Time left until [`Session::is_expired`] turns true.
    pub fn refresh_due_in(&self, now: DateTime<Utc>) -> Duration {
        let secs = self.expires_at - EXPIRY_MARGIN_SECS - now.timestamp();
        Duration::from_secs(secs.max(0) as u64)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: self
                .expires_at
                .unwrap_or_else(|| now.timestamp() + self.expires_in),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user: self.user,
        }
    }
}

#[derive(Debug, Serialize)]
struct PkceGrant<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(alias = "msg", alias = "error_description")]
    message: Option<String>,
}

/// Persists the current session as JSON.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Client for the project's auth endpoint.
pub struct AuthClient {
    client: Client,
    auth_url: String,
    anon_key: String,
    callback_port: u16,
}

impl AuthClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            auth_url: format!("{}/auth/v1", config.project_url()),
            anon_key: config.supabase_anon_key.clone(),
            callback_port: config.callback_port,
        })
    }

    fn redirect_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.callback_port, CALLBACK_PATH)
    }

    /// Authorization URL for the PKCE flow (S256 challenge).
    pub fn authorize_url(&self, verifier: &str) -> String {
        format!(
            "{}/authorize?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256&access_type=offline&prompt=consent",
            self.auth_url,
            OAUTH_PROVIDER,
            urlencoding::encode(&self.redirect_url()),
            code_challenge(verifier),
        )
    }

    /// Run the browser sign-in: open the provider page, wait for the loopback
    /// redirect, exchange the code for a session.
    pub async fn sign_in(&self) -> Result<Session> {
        let verifier = new_code_verifier();
        let listener = TcpListener::bind(("127.0.0.1", self.callback_port)).await?;

        let url = self.authorize_url(&verifier);
        tracing::info!("Opening sign-in page");
        if let Err(e) = open::that(&url) {
            tracing::warn!("Could not open browser: {}", e);
        }
        println!("If the browser did not open, visit:\n{url}");

        let code = tokio::time::timeout(SIGN_IN_TIMEOUT, wait_for_code(listener))
            .await
            .map_err(|_| AppError::Auth("Timed out waiting for sign-in".to_string()))??;

        self.exchange_code(&code, &verifier).await
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", "pkce")])
            .header("apikey", &self.anon_key)
            .json(&PkceGrant {
                auth_code: code,
                code_verifier: verifier,
            })
            .send()
            .await?;

        Self::session_from(response).await
    }

    pub async fn refresh(&self, session: &Session) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/token", self.auth_url))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&RefreshGrant {
                refresh_token: &session.refresh_token,
            })
            .send()
            .await?;

        tracing::debug!("Refreshed session for {}", session.user.id);
        Self::session_from(response).await
    }

    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await?;
            return Err(auth_error(&body));
        }
        Ok(())
    }

    async fn session_from(response: reqwest::Response) -> Result<Session> {
        if !response.status().is_success() {
            let body = response.text().await?;
            return Err(auth_error(&body));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.into_session(Utc::now()))
    }
}

fn auth_error(body: &str) -> AppError {
    let message = serde_json::from_str::<AuthErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());
    AppError::Auth(message)
}

fn new_code_verifier() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// `BASE64URL(SHA256(verifier))` without padding.
fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Query string of the loopback redirect.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    /// The authorization code, or the provider's reason for not sending one.
    fn outcome(self) -> std::result::Result<String, String> {
        match self.code.filter(|code| !code.is_empty()) {
            Some(code) => Ok(code),
            None => Err(self
                .error_description
                .or(self.error)
                .unwrap_or_else(|| "Sign-in callback carried no code".to_string())),
        }
    }
}

type CallbackTx = mpsc::Sender<std::result::Result<String, String>>;

async fn callback(
    State(tx): State<CallbackTx>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    let outcome = params.outcome();
    let reply = match &outcome {
        Ok(_) => (StatusCode::OK, Html(CALLBACK_PAGE)),
        Err(_) => (StatusCode::BAD_REQUEST, Html(FAILED_PAGE)),
    };
    let _ = tx.try_send(outcome);
    reply
}

/// Serve the redirect target until the first callback arrives, then shut the server down.
async fn wait_for_code(listener: TcpListener) -> Result<String> {
    let (tx, mut rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = Router::new()
        .route(CALLBACK_PATH, get(callback))
        .with_state(tx);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = rx.recv().await;
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SERVER_DRAIN, &mut server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::debug!("Callback server error: {}", e),
        Ok(Err(e)) => tracing::debug!("Callback server task failed: {}", e),
        Err(_) => server.abort(),
    }

    match outcome {
        Some(Ok(code)) => Ok(code),
        Some(Err(reason)) => Err(AppError::Auth(reason)),
        None => Err(AppError::Auth("Sign-in callback server stopped".to_string())),
    }
}
