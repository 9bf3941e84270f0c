//! Keeps the signed-in session fresh while the TUI is running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::auth::{AuthClient, Session, SessionStore};
use crate::error::Result;
use crate::models::User;

const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(30);

/// Source of bearer tokens for backend requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token that is not about to expire.
    async fn access_token(&self) -> Result<String>;

    /// The backend rejected `rejected`; return a replacement.
    async fn refresh(&self, rejected: &str) -> Result<String>;
}

/// Shared owner of the current [`Session`]. Refreshes are serialized, saved to
/// the session file and broadcast to [`SessionManager::watch_tokens`] receivers.
pub struct SessionManager {
    auth: AuthClient,
    store: SessionStore,
    user: User,
    session: Mutex<Session>,
    tokens: watch::Sender<String>,
}

impl SessionManager {
    pub fn new(auth: AuthClient, store: SessionStore, session: Session) -> Self {
        let (tokens, _) = watch::channel(session.access_token.clone());
        Self {
            auth,
            store,
            user: session.user.clone(),
            session: Mutex::new(session),
            tokens,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn watch_tokens(&self) -> watch::Receiver<String> {
        self.tokens.subscribe()
    }

    async fn refresh_locked(&self, session: &mut Session) -> Result<String> {
        let refreshed = self.auth.refresh(session).await?;
        if let Err(e) = self.store.save(&refreshed) {
            tracing::warn!("Could not save refreshed session: {}", e);
        }
        *session = refreshed;
        self.tokens.send_replace(session.access_token.clone());
        tracing::info!("Access token refreshed");
        Ok(session.access_token.clone())
    }

    /// Refresh ahead of every expiry until the handle is aborted.
    pub fn spawn_refresher(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let due_in = manager.session.lock().await.refresh_due_in(Utc::now());
                tokio::time::sleep(due_in).await;
                if let Err(e) = manager.access_token().await {
                    tracing::warn!("Background token refresh failed: {}", e);
                    tokio::time::sleep(RETRY_AFTER_FAILURE).await;
                }
            }
        })
    }

    /// Revoke the session remotely (best effort) and delete the session file.
    pub async fn sign_out(&self) -> Result<()> {
        let session = self.session.lock().await;
        if let Err(e) = self.auth.sign_out(&session).await {
            tracing::warn!("Remote sign-out failed: {}", e);
        }
        self.store.clear()
    }
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if session.is_expired(Utc::now()) {
            return self.refresh_locked(&mut session).await;
        }
        Ok(session.access_token.clone())
    }

    async fn refresh(&self, rejected: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        // Another caller already replaced the rejected token.
        if session.access_token != rejected {
            return Ok(session.access_token.clone());
        }
        self.refresh_locked(&mut session).await
    }
}
