use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::session::TokenSource;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Bookmark, BookmarkId, NewBookmark};

const BOOKMARKS_TABLE: &str = "bookmarks";

/// Persistence boundary for bookmark rows.
#[async_trait]
pub trait BookmarkBackend: Send + Sync {
    /// All rows owned by `user_id`, newest first.
    async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>>;

    /// Insert one row and return the canonical record.
    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<Bookmark>;

    /// Delete the row matching both `id` and `user_id`. Returns the rows actually removed.
    async fn delete_bookmark(&self, id: &BookmarkId, user_id: &str) -> Result<Vec<Bookmark>>;
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
    #[serde(default)]
    hint: Option<String>,
}

/// Client for the project's REST (PostgREST) endpoint.
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    anon_key: String,
    tokens: Arc<dyn TokenSource>,
}

impl SupabaseClient {
    pub fn new(config: &Config, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("markd/1.0")
            .build()?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", config.project_url()),
            anon_key: config.supabase_anon_key.clone(),
            tokens,
        })
    }

    fn request(&self, method: Method, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, BOOKMARKS_TABLE))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn fetch_request(&self, token: &str, user_id: &str) -> RequestBuilder {
        self.request(Method::GET, token).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ])
    }

    fn insert_request(&self, token: &str, bookmark: &NewBookmark) -> RequestBuilder {
        self.request(Method::POST, token)
            .header("Prefer", "return=representation")
            .json(bookmark)
    }

    fn delete_request(&self, token: &str, id: &BookmarkId, user_id: &str) -> RequestBuilder {
        self.request(Method::DELETE, token)
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{id}")),
                ("user_id", format!("eq.{user_id}")),
            ])
    }

    /// Send with the current token. A 401 gets one retry with a refreshed token.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.tokens.access_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Access token rejected, refreshing");
        let token = self.tokens.refresh(&token).await?;
        Ok(build(&token).send().await?)
    }

    async fn rows(response: Response) -> Result<Vec<Bookmark>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(api_error(status, &body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BookmarkBackend for SupabaseClient {
    async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
        let response = self
            .send(|token| self.fetch_request(token, user_id))
            .await?;

        let bookmarks = Self::rows(response).await?;
        tracing::debug!("Fetched {} bookmarks", bookmarks.len());
        Ok(bookmarks)
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<Bookmark> {
        let response = self
            .send(|token| self.insert_request(token, bookmark))
            .await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No row returned from insert").into())
    }

    async fn delete_bookmark(&self, id: &BookmarkId, user_id: &str) -> Result<Vec<Bookmark>> {
        let response = self
            .send(|token| self.delete_request(token, id, user_id))
            .await?;

        Self::rows(response).await
    }
}

/// Turn a non-success response into a single human-readable error.
fn api_error(status: StatusCode, body: &str) -> AppError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => match err.hint {
            Some(hint) if !hint.is_empty() => AppError::Api(format!("{} ({hint})", err.message)),
            _ => AppError::Api(err.message),
        },
        Err(_) if body.trim().is_empty() => AppError::Api(format!("Request failed: HTTP {status}")),
        Err(_) => AppError::Api(format!("Request failed: HTTP {status}: {}", body.trim())),
    }
}
