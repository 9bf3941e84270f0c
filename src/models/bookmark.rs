use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix that marks an id as locally generated and not yet confirmed.
pub const SPECULATIVE_PREFIX: &str = "optimistic-";

static SPECULATIVE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh speculative id. Unique within the process even for adds in the same millisecond.
    pub fn speculative(now: DateTime<Utc>) -> Self {
        let seq = SPECULATIVE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}{}-{}",
            SPECULATIVE_PREFIX,
            now.timestamp_millis(),
            seq
        ))
    }

    pub fn is_speculative(&self) -> bool {
        self.0.starts_with(SPECULATIVE_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tables keyed by uuid send text ids, bigint identity columns send numbers.
impl<'de> Deserialize<'de> for BookmarkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => BookmarkId(s),
            RawId::Number(n) => BookmarkId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    /// Host of the bookmark URL without a leading `www.`, or the raw URL when it does not parse.
    pub fn domain(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn created_label(&self) -> String {
        self.created_at.format("%b %-d, %Y").to_string()
    }

    /// Case-insensitive substring match over title and URL. `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.title.to_lowercase().contains(needle)
            || self.url.to_lowercase().contains(needle)
    }
}

/// Insert payload; the backend assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}
