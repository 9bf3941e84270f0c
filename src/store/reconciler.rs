//! Authoritative bookmark collection plus the optimistic overlay.
//!
//! The authoritative list only changes through confirmed mutations and realtime
//! push events. Speculative adds and in-flight deletes live in their own
//! collections and are merged by [`project`] whenever the UI asks for a view.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{Bookmark, BookmarkId};

/// One row of the projected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkView<'a> {
    pub bookmark: &'a Bookmark,
    /// Speculative entry still waiting for the backend.
    pub is_pending: bool,
}

#[derive(Debug, Default)]
pub struct BookmarkStore {
    /// Canonical rows, newest first.
    authoritative: Vec<Bookmark>,
    /// Speculative adds, newest first.
    pending_adds: Vec<Bookmark>,
    /// Rows hidden while their delete is in flight, keyed by id.
    pending_deletes: HashMap<BookmarkId, Bookmark>,
}

impl BookmarkStore {
    /// Seed from the initial fetch. Order is re-established locally.
    pub fn new(mut bookmarks: Vec<Bookmark>) -> Self {
        sort_newest_first(&mut bookmarks);
        bookmarks.dedup_by(|a, b| a.id == b.id);
        Self {
            authoritative: bookmarks,
            ..Self::default()
        }
    }

    pub fn view(&self, query: &str) -> Vec<BookmarkView<'_>> {
        project(&self.authoritative, &self.pending_adds, &self.pending_deletes, query)
    }

    /// Number of visible rows without a filter.
    pub fn len(&self) -> usize {
        self.pending_adds.len() + self.authoritative.len() - self.hidden_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.authoritative.iter().any(|b| &b.id == id)
    }

    pub fn is_deleting(&self, id: &BookmarkId) -> bool {
        self.pending_deletes.contains_key(id)
    }

    pub fn pending_add_count(&self) -> usize {
        self.pending_adds.len()
    }

    pub fn pending_delete_count(&self) -> usize {
        self.pending_deletes.len()
    }

    fn hidden_count(&self) -> usize {
        self.pending_deletes
            .keys()
            .filter(|id| self.contains(id))
            .count()
    }

    // Add

    /// Show a speculative entry at the head and return its id.
    pub fn begin_add(
        &mut self,
        title: String,
        url: String,
        user_id: String,
        now: DateTime<Utc>,
    ) -> BookmarkId {
        let id = BookmarkId::speculative(now);
        self.pending_adds.insert(
            0,
            Bookmark {
                id: id.clone(),
                user_id,
                title,
                url,
                created_at: now,
            },
        );
        id
    }

    /// Replace the speculative entry with the canonical row. The canonical row is
    /// skipped if a push event already delivered it. Returns `false` when the add
    /// was already settled.
    pub fn confirm_add(&mut self, speculative: &BookmarkId, canonical: Bookmark) -> bool {
        if !self.remove_pending_add(speculative) {
            return false;
        }
        self.insert_sorted(canonical);
        true
    }

    /// Drop the speculative entry. Returns `false` when the add was already settled.
    pub fn fail_add(&mut self, speculative: &BookmarkId) -> bool {
        self.remove_pending_add(speculative)
    }

    fn remove_pending_add(&mut self, speculative: &BookmarkId) -> bool {
        let before = self.pending_adds.len();
        self.pending_adds.retain(|b| &b.id != speculative);
        self.pending_adds.len() != before
    }

    // Delete

    /// Hide a canonical row while its delete is in flight. Refused for unknown ids,
    /// speculative ids and rows already being deleted.
    pub fn begin_delete(&mut self, id: &BookmarkId) -> bool {
        if id.is_speculative() || self.is_deleting(id) {
            return false;
        }
        let Some(snapshot) = self.authoritative.iter().find(|b| &b.id == id).cloned() else {
            return false;
        };
        self.pending_deletes.insert(id.clone(), snapshot);
        true
    }

    /// The backend removed the row.
    pub fn confirm_delete(&mut self, id: &BookmarkId) -> bool {
        if self.pending_deletes.remove(id).is_none() {
            return false;
        }
        self.authoritative.retain(|b| &b.id != id);
        true
    }

    /// The delete failed: show the row again at its creation-time position.
    pub fn fail_delete(&mut self, id: &BookmarkId) -> bool {
        let Some(snapshot) = self.pending_deletes.remove(id) else {
            return false;
        };
        self.insert_sorted(snapshot);
        true
    }

    // Realtime

    /// Insert pushed by the backend. No-op if the id is already present.
    pub fn apply_remote_insert(&mut self, bookmark: Bookmark) -> bool {
        self.insert_sorted(bookmark)
    }

    /// Delete pushed by the backend. Idempotent. Also settles a pending local
    /// delete so a late failure cannot bring the row back.
    pub fn apply_remote_delete(&mut self, id: &BookmarkId) -> bool {
        self.pending_deletes.remove(id);
        let before = self.authoritative.len();
        self.authoritative.retain(|b| &b.id != id);
        self.authoritative.len() != before
    }

    fn insert_sorted(&mut self, bookmark: Bookmark) -> bool {
        if self.contains(&bookmark.id) {
            return false;
        }
        let pos = self
            .authoritative
            .partition_point(|b| b.created_at > bookmark.created_at);
        self.authoritative.insert(pos, bookmark);
        true
    }
}

/// Merge authoritative rows with the optimistic overlay: speculative adds first,
/// rows mid-delete hidden, then the case-insensitive title/URL filter.
pub fn project<'a>(
    authoritative: &'a [Bookmark],
    pending_adds: &'a [Bookmark],
    pending_deletes: &HashMap<BookmarkId, Bookmark>,
    query: &str,
) -> Vec<BookmarkView<'a>> {
    let needle = query.trim().to_lowercase();

    let speculative = pending_adds.iter().map(|bookmark| BookmarkView {
        bookmark,
        is_pending: true,
    });
    let canonical = authoritative
        .iter()
        .filter(|b| !pending_deletes.contains_key(&b.id))
        .map(|bookmark| BookmarkView {
            bookmark,
            is_pending: false,
        });

    speculative
        .chain(canonical)
        .filter(|v| v.bookmark.matches(&needle))
        .collect()
}

fn sort_newest_first(bookmarks: &mut [Bookmark]) {
    bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
