use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{Config, DeletePolicy};
use crate::error::{AppError, Result};
use crate::form::AddForm;
use crate::models::{Bookmark, BookmarkId, NewBookmark, User};
use crate::realtime::{ChangeEvent, ChannelSpec, RealtimeSubscription};
use crate::services::{BookmarkBackend, SessionManager, SupabaseClient, TokenSource};
use crate::store::{BookmarkStore, BookmarkView, DeleteConfirmations, Press};
use crate::tui::AppAction;

const MUTATION_BUFFER: usize = 32;
const STATUS_TTL: Duration = Duration::from_secs(5);

// Outcome of a backend mutation, sent back from its task.
#[derive(Debug)]
pub enum MutationResult {
    Added {
        speculative: BookmarkId,
        result: std::result::Result<Bookmark, String>,
    },
    Deleted {
        id: BookmarkId,
        result: std::result::Result<(), String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    AddForm,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    SignOut,
}

pub struct App {
    // Data
    pub user: User,
    pub store: BookmarkStore,

    // UI State
    pub selected_index: usize,
    pub mode: InputMode,
    pub form: AddForm,
    pub search: String,
    pub show_help: bool,
    pub confirmations: DeleteConfirmations,
    status: Option<(Status, Instant)>,
    delete_policy: DeletePolicy,

    // Async state
    mutation_tx: mpsc::Sender<MutationResult>,
    mutation_rx: mpsc::Receiver<MutationResult>,
    realtime: Option<RealtimeSubscription>,
    refresher: Option<JoinHandle<()>>,

    // Services
    backend: Arc<dyn BookmarkBackend>,
}

impl App {
    /// Start a session: seed from the backend and join the realtime channel.
    pub async fn new(config: &Config, sessions: Arc<SessionManager>) -> Result<Self> {
        let user = sessions.user().clone();
        let backend: Arc<dyn BookmarkBackend> =
            Arc::new(SupabaseClient::new(config, sessions.clone())?);

        let bookmarks = match backend.fetch_bookmarks(&user.id).await {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                tracing::error!("Error fetching bookmarks: {}", e);
                Vec::new()
            }
        };

        let mut app = Self::with_backend(
            user,
            backend,
            bookmarks,
            config.delete_policy,
            config.confirm_window(),
        );

        if config.realtime {
            // The channel joins with whatever token the watch holds.
            sessions.access_token().await?;
            let spec = ChannelSpec::bookmarks(&app.user.id);
            match RealtimeSubscription::subscribe(config, sessions.watch_tokens(), spec).await {
                Ok(subscription) => app.realtime = Some(subscription),
                Err(e) => {
                    tracing::warn!("Realtime unavailable: {}", e);
                    app.set_status(Status::Info("Live updates unavailable".to_string()));
                }
            }
        }

        app.refresher = Some(sessions.spawn_refresher());
        Ok(app)
    }

    pub fn with_backend(
        user: User,
        backend: Arc<dyn BookmarkBackend>,
        bookmarks: Vec<Bookmark>,
        delete_policy: DeletePolicy,
        confirm_window: Duration,
    ) -> Self {
        let (mutation_tx, mutation_rx) = mpsc::channel(MUTATION_BUFFER);

        Self {
            user,
            store: BookmarkStore::new(bookmarks),
            selected_index: 0,
            mode: InputMode::Normal,
            form: AddForm::default(),
            search: String::new(),
            show_help: false,
            confirmations: DeleteConfirmations::new(confirm_window),
            status: None,
            delete_policy,
            mutation_tx,
            mutation_rx,
            realtime: None,
            refresher: None,
            backend,
        }
    }

    pub fn visible(&self) -> Vec<BookmarkView<'_>> {
        self.store.view(&self.search)
    }

    pub fn selected(&self) -> Option<BookmarkView<'_>> {
        self.visible().get(self.selected_index).copied()
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref().map(|(status, _)| status)
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    pub fn is_live(&self) -> bool {
        self.realtime.is_some()
    }

    fn set_status(&mut self, status: Status) {
        self.status = Some((status, Instant::now()));
    }

    pub fn handle_action(&mut self, action: AppAction) -> Result<Option<Exit>> {
        match action {
            AppAction::Quit => return Ok(Some(Exit::Quit)),
            AppAction::SignOut => return Ok(Some(Exit::SignOut)),

            AppAction::MoveUp => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }

            AppAction::MoveDown => {
                let len = self.visible().len();
                if len > 0 && self.selected_index < len - 1 {
                    self.selected_index += 1;
                }
            }

            AppAction::MoveToTop => self.selected_index = 0,

            AppAction::MoveToBottom => {
                self.selected_index = self.visible().len().saturating_sub(1);
            }

            AppAction::OpenInBrowser => {
                if let Some(view) = self.selected() {
                    let url = view.bookmark.url.clone();
                    if let Err(e) = open::that(&url) {
                        tracing::warn!("Failed to open {}: {}", url, e);
                    }
                }
            }

            AppAction::DeleteBookmark => self.request_delete(Instant::now()),

            AppAction::OpenForm => {
                self.mode = InputMode::AddForm;
            }

            AppAction::FormChar(c) => self.form.input_char(c),
            AppAction::FormBackspace => self.form.backspace(),
            AppAction::FormNextField => self.form.toggle_focus(),
            AppAction::FormSubmit => self.submit_form(),

            AppAction::FormCancel => {
                self.mode = InputMode::Normal;
            }

            AppAction::StartSearch => {
                self.mode = InputMode::Search;
            }

            AppAction::SearchChar(c) => {
                self.search.push(c);
                self.selected_index = 0;
            }

            AppAction::SearchBackspace => {
                self.search.pop();
                self.selected_index = 0;
            }

            AppAction::SearchConfirm => {
                self.mode = InputMode::Normal;
            }

            AppAction::SearchCancel => {
                self.search.clear();
                self.mode = InputMode::Normal;
                self.selected_index = 0;
            }

            AppAction::ShowHelp => {
                self.show_help = true;
            }

            AppAction::HideHelp => {
                self.show_help = false;
            }
        }

        Ok(None)
    }

    // Add

    /// Validate the form and, if it passes, start the add. Field errors stay on the form.
    pub fn submit_form(&mut self) {
        let Some(valid) = self.form.submit() else {
            return;
        };
        let speculative = self.add_bookmark(valid.title, valid.url);
        self.form.pending = Some(speculative);
        self.mode = InputMode::Normal;
        self.selected_index = 0;
    }

    /// Show a speculative entry and insert the row in the background.
    pub fn add_bookmark(&mut self, title: String, url: String) -> BookmarkId {
        let speculative = self.store.begin_add(
            title.clone(),
            url.clone(),
            self.user.id.clone(),
            Utc::now(),
        );

        let new = NewBookmark {
            title,
            url,
            user_id: self.user.id.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let tx = self.mutation_tx.clone();
        let id = speculative.clone();

        tokio::spawn(async move {
            let result = backend
                .insert_bookmark(&new)
                .await
                .map_err(|e| e.to_string());
            let _ = tx
                .send(MutationResult::Added {
                    speculative: id,
                    result,
                })
                .await;
        });

        speculative
    }

    // Delete

    fn request_delete(&mut self, now: Instant) {
        let Some(view) = self.selected() else {
            return;
        };
        if view.is_pending || self.store.is_deleting(&view.bookmark.id) {
            return;
        }
        let id = view.bookmark.id.clone();

        match self.delete_policy {
            DeletePolicy::Immediate => self.delete_bookmark(id),
            DeletePolicy::Confirm => match self.confirmations.press(&id, now) {
                Press::Armed { .. } => {
                    self.set_status(Status::Info("Press d again to delete".to_string()));
                }
                Press::Confirmed => {
                    self.status = None;
                    self.delete_bookmark(id);
                }
            },
        }
    }

    /// Hide the row and delete it in the background. The delete is scoped to the
    /// current user; zero affected rows counts as a failure.
    pub fn delete_bookmark(&mut self, id: BookmarkId) {
        if !self.store.begin_delete(&id) {
            return;
        }
        self.confirmations.cancel(&id);
        self.clamp_selection();

        let backend = Arc::clone(&self.backend);
        let tx = self.mutation_tx.clone();
        let user_id = self.user.id.clone();

        tokio::spawn(async move {
            let result = match backend.delete_bookmark(&id, &user_id).await {
                Ok(rows) if rows.is_empty() => Err(AppError::NothingDeleted.to_string()),
                Ok(_) => Ok(()),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(MutationResult::Deleted { id, result }).await;
        });
    }

    // Reconciliation

    pub fn apply_mutation_result(&mut self, result: MutationResult) {
        match result {
            MutationResult::Added {
                speculative,
                result: Ok(bookmark),
            } => {
                tracing::info!("Saved bookmark {}", bookmark.url);
                self.store.confirm_add(&speculative, bookmark);
                if self.form.pending.as_ref() == Some(&speculative) {
                    self.form.reset();
                }
            }
            MutationResult::Added {
                speculative,
                result: Err(message),
            } => {
                tracing::error!("Failed to save bookmark: {}", message);
                self.store.fail_add(&speculative);
                if self.form.pending.as_ref() == Some(&speculative) {
                    self.form.fail(message);
                    self.mode = InputMode::AddForm;
                } else {
                    self.set_status(Status::Error(message));
                }
            }
            MutationResult::Deleted { id, result: Ok(()) } => {
                tracing::info!("Deleted bookmark {}", id);
                self.store.confirm_delete(&id);
            }
            MutationResult::Deleted {
                id,
                result: Err(message),
            } => {
                tracing::error!("Deletion of {} failed, restoring: {}", id, message);
                self.store.fail_delete(&id);
                self.set_status(Status::Error(format!("Could not delete bookmark: {message}")));
            }
        }
        self.clamp_selection();
    }

    pub fn apply_change(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(bookmark) => {
                if bookmark.user_id != self.user.id {
                    return;
                }
                self.store.apply_remote_insert(bookmark);
            }
            ChangeEvent::Delete(id) => {
                self.store.apply_remote_delete(&id);
                self.confirmations.cancel(&id);
            }
        }
        self.clamp_selection();
    }

    /// Apply finished mutations (non-blocking).
    pub fn poll_mutation_results(&mut self) {
        while let Ok(result) = self.mutation_rx.try_recv() {
            self.apply_mutation_result(result);
        }
    }

    /// Apply pushed changes (non-blocking).
    pub fn poll_realtime_events(&mut self) {
        let mut events = Vec::new();
        let mut closed = false;
        if let Some(realtime) = self.realtime.as_mut() {
            while let Some(event) = realtime.try_next() {
                events.push(event);
            }
            closed = realtime.is_closed();
        }
        for event in events {
            self.apply_change(event);
        }
        if closed {
            self.realtime = None;
            self.set_status(Status::Info("Live updates stopped".to_string()));
        }
    }

    /// Expire delete confirmations and stale status messages.
    pub fn tick(&mut self, now: Instant) {
        self.confirmations.expire(now);
        if let Some((_, at)) = &self.status {
            if now.duration_since(*at) >= STATUS_TTL {
                self.status = None;
            }
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= len {
            self.selected_index = len - 1;
        }
    }

    /// Tear down the realtime subscription and stop refreshing the session.
    pub async fn shutdown(&mut self) {
        if let Some(realtime) = self.realtime.take() {
            realtime.unsubscribe().await;
        }
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};

    use crate::form::validator::FieldError;
    use crate::form::Field;
    use crate::models::user::UserMetadata;

    #[derive(Default)]
    struct FakeBackend {
        rows: Mutex<Vec<Bookmark>>,
        fail_insert: Option<String>,
        fail_delete: Option<String>,
        next_id: Mutex<u32>,
    }

    #[async_trait]
    impl BookmarkBackend for FakeBackend {
        async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|b| b.user_id == user_id).cloned().collect())
        }

        async fn insert_bookmark(&self, new: &NewBookmark) -> Result<Bookmark> {
            if let Some(message) = &self.fail_insert {
                return Err(AppError::Api(message.clone()));
            }
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let row = Bookmark {
                id: BookmarkId::new(format!("srv-{next_id}")),
                user_id: new.user_id.clone(),
                title: new.title.clone(),
                url: new.url.clone(),
                created_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn delete_bookmark(&self, id: &BookmarkId, user_id: &str) -> Result<Vec<Bookmark>> {
            if let Some(message) = &self.fail_delete {
                return Err(AppError::Api(message.clone()));
            }
            let mut rows = self.rows.lock().unwrap();
            let (removed, kept): (Vec<_>, Vec<_>) = rows
                .drain(..)
                .partition(|b| &b.id == id && b.user_id == user_id);
            *rows = kept;
            Ok(removed)
        }
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            user_metadata: UserMetadata::default(),
        }
    }

    fn bookmark(id: &str, user_id: &str, title: &str, minutes_ago: i64) -> Bookmark {
        Bookmark {
            id: BookmarkId::new(id),
            user_id: user_id.to_string(),
            title: title.to_string(),
            url: format!("https://{id}.example.com"),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
                - ChronoDuration::minutes(minutes_ago),
        }
    }

    fn seed() -> Vec<Bookmark> {
        vec![
            bookmark("a", "u1", "Rust Book", 1),
            bookmark("b", "u1", "Tokio", 2),
            bookmark("c", "u1", "Serde", 3),
        ]
    }

    fn app_with(backend: FakeBackend, policy: DeletePolicy) -> App {
        *backend.rows.lock().unwrap() = seed();
        App::with_backend(
            user(),
            Arc::new(backend),
            seed(),
            policy,
            Duration::from_secs(3),
        )
    }

    fn visible_ids(app: &App) -> Vec<String> {
        app.visible()
            .iter()
            .map(|v| v.bookmark.id.to_string())
            .collect()
    }

    fn type_into_form(app: &mut App, title: &str, url: &str) {
        app.handle_action(AppAction::OpenForm).unwrap();
        title.chars().for_each(|c| {
            app.handle_action(AppAction::FormChar(c)).unwrap();
        });
        app.handle_action(AppAction::FormNextField).unwrap();
        url.chars().for_each(|c| {
            app.handle_action(AppAction::FormChar(c)).unwrap();
        });
    }

    async fn settle(app: &mut App) {
        let result = app.mutation_rx.recv().await.expect("mutation result");
        app.apply_mutation_result(result);
    }

    #[tokio::test]
    async fn add_shows_speculative_entry_then_canonical_row() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        type_into_form(&mut app, "Example", "example.com");

        app.handle_action(AppAction::FormSubmit).unwrap();

        let head = app.visible()[0];
        assert!(head.is_pending);
        assert!(head.bookmark.id.is_speculative());
        assert_eq!(head.bookmark.url, "https://example.com");
        assert_eq!(app.mode, InputMode::Normal);
        assert!(app.form.is_pending());

        settle(&mut app).await;

        let head = app.visible()[0];
        assert!(!head.is_pending);
        assert_eq!(head.bookmark.id.as_str(), "srv-1");
        assert_eq!(head.bookmark.title, "Example");
        assert_eq!(app.visible().len(), 4);
        assert!(app.form.title.is_empty());
        assert!(!app.form.is_pending());
    }

    #[tokio::test]
    async fn failed_add_restores_list_and_reopens_form_with_error() {
        let backend = FakeBackend {
            fail_insert: Some("permission denied for table bookmarks".to_string()),
            ..FakeBackend::default()
        };
        let mut app = app_with(backend, DeletePolicy::Immediate);
        let before = visible_ids(&app);
        type_into_form(&mut app, "Example", "example.com");

        app.handle_action(AppAction::FormSubmit).unwrap();
        settle(&mut app).await;

        assert_eq!(visible_ids(&app), before);
        assert_eq!(app.mode, InputMode::AddForm);
        assert_eq!(
            app.form.api_error.as_deref(),
            Some("permission denied for table bookmarks")
        );
        assert_eq!(app.form.title, "Example");
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        type_into_form(&mut app, "", "not a url");

        app.handle_action(AppAction::FormSubmit).unwrap();

        assert_eq!(app.form.errors.title, Some(FieldError::TitleRequired));
        assert_eq!(app.form.errors.url, Some(FieldError::UrlInvalid));
        assert_eq!(app.form.focus, Field::Title);
        assert_eq!(app.mode, InputMode::AddForm);
        assert_eq!(app.store.pending_add_count(), 0);
        assert!(app.mutation_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn immediate_delete_hides_then_removes() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        app.handle_action(AppAction::MoveDown).unwrap();

        app.handle_action(AppAction::DeleteBookmark).unwrap();
        assert_eq!(visible_ids(&app), ["a", "c"]);

        settle(&mut app).await;
        assert_eq!(visible_ids(&app), ["a", "c"]);
        assert!(!app.store.contains(&BookmarkId::new("b")));
        assert!(app.status().is_none());
    }

    #[tokio::test]
    async fn failed_delete_restores_row_in_creation_order() {
        let backend = FakeBackend {
            fail_delete: Some("network down".to_string()),
            ..FakeBackend::default()
        };
        let mut app = app_with(backend, DeletePolicy::Immediate);
        app.handle_action(AppAction::MoveDown).unwrap();

        app.handle_action(AppAction::DeleteBookmark).unwrap();
        settle(&mut app).await;

        assert_eq!(visible_ids(&app), ["a", "b", "c"]);
        assert_eq!(
            app.status(),
            Some(&Status::Error("Could not delete bookmark: network down".to_string()))
        );
    }

    #[tokio::test]
    async fn zero_rows_deleted_is_a_failure() {
        let backend = FakeBackend::default();
        let mut app = App::with_backend(
            user(),
            Arc::new(backend),
            seed(),
            DeletePolicy::Immediate,
            Duration::from_secs(3),
        );
        // Backend holds no rows, so the scoped delete affects nothing.
        app.handle_action(AppAction::DeleteBookmark).unwrap();
        settle(&mut app).await;

        assert_eq!(visible_ids(&app), ["a", "b", "c"]);
        assert_eq!(
            app.status(),
            Some(&Status::Error("Could not delete bookmark: No rows deleted".to_string()))
        );
    }

    #[tokio::test]
    async fn confirm_policy_needs_second_press_within_window() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Confirm);
        let t0 = Instant::now();

        app.request_delete(t0);
        assert_eq!(visible_ids(&app), ["a", "b", "c"]);
        assert!(app.confirmations.is_confirming(&BookmarkId::new("a"), t0));
        assert_eq!(
            app.status(),
            Some(&Status::Info("Press d again to delete".to_string()))
        );

        app.tick(t0 + Duration::from_secs(4));
        assert!(!app.confirmations.is_confirming(&BookmarkId::new("a"), t0 + Duration::from_secs(4)));

        let t1 = t0 + Duration::from_secs(5);
        app.request_delete(t1);
        app.request_delete(t1 + Duration::from_secs(1));
        assert_eq!(visible_ids(&app), ["b", "c"]);

        settle(&mut app).await;
        assert!(!app.store.contains(&BookmarkId::new("a")));
    }

    #[tokio::test]
    async fn speculative_rows_cannot_be_deleted() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        app.add_bookmark("Example".to_string(), "https://example.com".to_string());

        app.handle_action(AppAction::DeleteBookmark).unwrap();

        assert!(app.visible()[0].is_pending);
        assert_eq!(app.visible().len(), 4);
    }

    #[tokio::test]
    async fn realtime_insert_after_confirmed_add_is_deduplicated() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        app.add_bookmark("Example".to_string(), "https://example.com".to_string());
        settle(&mut app).await;
        let canonical = app.visible()[0].bookmark.clone();

        app.apply_change(ChangeEvent::Insert(canonical));

        assert_eq!(app.visible().len(), 4);
    }

    #[tokio::test]
    async fn realtime_events_merge_into_the_list() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);

        app.apply_change(ChangeEvent::Insert(bookmark("z", "u1", "Pushed", 0)));
        app.apply_change(ChangeEvent::Insert(bookmark("y", "intruder", "Foreign", 0)));
        app.apply_change(ChangeEvent::Delete(BookmarkId::new("c")));
        app.apply_change(ChangeEvent::Delete(BookmarkId::new("never-existed")));

        assert_eq!(visible_ids(&app), ["z", "a", "b"]);
    }

    #[tokio::test]
    async fn search_filters_and_cancel_restores() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);

        app.handle_action(AppAction::StartSearch).unwrap();
        "tokio".chars().for_each(|c| {
            app.handle_action(AppAction::SearchChar(c)).unwrap();
        });
        assert_eq!(visible_ids(&app), ["b"]);

        app.handle_action(AppAction::SearchConfirm).unwrap();
        assert_eq!(app.mode, InputMode::Normal);
        assert_eq!(visible_ids(&app), ["b"]);

        app.handle_action(AppAction::StartSearch).unwrap();
        app.handle_action(AppAction::SearchCancel).unwrap();
        assert_eq!(visible_ids(&app), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn selection_is_clamped_after_rows_disappear() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        app.handle_action(AppAction::MoveToBottom).unwrap();
        assert_eq!(app.selected_index, 2);

        app.apply_change(ChangeEvent::Delete(BookmarkId::new("c")));
        assert_eq!(app.selected_index, 1);
        assert_eq!(app.selected().unwrap().bookmark.id.as_str(), "b");
    }

    #[tokio::test]
    async fn quit_and_sign_out_end_the_loop() {
        let mut app = app_with(FakeBackend::default(), DeletePolicy::Immediate);
        assert_eq!(app.handle_action(AppAction::Quit).unwrap(), Some(Exit::Quit));
        assert_eq!(app.handle_action(AppAction::SignOut).unwrap(), Some(Exit::SignOut));
        assert_eq!(app.handle_action(AppAction::ShowHelp).unwrap(), None);
        assert!(app.show_help);
    }
}
