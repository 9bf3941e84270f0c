use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod app;
mod config;
mod error;
mod form;
mod models;
mod realtime;
mod services;
mod store;
mod tui;

use app::{App, Exit};
use config::Config;
use error::{AppError, Result};
use services::{
    AuthClient, BookmarkBackend, Session, SessionManager, SessionStore, SupabaseClient,
};
use tui::{draw, handle_key_event};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let flag = args.get(1).map(String::as_str);

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    let auth = AuthClient::new(&config)?;
    let store = SessionStore::new(&config.session_path);

    match flag {
        Some("--sign-in") => {
            let session = auth.sign_in().await?;
            store.save(&session)?;
            println!("Signed in as {}", session.user.display_name());
            return Ok(());
        }
        Some("--sign-out") => {
            if let Some(session) = store.load()? {
                if let Err(e) = auth.sign_out(&session).await {
                    tracing::warn!("Remote sign-out failed: {}", e);
                }
            }
            store.clear()?;
            println!("Signed out");
            return Ok(());
        }
        Some("--list") | None => {}
        Some(other) => {
            eprintln!("Unknown argument: {other}");
            eprintln!("Usage: markd [--sign-in | --sign-out | --list]");
            return Ok(());
        }
    }

    let Some(session) = current_session(&auth, &store).await? else {
        println!("Not signed in. Run `markd --sign-in` first.");
        return Ok(());
    };
    let sessions = Arc::new(SessionManager::new(auth, store, session));

    // Headless listing
    if flag == Some("--list") {
        let client = SupabaseClient::new(&config, sessions.clone())?;
        for bookmark in client.fetch_bookmarks(&sessions.user().id).await? {
            println!("{}\t{}\t{}", bookmark.created_label(), bookmark.title, bookmark.url);
        }
        return Ok(());
    }

    // Initialize app
    let mut app = App::new(&config, Arc::clone(&sessions)).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.shutdown().await;

    match result {
        Ok(Exit::SignOut) => {
            sessions.sign_out().await?;
            println!("Signed out");
        }
        Ok(Exit::Quit) => {}
        Err(e) => eprintln!("Error: {}", e),
    }

    Ok(())
}

/// The stored session, refreshed and re-saved when its access token has expired.
async fn current_session(auth: &AuthClient, store: &SessionStore) -> Result<Option<Session>> {
    let Some(session) = store.load()? else {
        return Ok(None);
    };
    if !session.is_expired(Utc::now()) {
        return Ok(Some(session));
    }

    match auth.refresh(&session).await {
        Ok(refreshed) => {
            store.save(&refreshed)?;
            Ok(Some(refreshed))
        }
        Err(AppError::Auth(reason)) => {
            tracing::warn!("Session refresh rejected: {}", reason);
            store.clear()?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<Exit> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Reset expired delete confirmations
        app.tick(Instant::now());

        // Poll for completed inserts and deletes
        app.poll_mutation_results();

        // Poll for pushed changes
        app.poll_realtime_events();

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = handle_key_event(key, app.mode, app.show_help) {
                        if let Some(exit) = app.handle_action(action)? {
                            return Ok(exit);
                        }
                    }
                }
            }
        }
    }
}
