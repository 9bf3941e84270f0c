use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::InputMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    SignOut,
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    OpenInBrowser,
    DeleteBookmark,
    ShowHelp,
    HideHelp,
    // Add form actions
    OpenForm,
    FormChar(char),
    FormBackspace,
    FormNextField,
    FormSubmit,
    FormCancel,
    // Search actions
    StartSearch,
    SearchChar(char),
    SearchBackspace,
    SearchConfirm,
    SearchCancel,
}

pub fn handle_key_event(key: KeyEvent, mode: InputMode, show_help: bool) -> Option<AppAction> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(AppAction::Quit);
    }

    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    match mode {
        InputMode::AddForm => form_key(key),
        InputMode::Search => search_key(key),
        InputMode::Normal => normal_key(key),
    }
}

fn form_key(key: KeyEvent) -> Option<AppAction> {
    match key.code {
        KeyCode::Enter => Some(AppAction::FormSubmit),
        KeyCode::Esc => Some(AppAction::FormCancel),
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            Some(AppAction::FormNextField)
        }
        KeyCode::Backspace => Some(AppAction::FormBackspace),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(AppAction::FormChar(c))
        }
        _ => None,
    }
}

fn search_key(key: KeyEvent) -> Option<AppAction> {
    match key.code {
        KeyCode::Enter => Some(AppAction::SearchConfirm),
        KeyCode::Esc => Some(AppAction::SearchCancel),
        KeyCode::Backspace => Some(AppAction::SearchBackspace),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(AppAction::SearchChar(c))
        }
        _ => None,
    }
}

fn normal_key(key: KeyEvent) -> Option<AppAction> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('L'), _) => Some(AppAction::SignOut),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),
        (KeyCode::Char('<'), _) | (KeyCode::Home, _) => Some(AppAction::MoveToTop),
        (KeyCode::Char('>'), _) | (KeyCode::End, _) => Some(AppAction::MoveToBottom),

        (KeyCode::Enter, _) | (KeyCode::Char('o'), _) => Some(AppAction::OpenInBrowser),
        (KeyCode::Char('d'), KeyModifiers::NONE) | (KeyCode::Delete, _) => {
            Some(AppAction::DeleteBookmark)
        }
        (KeyCode::Char('a'), _) => Some(AppAction::OpenForm),
        (KeyCode::Char('/'), _) => Some(AppAction::StartSearch),
        (KeyCode::Esc, _) => Some(AppAction::SearchCancel),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}
