use std::time::Instant;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, Status};
use crate::config::DeletePolicy;
use crate::form::{AddForm, Field};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Bookmark list
            Constraint::Length(1), // Status line
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_bookmark_list(frame, app, chunks[1]);
    render_status(frame, app, chunks[2]);

    if app.mode == InputMode::AddForm {
        render_add_form(frame, &app.form);
    }

    if app.show_help {
        render_help(frame, app.delete_policy());
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" 🔖 Markd ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let count = Paragraph::new(count_label(app.store.len()))
        .style(Style::default().fg(Color::White));
    frame.render_widget(count, halves[0]);

    let user = Line::from(vec![
        Span::styled(
            format!("[{}] ", app.user.initials()),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
        Span::styled(app.user.display_name(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(user).alignment(Alignment::Right), halves[1]);
}

fn count_label(count: usize) -> String {
    match count {
        0 => "Nothing saved yet. Add your first link below.".to_string(),
        1 => "1 saved link".to_string(),
        n => format!("{n} saved links"),
    }
}

fn render_bookmark_list(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.search.is_empty() {
        " Bookmarks ".to_string()
    } else {
        format!(" Bookmarks matching \"{}\" ", app.search)
    };
    let block = Block::default().title(title).borders(Borders::ALL);

    let views = app.visible();
    if views.is_empty() {
        let text = empty_message(&app.search, app.store.is_empty());
        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let now = Instant::now();
    let items: Vec<ListItem> = views
        .iter()
        .map(|view| {
            let bookmark = view.bookmark;
            let (title_style, meta) = if view.is_pending {
                (
                    Style::default().fg(Color::DarkGray),
                    "Saving…".to_string(),
                )
            } else {
                (Style::default().fg(Color::White), bookmark.created_label())
            };

            let mut spans = vec![
                Span::styled(bookmark.title.clone(), title_style),
                Span::styled(
                    format!("  {}", bookmark.domain()),
                    Style::default().fg(Color::Blue),
                ),
                Span::styled(format!("  {meta}"), Style::default().fg(Color::DarkGray)),
            ];
            if app.confirmations.is_confirming(&bookmark.id, now) {
                spans.push(Span::styled(
                    "  Press d again",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ));
            }

            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(Some(app.selected_index));

    frame.render_stateful_widget(list, area, &mut state);
}

fn empty_message(search: &str, collection_empty: bool) -> String {
    if collection_empty {
        "No bookmarks yet\n\nPress a to add your first link".to_string()
    } else {
        format!("No bookmarks match \"{}\"\n\nPress Esc to clear the search", search.trim())
    }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if app.mode == InputMode::Search {
        (format!("/{}_", app.search), Style::default().fg(Color::Yellow))
    } else {
        match app.status() {
            Some(Status::Error(message)) => (message.clone(), Style::default().fg(Color::Red)),
            Some(Status::Info(message)) => (message.clone(), Style::default().fg(Color::Yellow)),
            None => match (app.store.pending_add_count(), app.store.pending_delete_count()) {
                (0, 0) => {
                    let live = if app.is_live() { "● live  " } else { "" };
                    (
                        format!("{live}a:add  d:delete  /:search  o:open  ?:help  q:quit"),
                        Style::default().fg(Color::DarkGray),
                    )
                }
                (0, n) => (format!("Deleting {n}…"), Style::default().fg(Color::DarkGray)),
                (n, _) => (format!("Saving {n}…"), Style::default().fg(Color::DarkGray)),
            },
        }
    };

    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_add_form(frame: &mut Frame, form: &AddForm) {
    let area = centered_rect(60, 50, frame.area());

    let title = if form.is_pending() {
        " Add bookmark (saving…) "
    } else {
        " Add bookmark "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let inner = block.inner(area);

    // Clear the area first
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title input
            Constraint::Length(1), // Title error
            Constraint::Length(3), // URL input
            Constraint::Length(1), // URL error
            Constraint::Min(1),    // Backend error
            Constraint::Length(1), // Hints
        ])
        .split(inner);

    render_field(frame, form, Field::Title, rows[0], rows[1]);
    render_field(frame, form, Field::Url, rows[2], rows[3]);

    if let Some(message) = &form.api_error {
        let paragraph = Paragraph::new(message.as_str())
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, rows[4]);
    }

    let hints = Paragraph::new("Tab:switch field  Enter:save  Esc:close")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(hints, rows[5]);
}

fn render_field(frame: &mut Frame, form: &AddForm, field: Field, input: Rect, error: Rect) {
    let (label, placeholder) = match field {
        Field::Title => (" Title ", "My favorite site"),
        Field::Url => (" URL ", "https://example.com"),
    };
    let focused = form.focus == field;
    let has_error = form.errors.get(field).is_some();

    let border = if has_error {
        Color::Red
    } else if focused {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let block = Block::default()
        .title(label)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

    let value = form.value(field);
    let line = if value.is_empty() && !focused {
        Line::from(Span::styled(placeholder, Style::default().fg(Color::DarkGray)))
    } else if focused && !form.is_pending() {
        Line::from(format!("{value}_"))
    } else {
        Line::from(value.to_string())
    };
    frame.render_widget(Paragraph::new(line).block(block), input);

    if let Some(err) = form.errors.get(field) {
        let paragraph = Paragraph::new(err.to_string()).style(Style::default().fg(Color::Red));
        frame.render_widget(paragraph, error);
    }
}

fn help_lines(policy: DeletePolicy) -> Vec<&'static str> {
    let delete = match policy {
        DeletePolicy::Confirm => "   d        Delete (press twice to confirm)",
        DeletePolicy::Immediate => "   d        Delete immediately",
    };

    vec![
        "",
        " Navigation:",
        "   j / ↓    Move down",
        "   k / ↑    Move up",
        "   < / >    First / last bookmark",
        "",
        " Actions:",
        "   a        Add bookmark",
        "   o        Open in browser",
        delete,
        "   /        Search titles and URLs",
        "   Esc      Clear search",
        "",
        " General:",
        "   ?        Toggle this help",
        "   L        Sign out",
        "   q        Quit",
        "",
        " Press any key to close",
    ]
}

fn render_help(frame: &mut Frame, policy: DeletePolicy) {
    let area = centered_rect(50, 60, frame.area());

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_lines(policy).join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
