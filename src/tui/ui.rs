// Drawing the TUI
//
// Three views: the login form, the chat screen (chat list + search on the
// left, messages + composer on the right), and the profile. The status bar
// and footer are shared. Everything renders from App snapshots; no state
// lives here.

use super::app::{App, Focus, LoginField, View};
use crate::models::Message;
use crate::util::{fit_columns, truncate_utf8_safe};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

const ACCENT: Color = Color::Cyan;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(frame.area());

    draw_status_bar(frame, app, chunks[0]);
    match app.view {
        View::Login => draw_login(frame, app, chunks[1]),
        View::Chats => draw_chats(frame, app, chunks[1]),
        View::Profile => draw_profile(frame, app, chunks[1]),
    }
    draw_footer(frame, app, chunks[2]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Chrome
// ─────────────────────────────────────────────────────────────────────────────

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let identity = match app.status_username() {
        Some(username) => username.to_string(),
        None if app.service().session().is_authenticated() => "...".to_string(),
        None => "not signed in".to_string(),
    };

    let line = Line::from(vec![
        Span::styled(" Pony Express ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::raw(app.view.name()),
        Span::raw(" │ "),
        Span::styled(identity, Style::default().add_modifier(Modifier::ITALIC)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    // An error beats hints beats the last log line.
    let line = if let Some(error) = &app.error {
        // Status bodies can be arbitrarily long; keep the line sane.
        Line::from(Span::styled(
            format!(" {}", truncate_utf8_safe(error, 200)),
            Style::default().fg(Color::Red),
        ))
    } else {
        let hints = match app.view {
            View::Login => " enter sign in · tab switch field · ctrl-c quit",
            View::Chats => " tab focus · enter select/send · F2 profile · ctrl-c quit",
            View::Profile => " l logout · esc back · ctrl-c quit",
        };
        match app.log_buffer.last() {
            Some(entry) => Line::from(vec![
                Span::styled(hints, Style::default().add_modifier(Modifier::DIM)),
                Span::styled(
                    format!(
                        "  {} [{}] {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level,
                        entry.message
                    ),
                    Style::default().add_modifier(Modifier::DIM),
                ),
            ]),
            None => Line::from(Span::styled(
                hints,
                Style::default().add_modifier(Modifier::DIM),
            )),
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn input_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

// ─────────────────────────────────────────────────────────────────────────────
// Login view
// ─────────────────────────────────────────────────────────────────────────────

fn draw_login(frame: &mut Frame, app: &App, area: Rect) {
    let form = centered_rect(46, 9, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .title("sign in");
    let inner = block.inner(form);
    frame.render_widget(block, form);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(0)])
        .split(inner);

    let username_focused = app.login_field == LoginField::Username;
    frame.render_widget(
        Paragraph::new(app.username.display()).block(input_block("username", username_focused)),
        rows[0],
    );
    frame.render_widget(
        Paragraph::new(app.password.display()).block(input_block("password", !username_focused)),
        rows[1],
    );

    let (field, row) = match app.login_field {
        LoginField::Username => (&app.username, rows[0]),
        LoginField::Password => (&app.password, rows[1]),
    };
    frame.set_cursor_position((row.x + 1 + field.cursor_col(), row.y + 1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Chats view
// ─────────────────────────────────────────────────────────────────────────────

fn draw_chats(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)])
        .split(area);

    draw_chat_list(frame, app, columns[0]);
    draw_messages(frame, app, columns[1]);
}

fn draw_chat_list(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    // Search box feeding the fuzzy filter
    let search_focused = app.focus == Focus::Search;
    frame.render_widget(
        Paragraph::new(app.search.display()).block(input_block("search", search_focused)),
        rows[0],
    );
    if search_focused {
        frame.set_cursor_position((rows[0].x + 1 + app.search.cursor_col(), rows[0].y + 1));
    }

    let filtered = app.filtered_chats();
    let width = rows[1].width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = filtered
        .iter()
        .map(|chat| {
            let selected = app.selected_chat.as_deref() == Some(chat.id.as_str());
            let name = fit_columns(&chat.name, width);
            if chat.loading {
                ListItem::new(Span::styled(
                    name,
                    Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
                ))
            } else if selected {
                ListItem::new(Span::styled(
                    format!("» {}", name),
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                ))
            } else {
                ListItem::new(Span::raw(name))
            }
        })
        .collect();

    let list_focused = app.focus == Focus::ChatList;
    let title = if app.chats_pending() { "chats (loading)" } else { "chats" };
    let list = List::new(items)
        .block(input_block(title, list_focused))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if !filtered.is_empty() && list_focused {
        state.select(Some(app.clamped_cursor(filtered.len())));
    }
    frame.render_stateful_widget(list, rows[1], &mut state);
}

fn draw_messages(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    match &app.selected_chat {
        None => {
            frame.render_widget(
                Paragraph::new("Select a Chat")
                    .block(Block::default().borders(Borders::ALL).title("messages"))
                    .wrap(Wrap { trim: true }),
                rows[0],
            );
        }
        Some(_) => {
            let items: Vec<ListItem> = app.messages.iter().map(message_item).collect();
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("messages"));

            // Keep the newest message in view.
            let mut state = ListState::default();
            if !app.messages.is_empty() {
                state.select(Some(app.messages.len() - 1));
            }
            frame.render_stateful_widget(list, rows[0], &mut state);
        }
    }

    let composer_focused = app.focus == Focus::Composer;
    let title = if app.sending { "sending..." } else { "message" };
    frame.render_widget(
        Paragraph::new(app.composer.display()).block(input_block(title, composer_focused)),
        rows[1],
    );
    if composer_focused {
        frame.set_cursor_position((rows[1].x + 1 + app.composer.cursor_col(), rows[1].y + 1));
    }
}

fn message_item(message: &Message) -> ListItem<'static> {
    let header = Line::from(vec![
        Span::styled(
            message.user.username.clone(),
            Style::default().fg(ACCENT),
        ),
        Span::styled(
            format!("  {}", message.created_at.format("%a %b %e %Y - %H:%M:%S")),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ]);
    let text = Line::from(message.text.clone());
    ListItem::new(vec![header, text])
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile view
// ─────────────────────────────────────────────────────────────────────────────

fn draw_profile(frame: &mut Frame, app: &App, area: Rect) {
    let card = centered_rect(50, 8, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .title("details");

    let lines = match &app.user {
        Some(user) => vec![
            detail_line("Username", &user.username),
            detail_line("Email", &user.email),
            detail_line(
                "Member Since",
                &user.created_at.format("%a %b %e %Y").to_string(),
            ),
        ],
        None => vec![Line::from(Span::styled(
            "loading...",
            Style::default().add_modifier(Modifier::DIM | Modifier::ITALIC),
        ))],
    };

    frame.render_widget(Paragraph::new(lines).block(block), card);
}

fn detail_line(label: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:>14}: ", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value.to_string()),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Center a fixed-size rect inside `area`, clamped to fit.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
