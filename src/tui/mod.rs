// TUI module - Terminal User Interface
//
// This module manages the terminal UI using ratatui. It handles:
// - Terminal initialization and cleanup
// - Event loop (keyboard input, timer ticks, cache updates, task results)
// - Dispatching keyboard input to the active view

pub mod app;
pub mod input;
pub mod ui;

use crate::cache::Subscription;
use crate::logging::LogBuffer;
use crate::resources::ChatService;
use anyhow::{Context, Result};
use app::{App, Focus, LoginField, UiEvent, View};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// Run the TUI
///
/// Sets up the terminal, runs the event loop, and restores the terminal when
/// done. Blocks until the user quits.
pub async fn run_tui(
    service: ChatService,
    log_buffer: LogBuffer,
    case_insensitive_search: bool,
) -> Result<()> {
    // Set up terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    // Outcomes of spawned service calls flow back over this channel.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut app = App::new(service, events_tx, log_buffer, case_insensitive_search);

    // Run the event loop
    let result = run_event_loop(&mut terminal, &mut app, events_rx).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

/// Main event loop
///
/// tokio::select! waits on keyboard input, the redraw tick, cache
/// subscription updates, and spawned-task outcomes, responding to whichever
/// completes first.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events_rx: mpsc::UnboundedReceiver<UiEvent>,
) -> Result<()> {
    // The chat-list subscription lives for the whole session; the message
    // subscription follows the selected chat.
    let mut chats_sub = app.service().subscribe_chats();
    let mut messages_sub: Option<Subscription> = None;

    // Periodic redraw tick
    let mut tick_interval = tokio::time::interval(Duration::from_millis(200));

    loop {
        terminal
            .draw(|f| ui::draw(f, app))
            .context("Failed to draw terminal")?;

        tokio::select! {
            // Keyboard input
            _ = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    if let Ok(Event::Key(key_event)) = event::read() {
                        handle_key_event(app, key_event);
                    }
                }
            } => {}

            // Periodic tick for redrawing
            _ = tick_interval.tick() => {}

            // Chat-list cache updates (initial fetch and invalidation refetches)
            Some(update) = chats_sub.changed() => {
                app.apply_cache_update(update);
            }

            // Message-list cache updates for the selected chat
            update = async { messages_sub.as_mut().expect("guarded").changed().await },
                if messages_sub.is_some() =>
            {
                if let Some(update) = update {
                    app.apply_cache_update(update);
                }
            }

            // Outcomes of spawned service calls
            Some(ui_event) = events_rx.recv() => {
                app.handle_ui_event(ui_event);
            }
        }

        // Rebuild the message subscription when the selection changed.
        // Dropping the previous subscription unregisters it; a fetch still
        // in flight for it completes into the cache without being delivered
        // here.
        if app.take_resubscribe() {
            messages_sub = app.selected_chat.clone().map(|chat_id| {
                let sub = app.service().subscribe_messages(&chat_id);
                app.spawn_load_messages(chat_id);
                sub
            });
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle keyboard input: global keys, then the active view.
fn handle_key_event(app: &mut App, key_event: KeyEvent) {
    if key_event.kind != KeyEventKind::Press {
        return;
    }

    // Ctrl-C always quits
    if key_event.modifiers.contains(KeyModifiers::CONTROL)
        && key_event.code == KeyCode::Char('c')
    {
        app.should_quit = true;
        return;
    }

    match app.view {
        View::Login => handle_login_keys(app, key_event),
        View::Chats => handle_chats_keys(app, key_event),
        View::Profile => handle_profile_keys(app, key_event),
    }
}

fn handle_login_keys(app: &mut App, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Tab | KeyCode::Down | KeyCode::Up => {
            app.login_field = match app.login_field {
                LoginField::Username => LoginField::Password,
                LoginField::Password => LoginField::Username,
            };
        }
        KeyCode::Enter => app.spawn_login(),
        KeyCode::Esc => app.should_quit = true,
        code => {
            let field = match app.login_field {
                LoginField::Username => &mut app.username,
                LoginField::Password => &mut app.password,
            };
            edit_field(field, code);
        }
    }
}

fn handle_chats_keys(app: &mut App, key_event: KeyEvent) {
    // View switching first
    match key_event.code {
        KeyCode::F(2) => {
            app.view = View::Profile;
            if app.user.is_none() {
                app.spawn_load_user();
            }
            return;
        }
        KeyCode::Tab => {
            app.focus = app.focus.next();
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Search => match key_event.code {
            KeyCode::Up => app.move_cursor_up(),
            KeyCode::Down => app.move_cursor_down(),
            KeyCode::Enter => app.select_chat_under_cursor(),
            // Esc clears the filter before anything else
            KeyCode::Esc => app.search.clear(),
            code => edit_field(&mut app.search, code),
        },
        Focus::ChatList => match key_event.code {
            KeyCode::Up | KeyCode::Char('k') => app.move_cursor_up(),
            KeyCode::Down | KeyCode::Char('j') => app.move_cursor_down(),
            KeyCode::Enter => app.select_chat_under_cursor(),
            KeyCode::Char('/') => app.focus = Focus::Search,
            _ => {}
        },
        Focus::Composer => match key_event.code {
            KeyCode::Enter => app.spawn_send_message(),
            KeyCode::Esc => app.focus = Focus::ChatList,
            code => edit_field(&mut app.composer, code),
        },
    }
}

fn handle_profile_keys(app: &mut App, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Char('l') => app.logout(),
        KeyCode::Esc | KeyCode::F(1) => app.view = View::Chats,
        KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

/// Shared single-line editing keys.
fn edit_field(field: &mut input::TextField, code: KeyCode) {
    match code {
        KeyCode::Char(c) => field.insert(c),
        KeyCode::Backspace => field.backspace(),
        KeyCode::Delete => field.delete(),
        KeyCode::Left => field.left(),
        KeyCode::Right => field.right(),
        KeyCode::Home => field.home(),
        KeyCode::End => field.end(),
        _ => {}
    }
}
