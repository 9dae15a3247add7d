// TUI application state
//
// The app holds no authoritative data: chats, messages and the profile are
// snapshots of resource-cache state, refreshed through subscriptions and
// loader tasks. Service calls never run on the render loop - they are
// spawned, and their outcomes come back as UiEvents over a channel.

use crate::cache::CacheUpdate;
use crate::error::ApiError;
use crate::logging::LogBuffer;
use crate::models::{Chat, Message, User};
use crate::resources::{chats_key, decode_chats, decode_messages, messages_key, ChatService, Navigation};
use crate::search::filter_chats;
use super::input::TextField;
use tokio::sync::mpsc;

/// Number of placeholder rows shown while the chat list resolves.
const PLACEHOLDER_CHATS: usize = 3;

/// Different views the TUI can display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Chats,
    Profile,
}

impl View {
    /// Display name for the status bar
    pub fn name(&self) -> &'static str {
        match self {
            View::Login => "Login",
            View::Chats => "Chats",
            View::Profile => "Profile",
        }
    }
}

/// Focused pane within the Chats view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Search,
    ChatList,
    Composer,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Search => Focus::ChatList,
            Focus::ChatList => Focus::Composer,
            Focus::Composer => Focus::Search,
        }
    }
}

/// Focused field in the login form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

/// Outcome of a spawned service call, delivered back to the event loop.
#[derive(Debug)]
pub enum UiEvent {
    LoggedIn,
    LoginFailed(ApiError),
    ChatsLoaded(Vec<Chat>),
    MessagesLoaded { chat_id: String, messages: Vec<Message> },
    UserLoaded(Option<User>),
    MessageSent(Navigation),
    SendFailed(ApiError),
    LoadFailed(ApiError),
}

/// Main application state for the TUI
pub struct App {
    service: ChatService,
    events_tx: mpsc::UnboundedSender<UiEvent>,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Current view being displayed
    pub view: View,

    /// Focused pane in the Chats view
    pub focus: Focus,

    /// Focused field in the login form
    pub login_field: LoginField,

    /// Latest chat-list snapshot (placeholders until the first fetch lands)
    pub chats: Vec<Chat>,
    chats_loaded: bool,

    /// Messages of the selected chat
    pub messages: Vec<Message>,

    /// The authenticated user's profile, once resolved
    pub user: Option<User>,

    /// Selected chat id, if any
    pub selected_chat: Option<String>,

    /// Cursor into the filtered chat list
    pub chat_cursor: usize,

    /// Set when the message-list subscription must be rebuilt
    resubscribe: bool,

    /// A message post is in flight (composer stays populated)
    pub sending: bool,

    /// Last surfaced error, shown in the status line until the next action
    pub error: Option<String>,

    pub search: TextField,
    pub composer: TextField,
    pub username: TextField,
    pub password: TextField,

    /// Fold case in the fuzzy filter (from config)
    pub case_insensitive_search: bool,

    /// Log buffer for the status line
    pub log_buffer: LogBuffer,
}

impl App {
    pub fn new(
        service: ChatService,
        events_tx: mpsc::UnboundedSender<UiEvent>,
        log_buffer: LogBuffer,
        case_insensitive_search: bool,
    ) -> Self {
        // A restored session lands the user straight in the chat list.
        let authenticated = service.session().is_authenticated();
        let mut app = Self {
            service,
            events_tx,
            should_quit: false,
            view: if authenticated { View::Chats } else { View::Login },
            focus: Focus::ChatList,
            login_field: LoginField::Username,
            chats: (1..=PLACEHOLDER_CHATS)
                .map(|i| Chat::placeholder(i.to_string()))
                .collect(),
            chats_loaded: false,
            messages: Vec::new(),
            user: None,
            selected_chat: None,
            chat_cursor: 0,
            resubscribe: false,
            sending: false,
            error: None,
            search: TextField::new(),
            composer: TextField::new(),
            username: TextField::new(),
            password: TextField::masked(),
            case_insensitive_search,
            log_buffer,
        };
        if authenticated {
            app.spawn_initial_loads();
        }
        app
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    /// Chat list narrowed by the search box, original order preserved.
    pub fn filtered_chats(&self) -> Vec<Chat> {
        filter_chats(&self.chats, self.search.value(), self.case_insensitive_search)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Clamp the cursor into the filtered list.
    pub fn clamped_cursor(&self, filtered_len: usize) -> usize {
        self.chat_cursor.min(filtered_len.saturating_sub(1))
    }

    pub fn move_cursor_up(&mut self) {
        self.chat_cursor = self.chat_cursor.saturating_sub(1);
    }

    pub fn move_cursor_down(&mut self) {
        let len = self.filtered_chats().len();
        if len > 0 && self.chat_cursor < len - 1 {
            self.chat_cursor += 1;
        }
    }

    /// Select the chat under the cursor. Placeholders are not selectable.
    pub fn select_chat_under_cursor(&mut self) {
        let filtered = self.filtered_chats();
        let Some(chat) = filtered.get(self.clamped_cursor(filtered.len())) else {
            return;
        };
        if chat.loading {
            return;
        }
        self.select_chat(chat.id.clone());
    }

    fn select_chat(&mut self, chat_id: String) {
        if self.selected_chat.as_deref() != Some(chat_id.as_str()) {
            self.messages.clear();
        }
        self.selected_chat = Some(chat_id);
        self.resubscribe = true;
        self.focus = Focus::Composer;
    }

    /// Taken by the event loop to rebuild the message subscription. The old
    /// subscription is dropped there, which unregisters it from the cache.
    pub fn take_resubscribe(&mut self) -> bool {
        std::mem::take(&mut self.resubscribe)
    }

    // ── Spawned service calls ────────────────────────────────────────────────
    //
    // Each spawn clones the service handle and the event sender into the
    // task. Send failures on the channel just mean the loop is shutting
    // down, so they are ignored everywhere.

    pub fn spawn_initial_loads(&mut self) {
        self.spawn_load_chats();
        self.spawn_load_user();
    }

    pub fn spawn_load_chats(&self) {
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match service.chats().await {
                Ok(chats) => { let _ = tx.send(UiEvent::ChatsLoaded(chats)); }
                Err(e) => { let _ = tx.send(UiEvent::LoadFailed(e)); }
            }
        });
    }

    pub fn spawn_load_messages(&self, chat_id: String) {
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match service.messages(&chat_id).await {
                Ok(messages) => {
                    let _ = tx.send(UiEvent::MessagesLoaded { chat_id, messages });
                }
                Err(e) => { let _ = tx.send(UiEvent::LoadFailed(e)); }
            }
        });
    }

    pub fn spawn_load_user(&self) {
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match service.current_user().await {
                Ok(user) => { let _ = tx.send(UiEvent::UserLoaded(user)); }
                Err(e) => { let _ = tx.send(UiEvent::LoadFailed(e)); }
            }
        });
    }

    /// Submit the login form. Fields stay populated on failure.
    pub fn spawn_login(&mut self) {
        if self.username.is_empty() || self.password.is_empty() {
            self.error = Some("username and password are required".to_string());
            return;
        }
        self.error = None;
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        let username = self.username.value().to_string();
        let password = self.password.value().to_string();
        tokio::spawn(async move {
            match service.login(&username, &password).await {
                Ok(()) => { let _ = tx.send(UiEvent::LoggedIn); }
                Err(e) => { let _ = tx.send(UiEvent::LoginFailed(e)); }
            }
        });
    }

    /// Post the composer's text to the selected chat. The text is NOT
    /// cleared here - only a successful send clears it, so a failure leaves
    /// it in place for retry.
    pub fn spawn_send_message(&mut self) {
        let Some(chat_id) = self.selected_chat.clone() else {
            return;
        };
        if self.composer.is_empty() || self.sending {
            return;
        }
        self.sending = true;
        self.error = None;
        let service = self.service.clone();
        let tx = self.events_tx.clone();
        let text = self.composer.value().to_string();
        tokio::spawn(async move {
            match service.send_message(&chat_id, &text).await {
                Ok((_, navigation)) => { let _ = tx.send(UiEvent::MessageSent(navigation)); }
                Err(e) => { let _ = tx.send(UiEvent::SendFailed(e)); }
            }
        });
    }

    /// Clear the session and return to the login form.
    pub fn logout(&mut self) {
        self.service.logout();
        self.view = View::Login;
        self.login_field = LoginField::Username;
        self.user = None;
        self.selected_chat = None;
        self.messages.clear();
        self.chats = (1..=PLACEHOLDER_CHATS)
            .map(|i| Chat::placeholder(i.to_string()))
            .collect();
        self.chats_loaded = false;
        self.resubscribe = true; // drops the message subscription
        self.password.clear();
        self.error = None;
    }

    // ── Event application ────────────────────────────────────────────────────

    /// Apply the outcome of a spawned service call.
    pub fn handle_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::LoggedIn => {
                self.view = View::Chats;
                self.focus = Focus::ChatList;
                self.error = None;
                self.password.clear();
                self.spawn_initial_loads();
            }
            UiEvent::LoginFailed(e) => {
                // Form stays populated for retry.
                self.error = Some(e.to_string());
            }
            UiEvent::ChatsLoaded(chats) => {
                self.chats = chats;
                self.chats_loaded = true;
            }
            UiEvent::MessagesLoaded { chat_id, messages } => {
                // A stale load for a previously selected chat is dropped.
                if self.selected_chat.as_deref() == Some(chat_id.as_str()) {
                    self.messages = messages;
                }
            }
            UiEvent::UserLoaded(user) => {
                self.user = user;
            }
            UiEvent::MessageSent(navigation) => {
                self.sending = false;
                self.composer.clear();
                let Navigation::ChatDetail(chat_id) = navigation;
                if self.selected_chat.as_deref() != Some(chat_id.as_str()) {
                    self.select_chat(chat_id);
                }
            }
            UiEvent::SendFailed(e) => {
                self.sending = false;
                // Composer text kept for retry.
                self.error = Some(e.to_string());
            }
            UiEvent::LoadFailed(e) => {
                self.error = Some(e.to_string());
            }
        }
    }

    /// Apply a cache notification: decode the fresh snapshot for the keys
    /// this view is subscribed to.
    pub fn apply_cache_update(&mut self, update: CacheUpdate) {
        let value = match update.result {
            Ok(value) => value,
            Err(e) => {
                self.error = Some(e.to_string());
                return;
            }
        };

        if update.key == chats_key() {
            match decode_chats(&value) {
                Ok(chats) => {
                    self.chats = chats;
                    self.chats_loaded = true;
                }
                Err(e) => self.error = Some(e.to_string()),
            }
            return;
        }

        if let Some(selected) = &self.selected_chat {
            if update.key == messages_key(selected) {
                match decode_messages(&value) {
                    Ok(messages) => self.messages = messages,
                    Err(e) => self.error = Some(e.to_string()),
                }
            }
        }
    }

    /// Username for the status bar, once the profile resolved.
    pub fn status_username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn chats_pending(&self) -> bool {
        !self.chats_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Gateway;
    use crate::cache::ResourceCache;
    use crate::error::ApiError;
    use crate::session::{SessionStore, TokenStorage};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    /// Gateway that always fails; app-state tests never reach the network.
    struct OfflineGateway;

    #[async_trait]
    impl Gateway for OfflineGateway {
        async fn request(
            &self,
            _method: crate::api::Method,
            _path: &str,
            _body: Option<Value>,
        ) -> Result<Value, ApiError> {
            Err(ApiError::Network("offline".to_string()))
        }

        async fn request_form(
            &self,
            _path: &str,
            _fields: &[(&str, &str)],
        ) -> Result<Value, ApiError> {
            Err(ApiError::Network("offline".to_string()))
        }
    }

    fn app() -> (tempfile::TempDir, App, mpsc::UnboundedReceiver<UiEvent>) {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::restore(TokenStorage::new(dir.path().join("session.token")));
        let service = ChatService::new(Arc::new(OfflineGateway), ResourceCache::new(), session);
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(service, tx, LogBuffer::new(), false);
        (dir, app, rx)
    }

    fn chat(id: &str, name: &str) -> Chat {
        Chat {
            id: id.to_string(),
            name: name.to_string(),
            loading: false,
        }
    }

    #[tokio::test]
    async fn test_starts_at_login_without_session() {
        let (_dir, app, _rx) = app();
        assert_eq!(app.view, View::Login);
        // Unresolved chat list renders as placeholders.
        assert!(app.chats_pending());
        assert!(app.chats.iter().all(|c| c.loading));
    }

    #[tokio::test]
    async fn test_placeholders_are_not_selectable() {
        let (_dir, mut app, _rx) = app();
        app.select_chat_under_cursor();
        assert_eq!(app.selected_chat, None);
    }

    #[tokio::test]
    async fn test_selecting_a_chat_requests_resubscription() {
        let (_dir, mut app, _rx) = app();
        app.handle_ui_event(UiEvent::ChatsLoaded(vec![
            chat("42", "newsroom"),
            chat("7", "terminal club"),
        ]));
        assert!(!app.chats_pending());

        app.select_chat_under_cursor();
        assert_eq!(app.selected_chat.as_deref(), Some("42"));
        assert!(app.take_resubscribe());
        // The flag is edge-triggered.
        assert!(!app.take_resubscribe());
    }

    #[tokio::test]
    async fn test_cursor_moves_over_filtered_list() {
        let (_dir, mut app, _rx) = app();
        app.handle_ui_event(UiEvent::ChatsLoaded(vec![
            chat("1", "alpha"),
            chat("2", "beta"),
            chat("3", "nominal"),
        ]));

        // Filter down to two entries and walk past the end.
        for c in "a".chars() {
            app.search.insert(c);
        }
        app.move_cursor_down();
        app.move_cursor_down();
        app.move_cursor_down();
        let filtered = app.filtered_chats();
        assert_eq!(filtered.len(), 3); // "a" is a subsequence of all three
        assert_eq!(app.clamped_cursor(filtered.len()), 2);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_composer_text() {
        let (_dir, mut app, _rx) = app();
        app.selected_chat = Some("42".to_string());
        for c in "hi".chars() {
            app.composer.insert(c);
        }
        app.sending = true;

        app.handle_ui_event(UiEvent::SendFailed(ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        }));

        assert!(!app.sending);
        assert_eq!(app.composer.value(), "hi");
        assert!(app.error.is_some());
    }

    #[tokio::test]
    async fn test_successful_send_clears_composer_and_navigates() {
        let (_dir, mut app, _rx) = app();
        app.selected_chat = Some("42".to_string());
        for c in "hi".chars() {
            app.composer.insert(c);
        }
        app.sending = true;

        app.handle_ui_event(UiEvent::MessageSent(Navigation::ChatDetail("42".to_string())));

        assert!(!app.sending);
        assert!(app.composer.is_empty());
        assert_eq!(app.selected_chat.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_login_failure_keeps_form_populated() {
        let (_dir, mut app, _rx) = app();
        for c in "sarah".chars() {
            app.username.insert(c);
        }
        for c in "hunter2".chars() {
            app.password.insert(c);
        }

        app.handle_ui_event(UiEvent::LoginFailed(ApiError::Status {
            status: 401,
            body: "bad credentials".to_string(),
        }));

        assert_eq!(app.view, View::Login);
        assert_eq!(app.username.value(), "sarah");
        assert_eq!(app.password.value(), "hunter2");
        assert!(app.error.is_some());
    }

    #[tokio::test]
    async fn test_logout_resets_to_login_view() {
        let (_dir, mut app, _rx) = app();
        app.view = View::Profile;
        app.selected_chat = Some("42".to_string());
        app.handle_ui_event(UiEvent::ChatsLoaded(vec![chat("42", "newsroom")]));

        app.logout();

        assert_eq!(app.view, View::Login);
        assert_eq!(app.selected_chat, None);
        assert!(app.chats_pending());
        assert!(!app.service().session().is_authenticated());
    }

    #[tokio::test]
    async fn test_stale_message_load_is_dropped() {
        let (_dir, mut app, _rx) = app();
        app.selected_chat = Some("7".to_string());

        let stale = crate::models::Message {
            id: "m1".to_string(),
            text: "old".to_string(),
            created_at: chrono::Utc::now(),
            user: crate::models::MessageAuthor {
                username: "sarah".to_string(),
            },
        };
        app.handle_ui_event(UiEvent::MessagesLoaded {
            chat_id: "42".to_string(),
            messages: vec![stale],
        });

        // A load for a chat that is no longer selected changes nothing.
        assert!(app.messages.is_empty());
        assert_eq!(app.selected_chat.as_deref(), Some("7"));
    }
}
