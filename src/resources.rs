// Resource layer - keyed fetchers, the user resolver, and the mutation flow
//
// Everything the views read goes through the resource cache under a stable
// key derived from the resource's logical identity:
//
//   ["chats"]                          chat list summaries
//   ["chats", chat_id, "messages"]     one chat's messages
//   ["users", "me", fingerprint]       the authenticated user's profile
//
// The profile key carries the session token's fingerprint, so it is never
// reused across different tokens. Writers only know invalidation prefixes,
// not dependent views.

use crate::api::{Gateway, Method};
use crate::cache::{CacheKey, ResourceCache, Subscription};
use crate::error::ApiError;
use crate::models::{
    Chat, ChatCollection, Message, MessageCollection, MessageResponse, TokenPayload, User,
    UserResponse,
};
use crate::session::SessionStore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Cache keys
// ─────────────────────────────────────────────────────────────────────────────

pub fn chats_key() -> CacheKey {
    CacheKey::new(["chats"])
}

pub fn messages_key(chat_id: &str) -> CacheKey {
    CacheKey::new(["chats", chat_id, "messages"])
}

/// Session-scoped profile key. The fingerprint ties the entry to one token.
pub fn current_user_key(fingerprint: &str) -> CacheKey {
    CacheKey::new(["users", "me", fingerprint])
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────────────────────────────

/// Instruction to the view layer after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Show the chat's detail view.
    ChatDetail(String),
}

impl Navigation {
    /// Route string, original-client style.
    pub fn route(&self) -> String {
        match self {
            Navigation::ChatDetail(chat_id) => format!("/chats/{}", chat_id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot decoding
// ─────────────────────────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ApiError> {
    serde_json::from_value(value.clone()).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Decode a cached chat-list snapshot. Used by views on cache updates.
pub fn decode_chats(value: &Value) -> Result<Vec<Chat>, ApiError> {
    decode::<ChatCollection>(value).map(|c| c.chats)
}

/// Decode a cached message-list snapshot.
pub fn decode_messages(value: &Value) -> Result<Vec<Message>, ApiError> {
    decode::<MessageCollection>(value).map(|c| c.messages)
}

// ─────────────────────────────────────────────────────────────────────────────
// The service
// ─────────────────────────────────────────────────────────────────────────────

/// Handle bundling the gateway, cache and session for the view layer.
///
/// Cheap to clone into views and spawned tasks - explicit dependency
/// propagation instead of ambient globals.
#[derive(Clone)]
pub struct ChatService {
    gateway: Arc<dyn Gateway>,
    cache: ResourceCache,
    session: SessionStore,
}

impl ChatService {
    pub fn new(gateway: Arc<dyn Gateway>, cache: ResourceCache, session: SessionStore) -> Self {
        Self {
            gateway,
            cache,
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Chat list, through the cache.
    pub async fn chats(&self) -> Result<Vec<Chat>, ApiError> {
        let gateway = self.gateway.clone();
        let value = self
            .cache
            .get(chats_key(), move || {
                let gateway = gateway.clone();
                async move { gateway.request(Method::GET, "/chats", None).await }
            })
            .await?;
        decode_chats(&value)
    }

    /// One chat's messages, through the cache. The service returns them
    /// ordered by creation time ascending.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        let gateway = self.gateway.clone();
        let path = format!("/chats/{}/messages", chat_id);
        let value = self
            .cache
            .get(messages_key(chat_id), move || {
                let gateway = gateway.clone();
                let path = path.clone();
                async move { gateway.request(Method::GET, &path, None).await }
            })
            .await?;
        decode_messages(&value)
    }

    /// The authenticated user's profile.
    ///
    /// While logged out this resolves to None without any network call.
    /// Once logged in, the profile is fetched once and then served from the
    /// cache under its session-scoped key.
    pub async fn current_user(&self) -> Result<Option<User>, ApiError> {
        let Some(fingerprint) = self.session.fingerprint() else {
            return Ok(None);
        };

        let gateway = self.gateway.clone();
        let value = self
            .cache
            .get(current_user_key(&fingerprint), move || {
                let gateway = gateway.clone();
                async move { gateway.request(Method::GET, "/users/me", None).await }
            })
            .await?;
        decode::<UserResponse>(&value).map(|r| Some(r.user))
    }

    /// Post a message to a chat.
    ///
    /// On success the chat list and the chat's message list are invalidated
    /// (summaries may reorder; the list must show the new entry) and the
    /// caller is told to navigate to the chat's detail view. On failure
    /// nothing is invalidated and the error surfaces to the caller, which
    /// keeps the input text for retry.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
    ) -> Result<(Message, Navigation), ApiError> {
        let path = format!("/chats/{}/messages", chat_id);
        let value = self
            .gateway
            .request(Method::POST, &path, Some(json!({ "text": text })))
            .await?;
        let message = decode::<MessageResponse>(&value)?.message;

        self.cache.invalidate(&chats_key());
        self.cache.invalidate(&messages_key(chat_id));
        tracing::debug!(chat = chat_id, "Message posted, dependent keys invalidated");

        Ok((message, Navigation::ChatDetail(chat_id.to_string())))
    }

    /// Exchange credentials for a token at the service's token endpoint and
    /// hand the payload to the session store.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let value = self
            .gateway
            .request_form(
                "/auth/token",
                &[
                    ("grant_type", "password"),
                    ("username", username),
                    ("password", password),
                ],
            )
            .await?;
        let payload = decode::<TokenPayload>(&value)?;
        self.session.login(&payload);
        Ok(())
    }

    /// Clear the session. Stale profile entries are dropped; their keys are
    /// fingerprint-scoped and will never be reused anyway.
    pub fn logout(&self) {
        self.session.logout();
        self.cache.invalidate(&CacheKey::new(["users", "me"]));
    }

    pub fn subscribe_chats(&self) -> Subscription {
        self.cache.subscribe(chats_key())
    }

    pub fn subscribe_messages(&self, chat_id: &str) -> Subscription {
        self.cache.subscribe(messages_key(chat_id))
    }
}
