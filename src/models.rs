// Data model for the chat service
//
// These mirror the wire shapes of the Pony Express API: collections arrive
// wrapped in an envelope with a `meta.count`, timestamps are ISO-8601 in
// snake_case fields, and messages carry their author inline. Using serde
// derives keeps the decode layer declarative; unknown fields the service
// adds (owner, email on message authors, ...) are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat summary as it appears in listings. No message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,

    /// Marker for synthetic placeholder entries shown while the chat list
    /// has not resolved yet. Never sent by the service.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loading: bool,
}

impl Chat {
    /// Synthetic placeholder entry for an unresolved chat list.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "loading...".to_string(),
            loading: true,
        }
    }
}

/// Message author, inline on every message. The service sends the full user
/// record here; only the username is needed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub username: String,
}

/// A message, always scoped to exactly one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Author of the message (wire field is `user`).
    pub user: MessageAuthor,
}

/// The authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Collection envelope metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub count: usize,
}

/// `GET /chats` response. Chats arrive sorted by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCollection {
    pub meta: Meta,
    pub chats: Vec<Chat>,
}

/// `GET /chats/{id}/messages` response. Messages arrive sorted by
/// `created_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCollection {
    pub meta: Meta,
    pub messages: Vec<Message>,
}

/// `GET /users/me` response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

/// `POST /chats/{id}/messages` response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

/// Token payload returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_collection_decode() {
        let json = r#"{
            "meta": {"count": 2},
            "chats": [
                {"id": "660", "name": "terminal club"},
                {"id": "717", "name": "newsroom"}
            ]
        }"#;

        let collection: ChatCollection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.meta.count, 2);
        assert_eq!(collection.chats[0].name, "terminal club");
        assert!(!collection.chats[0].loading);
    }

    #[test]
    fn test_message_decode_ignores_extra_author_fields() {
        // The service inlines the full user record on messages; only the
        // username is modeled.
        let json = r#"{
            "meta": {"count": 1},
            "messages": [{
                "id": "m1",
                "text": "hi",
                "chat_id": "42",
                "created_at": "2024-03-01T12:30:00Z",
                "user": {
                    "id": "u9",
                    "username": "sarah",
                    "email": "sarah@example.com",
                    "created_at": "2023-01-01T00:00:00Z"
                }
            }]
        }"#;

        let collection: MessageCollection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.messages[0].user.username, "sarah");
        assert_eq!(collection.messages[0].text, "hi");
    }

    #[test]
    fn test_placeholder_chat_is_marked() {
        let chat = Chat::placeholder("1");
        assert!(chat.loading);
        assert_eq!(chat.name, "loading...");
    }

    #[test]
    fn test_token_payload_without_type() {
        let payload: TokenPayload =
            serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(payload.access_token, "abc");
        assert_eq!(payload.token_type, "");
    }
}
