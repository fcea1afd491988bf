//! Real-time event types exchanged over the socket
//!
//! Outbound traffic is a closed set of [`Event`] variants wrapped in an
//! [`Envelope`] that carries the addressing [`Scope`] and the hub's timestamp.
//! Inbound traffic is limited to the [`ClientFrame`] control vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::user::UserProfile;

/// A chat message as seen by real-time subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    /// Channel the message was posted in; `None` for direct messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    /// Direct-message conversation; `None` for channel messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    /// Parent message when posted in a thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    pub author: UserProfile,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// User presence status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

/// Outbound event, one variant per envelope kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    /// Sent once to a connection right after it is registered
    ConnectionEstablished {
        connection_id: Uuid,
        user: UserProfile,
    },
    MessageSent(ChatMessage),
    MessageEdited(ChatMessage),
    MessageDeleted {
        message_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<i64>,
    },
    StatusChanged {
        user_id: i64,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_text: Option<String>,
    },
    UserTyping {
        user_id: i64,
        username: String,
        channel_id: i64,
        typing: bool,
    },
    Pong,
}

impl Event {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectionEstablished { .. } => "connection_established",
            Event::MessageSent(_) => "message_sent",
            Event::MessageEdited(_) => "message_edited",
            Event::MessageDeleted { .. } => "message_deleted",
            Event::StatusChanged { .. } => "status_changed",
            Event::UserTyping { .. } => "user_typing",
            Event::Pong => "pong",
        }
    }
}

/// Who an envelope is addressed to.
///
/// A user id takes precedence over a channel id, which takes precedence over
/// plain workspace scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub workspace_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Connection that must not receive the envelope (usually its originator)
    #[serde(skip)]
    pub exclude_connection: Option<Uuid>,
}

impl Scope {
    pub fn workspace(workspace_id: i64) -> Self {
        Self {
            workspace_id,
            channel_id: None,
            user_id: None,
            exclude_connection: None,
        }
    }

    pub fn channel(workspace_id: i64, channel_id: i64) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::workspace(workspace_id)
        }
    }

    pub fn user(workspace_id: i64, user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::workspace(workspace_id)
        }
    }

    pub fn excluding(mut self, connection_id: Uuid) -> Self {
        self.exclude_connection = Some(connection_id);
        self
    }
}

/// Fan-out intent submitted to the hub; the hub stamps it into an [`Envelope`]
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRequest {
    pub scope: Scope,
    pub event: Event,
}

impl BroadcastRequest {
    pub fn new(scope: Scope, event: Event) -> Self {
        Self { scope, event }
    }
}

/// A stamped, addressed event as written to the socket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: Event,
    #[serde(flatten)]
    pub scope: Scope,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Stamp an event with the current time
    pub fn stamp(event: Event, scope: Scope) -> Self {
        Self {
            event,
            scope,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Control frames a client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    TypingStart { channel_id: i64 },
    TypingStop { channel_id: i64 },
}
