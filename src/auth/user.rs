use serde::{Deserialize, Serialize};

/// Display snapshot of an authenticated user.
///
/// Carried by every connection and echoed in events; holds no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user identifier
    pub id: i64,
    /// Username for mentions
    pub username: String,
    /// Display name (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar URL (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Creates a profile with only the mandatory fields
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Name to show in typing indicators and notifications
    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// A resolved session: who the caller is and which workspace they are bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub profile: UserProfile,
    pub workspace_id: i64,
}
