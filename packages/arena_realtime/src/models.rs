//! Account and social data as served by the authentication backend.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type FriendId = u64;

/// A friend entry inside [`UserProfile::friends`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: FriendId,
    pub username: String,
    #[serde(default)]
    pub status: String,
}

/// The `user` object returned by `GET /authentication/users/me/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub friends: Vec<Friend>,
    /// Usernames with a pending request to this user
    #[serde(default)]
    pub pending_friend_requests: Vec<String>,
}

/// Local view of the authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration payload for `POST /authentication/users/`.
#[derive(Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// Notification ids arrive as either numbers or strings depending on the sender.
/// Numbers are kept as sent, so `7` and `7.0` are different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Number(n) => write!(f, "{}", n),
            NotificationId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        NotificationId::Text(s.to_string())
    }
}

impl From<i64> for NotificationId {
    fn from(n: i64) -> Self {
        NotificationId::Number(n.into())
    }
}

/// A pushed notification. Fields other than `id` and `notification_type`
/// are kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Insertion-ordered notifications, unique by id.
#[derive(Debug, Clone, Default)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an entry with the same id is already queued.
    /// Returns whether the notification was added.
    pub fn push(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        self.entries.push(notification);
        true
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.entries.iter().any(|n| &n.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.entries.clone()
    }

    /// Remove one notification (the user dismissed it).
    pub fn dismiss(&mut self, id: &NotificationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| &n.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
