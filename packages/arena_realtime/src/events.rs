use crate::models::Notification;
use crate::protocol::FriendStatus;

/// Views the client asks its host to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    LogoutSuccess,
    /// The server ended the session (`disconnected_from_server`).
    ForcedLogout,
}

impl View {
    /// Route of this view in the web frontend.
    pub fn path(self) -> &'static str {
        match self {
            View::LogoutSuccess => "/logout-success",
            View::ForcedLogout => "/forced-logout",
        }
    }
}

/// Broadcast to every subscriber of a [`crate::SessionStore`].
///
/// `FriendsChanged` only says *that* the list changed; subscribers read it
/// back from the session store.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    FriendsChanged,
    NotificationAdded(Notification),
    FriendStatus(FriendStatus),
    Navigate(View),
}
