//! Frame routing.
//!
//! [`route`] applies one decoded frame to the local friend list and
//! notification queue and reports what happened. It performs no I/O: the
//! follow-up work (reconciling friends with the backend, logging out) is
//! described by [`Routed::effect`] and carried out by the connection task.

use tracing::{debug, info, warn};

use crate::config::ReconcilePolicy;
use crate::events::ClientEvent;
use crate::models::{Friend, FriendId, Notification, NotificationId, NotificationQueue};
use crate::protocol::{FriendStatus, FriendUpdate, InboundFrame};

/// Side effect requested by a routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Re-fetch the authoritative friend list.
    ReconcileFriends,
    /// Log out and send the user to the forced-logout view.
    ForcedLogout,
}

/// Result of routing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    FriendUpdated { friend_id: FriendId, applied: bool },
    FriendRemoved { friend_id: FriendId, removed: bool },
    NotificationQueued(Notification),
    NotificationDuplicate(NotificationId),
    FriendStatus(FriendStatus),
    ForcedDisconnect,
    Unrecognized(String),
}

impl Routed {
    /// Whether local state was mutated.
    pub fn changed_state(&self) -> bool {
        match self {
            Routed::FriendUpdated { applied, .. } => *applied,
            Routed::FriendRemoved { removed, .. } => *removed,
            Routed::NotificationQueued(_) => true,
            _ => false,
        }
    }

    pub fn effect(&self, policy: ReconcilePolicy) -> Option<Effect> {
        match self {
            Routed::FriendUpdated { .. } | Routed::FriendRemoved { .. } => {
                (policy == ReconcilePolicy::EveryDelta).then_some(Effect::ReconcileFriends)
            }
            Routed::ForcedDisconnect => Some(Effect::ForcedLogout),
            _ => None,
        }
    }

    /// Event for subscribers, if any. Navigation for a forced disconnect is
    /// emitted after the logout effect, not here.
    pub fn event(&self) -> Option<ClientEvent> {
        match self {
            Routed::FriendUpdated { applied: true, .. }
            | Routed::FriendRemoved { removed: true, .. } => Some(ClientEvent::FriendsChanged),
            Routed::NotificationQueued(n) => Some(ClientEvent::NotificationAdded(n.clone())),
            Routed::FriendStatus(status) => Some(ClientEvent::FriendStatus(status.clone())),
            _ => None,
        }
    }
}

/// Apply `frame` to local state.
///
/// `friends` is `None` when no profile is loaded; friend frames then leave
/// everything untouched.
pub fn route(
    friends: Option<&mut Vec<Friend>>,
    notifications: &mut NotificationQueue,
    frame: InboundFrame,
) -> Routed {
    match frame {
        InboundFrame::FriendListUserUpdate(update) => {
            let friend_id = update.id;
            let applied = match friends {
                Some(friends) => apply_friend_update(friends, update),
                None => false,
            };
            debug!(friend_id, applied, "friend_list_user_update");
            Routed::FriendUpdated { friend_id, applied }
        }
        InboundFrame::FriendDeleted { friend_id } => {
            let removed = match friends {
                Some(friends) => {
                    let before = friends.len();
                    friends.retain(|f| f.id != friend_id);
                    friends.len() != before
                }
                None => {
                    warn!(friend_id, "friend_deleted received without a loaded profile");
                    false
                }
            };
            if removed {
                info!(friend_id, "friend removed");
            } else {
                warn!(friend_id, "friend_deleted for a friend not in the list");
            }
            Routed::FriendRemoved { friend_id, removed }
        }
        InboundFrame::Notification(notification) => {
            let id = notification.id.clone();
            debug!(
                notification_id = %id,
                kind = notification.notification_type.as_deref().unwrap_or("<none>"),
                "notification"
            );
            if notifications.push(notification.clone()) {
                Routed::NotificationQueued(notification)
            } else {
                debug!(notification_id = %id, "duplicate notification ignored");
                Routed::NotificationDuplicate(id)
            }
        }
        InboundFrame::FriendStatus(status) => {
            info!(
                status = status.status.as_deref().unwrap_or("<none>"),
                friend = ?status.friend,
                "friend_status"
            );
            Routed::FriendStatus(status)
        }
        InboundFrame::DisconnectedFromServer => {
            warn!("server requested disconnect");
            Routed::ForcedDisconnect
        }
        InboundFrame::Unrecognized { kind } => {
            info!(kind = %kind, "unrecognized realtime frame");
            Routed::Unrecognized(kind)
        }
    }
}

fn apply_friend_update(friends: &mut [Friend], update: FriendUpdate) -> bool {
    match friends.iter_mut().find(|f| f.id == update.id) {
        Some(friend) => {
            if let Some(username) = update.username {
                friend.username = username;
            }
            if let Some(status) = update.status {
                friend.status = status;
            }
            true
        }
        None => false,
    }
}
