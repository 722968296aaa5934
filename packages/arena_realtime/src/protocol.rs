//! Realtime wire format.
//!
//! Inbound frames are JSON objects tagged by a string `type`. Decoding is
//! done in two steps so that an unknown tag is not an error (the frame is
//! surfaced as [`InboundFrame::Unrecognized`]), while a known tag with bad
//! fields is reported as [`FrameError::Malformed`] or
//! [`FrameError::MissingField`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::FrameError;
use crate::models::{FriendId, Notification};

/// Tags of the inbound frames this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    FriendListUserUpdate,
    FriendDeleted,
    Notification,
    FriendStatus,
    DisconnectedFromServer,
}

impl FrameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::FriendListUserUpdate => "friend_list_user_update",
            FrameKind::FriendDeleted => "friend_deleted",
            FrameKind::Notification => "notification",
            FrameKind::FriendStatus => "friend_status",
            FrameKind::DisconnectedFromServer => "disconnected_from_server",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "friend_list_user_update" => Some(FrameKind::FriendListUserUpdate),
            "friend_deleted" => Some(FrameKind::FriendDeleted),
            "notification" => Some(FrameKind::Notification),
            "friend_status" => Some(FrameKind::FriendStatus),
            "disconnected_from_server" => Some(FrameKind::DisconnectedFromServer),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A friend renamed itself or changed presence. Only `id` is required;
/// absent fields keep their local value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FriendUpdate {
    pub id: FriendId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Presence telemetry; both fields are optional on the wire.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FriendStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub friend: Option<Value>,
}

#[derive(Deserialize)]
struct FriendDeletedFields {
    #[serde(default)]
    friend_id: Option<FriendId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    FriendListUserUpdate(FriendUpdate),
    FriendDeleted { friend_id: FriendId },
    Notification(Notification),
    FriendStatus(FriendStatus),
    DisconnectedFromServer,
    /// Any tag not listed in [`FrameKind`]; kept for logging.
    Unrecognized { kind: String },
}

impl InboundFrame {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: Value) -> Result<Self, FrameError> {
        let object = value.as_object_mut().ok_or(FrameError::NotAnObject)?;
        let tag = match object.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(FrameError::MissingType),
        };

        let Some(kind) = FrameKind::from_tag(&tag) else {
            return Ok(InboundFrame::Unrecognized { kind: tag });
        };

        let frame = match kind {
            FrameKind::FriendListUserUpdate => {
                InboundFrame::FriendListUserUpdate(decode(kind, value)?)
            }
            FrameKind::FriendDeleted => {
                let fields: FriendDeletedFields = decode(kind, value)?;
                // Ids start at 1 on the backend; 0 is treated like an absent id.
                match fields.friend_id {
                    Some(friend_id) if friend_id != 0 => InboundFrame::FriendDeleted { friend_id },
                    _ => {
                        return Err(FrameError::MissingField {
                            kind,
                            field: "friend_id",
                        });
                    }
                }
            }
            FrameKind::Notification => InboundFrame::Notification(decode(kind, value)?),
            FrameKind::FriendStatus => InboundFrame::FriendStatus(decode(kind, value)?),
            FrameKind::DisconnectedFromServer => InboundFrame::DisconnectedFromServer,
        };
        Ok(frame)
    }

    pub fn kind(&self) -> Option<FrameKind> {
        match self {
            InboundFrame::FriendListUserUpdate(_) => Some(FrameKind::FriendListUserUpdate),
            InboundFrame::FriendDeleted { .. } => Some(FrameKind::FriendDeleted),
            InboundFrame::Notification(_) => Some(FrameKind::Notification),
            InboundFrame::FriendStatus(_) => Some(FrameKind::FriendStatus),
            InboundFrame::DisconnectedFromServer => Some(FrameKind::DisconnectedFromServer),
            InboundFrame::Unrecognized { .. } => None,
        }
    }
}

fn decode<T: DeserializeOwned>(kind: FrameKind, value: Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|source| FrameError::Malformed { kind, source })
}

/// Frames sent by game views over the same transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    UsePowerUp { slot: u8 },
}

impl OutboundFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
