//! Error types for the HTTP API, the realtime connection, and frame decoding.

use std::time::Duration;
use tokio_tungstenite::tungstenite;

use crate::protocol::FrameKind;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("backend is unavailable")]
    Unavailable,

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("avatar upload rejected: {0}")]
    UploadRejected(String),

    #[error("response is missing `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    Http(reqwest::Error),
}

impl ApiError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Http(err)
        }
    }

    /// 401/403 from the backend: the session cookie is missing or expired.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == 401 || *status == 403)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to fetch realtime credential: {0}")]
    CredentialFetch(#[source] ApiError),

    #[error("invalid realtime endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("realtime endpoint is unavailable")]
    Unavailable,

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("not connected")]
    NotConnected,

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(tungstenite::Error),
}

impl ClientError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::WebSocket(err)
        }
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: FrameKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{kind}` frame is missing `{field}`")]
    MissingField {
        kind: FrameKind,
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_display() {
        assert_eq!(ApiError::Unavailable.to_string(), "backend is unavailable");
        assert_eq!(
            ClientError::Unavailable.to_string(),
            "realtime endpoint is unavailable"
        );
    }

    #[test]
    fn credential_fetch_wraps_api_error() {
        let err = ClientError::CredentialFetch(ApiError::Status {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(
            err.to_string(),
            "failed to fetch realtime credential: request failed with status 500: boom"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unauthorized_statuses() {
        let unauthorized = ApiError::Status {
            status: 401,
            body: String::new(),
        };
        let forbidden = ApiError::Status {
            status: 403,
            body: String::new(),
        };
        let server = ApiError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(forbidden.is_unauthorized());
        assert!(!server.is_unauthorized());
        assert!(!ApiError::Unavailable.is_unauthorized());
    }

    #[tokio::test]
    async fn from_reqwest_connect_error_yields_unavailable() {
        // Port 1 is reserved and nothing listens on it → guaranteed ConnectionRefused
        let err = reqwest::get("http://127.0.0.1:1/nope").await.unwrap_err();
        assert!(err.is_connect(), "expected a connect error, got: {err}");
        assert!(matches!(ApiError::from_reqwest(err), ApiError::Unavailable));
    }

    #[test]
    fn from_tungstenite_connection_refused() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            ClientError::from_tungstenite(tungstenite::Error::Io(io)),
            ClientError::Unavailable
        ));
    }

    #[test]
    fn from_tungstenite_connection_reset() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            ClientError::from_tungstenite(tungstenite::Error::Io(io)),
            ClientError::Unavailable
        ));
    }

    #[test]
    fn from_tungstenite_other_io_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(
            ClientError::from_tungstenite(tungstenite::Error::Io(io)),
            ClientError::WebSocket(_)
        ));
    }

    #[test]
    fn from_tungstenite_non_io_variant() {
        assert!(matches!(
            ClientError::from_tungstenite(tungstenite::Error::ConnectionClosed),
            ClientError::WebSocket(_)
        ));
    }

    #[test]
    fn frame_error_messages_name_the_kind() {
        let err = FrameError::MissingField {
            kind: FrameKind::FriendDeleted,
            field: "friend_id",
        };
        assert_eq!(err.to_string(), "`friend_deleted` frame is missing `friend_id`");
    }
}
