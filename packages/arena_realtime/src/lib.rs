//! Arena realtime client
//!
//! Keeps one authenticated realtime connection per session and routes the
//! frames it receives into local social state (friends, notifications).
//!
//! The pieces fit together like this:
//!
//! - [`SessionStore`] wraps the account endpoints and publishes whether the
//!   user is authenticated.
//! - [`ConnectionManager`] follows that flag: it fetches a realtime
//!   credential, opens the socket, and tears it down again on logout.
//! - [`router::route`] applies each decoded [`InboundFrame`] to the friend
//!   list and notification queue, and tells the connection task which
//!   follow-up effect (reconciliation, forced logout) to run.
//!
//! # Example
//!
//! ```no_run
//! use arena_realtime::{ApiClient, ConnectionManager, Credentials, SessionStore};
//! use arena_realtime::config::{BackendConfig, RealtimeConfig, RealtimeFileConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(&BackendConfig::default())?;
//! let realtime = RealtimeConfig::from_file(&RealtimeFileConfig::default());
//! let session = SessionStore::new(api, realtime.event_capacity);
//! let mut events = session.subscribe_events();
//!
//! let manager = ConnectionManager::new(session.clone(), realtime);
//! let shutdown = CancellationToken::new();
//! tokio::spawn(manager.run(shutdown.clone()));
//!
//! session
//!     .login(&Credentials::new("alice", "correct horse battery"))
//!     .await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod models;
pub mod protocol;
pub mod router;
pub mod session;

pub use api::ApiClient;
pub use connection::{ConnectionManager, ConnectionState, EnsureOutcome};
pub use error::{ApiError, ClientError, FrameError};
pub use events::{ClientEvent, View};
pub use models::{
    Credentials, Friend, FriendId, NewUser, Notification, NotificationId, NotificationQueue,
    Session, UserProfile,
};
pub use protocol::{FrameKind, InboundFrame, OutboundFrame};
pub use session::SessionStore;
