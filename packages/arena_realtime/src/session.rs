//! Session store: who is logged in, plus the account operations that change it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::events::{ClientEvent, View};
use crate::models::{Credentials, Friend, NewUser, Session, UserProfile};

struct SessionInner {
    api: ApiClient,
    session: RwLock<Session>,
    authenticated: watch::Sender<bool>,
    events: broadcast::Sender<ClientEvent>,
    last_error: RwLock<Option<String>>,
    avatar_version: AtomicU64,
    nickname_version: AtomicU64,
}

/// Shared handle to the current session. Clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl SessionStore {
    pub fn new(api: ApiClient, event_capacity: usize) -> Self {
        let (authenticated, _) = watch::channel(false);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(SessionInner {
                api,
                session: RwLock::new(Session::default()),
                authenticated,
                events,
                last_error: RwLock::new(None),
                avatar_version: AtomicU64::new(0),
                nickname_version: AtomicU64::new(0),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn is_authenticated(&self) -> bool {
        *self.inner.authenticated.borrow()
    }

    /// Receiver that observes every authenticated/unauthenticated transition.
    pub fn subscribe_auth(&self) -> watch::Receiver<bool> {
        self.inner.authenticated.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Publish an event; having no subscribers is fine.
    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.inner.events.send(event);
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.inner.session.read().await.user.clone()
    }

    pub async fn friends(&self) -> Vec<Friend> {
        self.inner
            .session
            .read()
            .await
            .user
            .as_ref()
            .map(|u| u.friends.clone())
            .unwrap_or_default()
    }

    /// Error from the last failed [`check_auth`](Self::check_auth).
    pub async fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().await.clone()
    }

    async fn set_session(&self, user: Option<UserProfile>) {
        let authenticated = user.is_some();
        {
            let mut session = self.inner.session.write().await;
            session.authenticated = authenticated;
            session.user = user;
        }
        self.inner.authenticated.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        });
    }

    /// Load the current user from the backend. Any failure leaves the
    /// session unauthenticated.
    pub async fn check_auth(&self) -> bool {
        match self.inner.api.me().await {
            Ok(user) => {
                debug!(user_id = user.id, username = %user.username, "session authenticated");
                self.set_session(Some(user)).await;
                *self.inner.last_error.write().await = None;
                true
            }
            Err(e) => {
                debug!(error = %e, "session check failed");
                self.set_session(None).await;
                *self.inner.last_error.write().await = Some("Authentication failed".to_string());
                false
            }
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        self.inner.api.login(credentials).await?;
        if !self.check_auth().await {
            return Err(ApiError::MissingField("user"));
        }
        info!(username = %credentials.username, "login complete");
        Ok(())
    }

    /// Log out on the backend, then clear local state.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.inner.api.logout().await?;
        self.set_session(None).await;
        info!("logged out");
        self.emit(ClientEvent::Navigate(View::LogoutSuccess));
        Ok(())
    }

    /// Drop local session state without contacting the backend.
    pub async fn clear(&self) {
        self.set_session(None).await;
    }

    pub async fn register(&self, new_user: &NewUser) -> Result<(), ApiError> {
        self.inner.api.register(new_user).await?;
        info!(username = %new_user.username, "account registered");
        Ok(())
    }

    /// Apply a change to the loaded profile. Returns false when none is loaded.
    pub async fn update_user<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut UserProfile),
    {
        match self.inner.session.write().await.user.as_mut() {
            Some(user) => {
                f(user);
                true
            }
            None => false,
        }
    }

    /// Run `f` with the friend list under the session lock.
    pub(crate) async fn with_friends_mut<R>(&self, f: impl FnOnce(Option<&mut Vec<Friend>>) -> R) -> R {
        let mut session = self.inner.session.write().await;
        f(session.user.as_mut().map(|u| &mut u.friends))
    }

    /// Replace the local friend list with the backend's.
    pub async fn refresh_friends(&self) -> Result<(), ApiError> {
        let fresh = self.inner.api.me().await?;
        let updated = self.update_user(|user| user.friends = fresh.friends).await;
        if updated {
            debug!("friend list reconciled");
            self.emit(ClientEvent::FriendsChanged);
        } else {
            warn!("friend list fetched but no profile is loaded");
        }
        Ok(())
    }

    /// Upload an avatar and point the profile at the new image.
    pub async fn upload_avatar(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        self.inner.api.upload_avatar(file_name, bytes).await?;
        let avatar_url = self.inner.api.avatar_url().await?;
        let stored = avatar_url.clone();
        self.update_user(move |user| user.avatar_url = Some(stored))
            .await;
        self.bump_avatar_version();
        Ok(avatar_url)
    }

    pub fn bump_avatar_version(&self) -> u64 {
        self.inner.avatar_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn bump_nickname_version(&self) -> u64 {
        self.inner.nickname_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn nickname_version(&self) -> u64 {
        self.inner.nickname_version.load(Ordering::Relaxed)
    }

    /// Avatar URL with a version suffix so caches fetch the new image.
    pub async fn avatar_url(&self) -> Option<String> {
        let version = self.inner.avatar_version.load(Ordering::Relaxed);
        self.inner
            .session
            .read()
            .await
            .user
            .as_ref()
            .and_then(|u| u.avatar_url.as_ref())
            .map(|url| format!("{}?v={}", url, version))
    }
}
