//! Realtime connection lifecycle.
//!
//! [`ConnectionManager`] owns at most one live connection. Each connection
//! is driven by a single task that reads frames in order, routes them, and
//! runs their effects before reading the next one, so frames of one
//! connection are never handled concurrently. Cancelling the connection's
//! token is the only way to stop it; frames still in flight are dropped.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{RealtimeConfig, ReconcilePolicy};
use crate::error::ClientError;
use crate::events::{ClientEvent, View};
use crate::models::{Notification, NotificationId, NotificationQueue};
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::router::{self, Effect};
use crate::session::SessionStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path of the realtime endpoint on the backend host.
pub const REALTIME_PATH: &str = "/ws/authentication/";

const OUTBOUND_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// What [`ConnectionManager::ensure_connected`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Connected,
    AlreadyConnected,
    NotAuthenticated,
}

/// Build `{ws|wss}://{host}:{port}/ws/authentication/?token={token}` from
/// the page origin. The secure scheme is used iff the origin is `https`.
pub fn realtime_url(origin: &Url, port: u16, token: &str) -> Result<Url, ClientError> {
    let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
    let host = origin
        .host_str()
        .ok_or(ClientError::InvalidEndpoint(url::ParseError::EmptyHost))?;
    let mut url = Url::parse(&format!("{scheme}://{host}:{port}{REALTIME_PATH}"))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

struct Connection {
    id: u64,
    outbound: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything the connection task needs; cloned into it on spawn.
#[derive(Clone)]
struct FrameHandler {
    session: SessionStore,
    notifications: Arc<RwLock<NotificationQueue>>,
    reconcile: ReconcilePolicy,
}

impl FrameHandler {
    async fn handle_text(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping realtime frame");
                return;
            }
        };

        let routed = {
            let mut notifications = self.notifications.write().await;
            self.session
                .with_friends_mut(|friends| router::route(friends, &mut notifications, frame))
                .await
        };

        if let Some(event) = routed.event() {
            self.session.emit(event);
        }
        if let Some(effect) = routed.effect(self.reconcile) {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::ReconcileFriends => {
                if let Err(e) = self.session.refresh_friends().await {
                    warn!(error = %e, "friend list reconciliation failed");
                }
            }
            Effect::ForcedLogout => {
                if let Err(e) = self.session.logout().await {
                    error!(error = %e, "logout after server disconnect failed");
                    // The server already ended the session; drop it locally too.
                    self.session.clear().await;
                }
                self.session.emit(ClientEvent::Navigate(View::ForcedLogout));
            }
        }
    }
}

pub struct ConnectionManager {
    session: SessionStore,
    config: RealtimeConfig,
    notifications: Arc<RwLock<NotificationQueue>>,
    state: watch::Sender<ConnectionState>,
    current: Option<Connection>,
    next_id: u64,
}

impl ConnectionManager {
    pub fn new(session: SessionStore, config: RealtimeConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            session,
            config,
            notifications: Arc::new(RwLock::new(NotificationQueue::new())),
            state,
            current: None,
            next_id: 1,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_some() && self.state() != ConnectionState::Closed
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.to_vec()
    }

    pub async fn dismiss_notification(&self, id: &NotificationId) -> bool {
        self.notifications.write().await.dismiss(id)
    }

    pub async fn clear_notifications(&self) {
        self.notifications.write().await.clear();
    }

    /// Open the realtime connection unless one is live or the session is
    /// not authenticated.
    pub async fn ensure_connected(&mut self) -> Result<EnsureOutcome, ClientError> {
        if self.is_connected() {
            return Ok(EnsureOutcome::AlreadyConnected);
        }
        if !self.session.is_authenticated() {
            debug!("not authenticated; skipping realtime connection");
            return Ok(EnsureOutcome::NotAuthenticated);
        }

        // A remotely closed connection leaves its handle behind.
        self.reap().await;

        self.state.send_replace(ConnectionState::Connecting);
        let ws = match self.handshake().await {
            Ok(ws) => ws,
            Err(e) => {
                self.state.send_replace(ConnectionState::Closed);
                return Err(e);
            }
        };

        // Open is published before the task runs; the task owns the move to Closed.
        self.state.send_replace(ConnectionState::Open);
        self.session.emit(ClientEvent::Connected);
        let connection = self.spawn_connection(ws);
        info!(connection_id = connection.id, "realtime connection open");
        self.current = Some(connection);
        Ok(EnsureOutcome::Connected)
    }

    async fn handshake(&self) -> Result<WsStream, ClientError> {
        let token = match self.session.api().access_token().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "failed to fetch realtime credential");
                if e.is_unauthorized() {
                    // The backend no longer recognises the session.
                    self.session.clear().await;
                }
                return Err(ClientError::CredentialFetch(e));
            }
        };

        let url = realtime_url(self.session.api().origin(), self.config.port, &token)?;
        debug!(
            host = url.host_str().unwrap_or_default(),
            port = self.config.port,
            "connecting to realtime endpoint"
        );

        let connect = tokio_tungstenite::connect_async(url.as_str());
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => {
                warn!(error = %e, "realtime handshake failed");
                Err(ClientError::from_tungstenite(e))
            }
            Err(_) => {
                warn!(timeout = ?self.config.connect_timeout, "realtime handshake timed out");
                Err(ClientError::ConnectTimeout(self.config.connect_timeout))
            }
        }
    }

    fn spawn_connection(&mut self, ws: WsStream) -> Connection {
        let id = self.next_id;
        self.next_id += 1;

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let handler = FrameHandler {
            session: self.session.clone(),
            notifications: self.notifications.clone(),
            reconcile: self.config.reconcile,
        };
        let task = tokio::spawn(drive_connection(
            id,
            ws,
            handler,
            outbound_rx,
            cancel.clone(),
            self.state.clone(),
        ));

        Connection {
            id,
            outbound,
            cancel,
            task,
        }
    }

    /// Queue a frame on the live connection.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), ClientError> {
        match &self.current {
            Some(connection) if self.is_connected() => connection
                .outbound
                .send(frame)
                .await
                .map_err(|_| ClientError::NotConnected),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Close the current connection (if any) and wait for its task to end.
    pub async fn teardown(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.cancel.cancel();
            if let Err(e) = connection.task.await {
                warn!(connection_id = connection.id, error = %e, "connection task ended abnormally");
            }
            info!(connection_id = connection.id, "realtime connection torn down");
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    /// Drop a handle whose task has already finished.
    async fn reap(&mut self) {
        if self.current.is_some() && !self.is_connected() {
            self.teardown().await;
        }
    }

    /// Follow the session: connect when it becomes authenticated, tear
    /// down when it stops being authenticated, and stop on `shutdown`.
    ///
    /// A connection closed by the server is not reopened until the next
    /// authentication.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut auth = self.session.subscribe_auth();
        let mut reconcile_timer = self.config.reconcile_interval.map(|period| {
            tokio::time::interval_at(Instant::now() + period, period)
        });

        let authenticated = *auth.borrow_and_update();
        self.follow_auth(authenticated).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let authenticated = *auth.borrow_and_update();
                    self.follow_auth(authenticated).await;
                }
                _ = next_tick(&mut reconcile_timer) => {
                    if self.session.is_authenticated() {
                        if let Err(e) = self.session.refresh_friends().await {
                            warn!(error = %e, "periodic friend reconciliation failed");
                        }
                    }
                }
            }
        }

        self.teardown().await;
        debug!("connection supervisor stopped");
    }

    async fn follow_auth(&mut self, authenticated: bool) {
        if authenticated {
            if let Err(e) = self.ensure_connected().await {
                warn!(error = %e, "realtime connection attempt failed");
            }
        } else {
            self.teardown().await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(connection) = &self.current {
            connection.cancel.cancel();
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn drive_connection(
    id: u64,
    ws: WsStream,
    handler: FrameHandler,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
) {
    let (mut ws_write, mut ws_read) = ws.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush frames queued before the close was requested.
                while let Ok(frame) = outbound_rx.try_recv() {
                    if send_frame(&mut ws_write, &frame).await.is_err() {
                        break;
                    }
                }
                let _ = ws_write.send(Message::Close(None)).await;
                break;
            }
            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = send_frame(&mut ws_write, &frame).await {
                    warn!(connection_id = id, error = %e, "failed to send realtime frame");
                    break;
                }
            }
            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => handler.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection_id = id, ?frame, "server closed realtime connection");
                    break;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(connection_id = id, len = data.len(), "ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection_id = id, error = %e, "realtime connection error");
                    break;
                }
                None => break,
            }
        }
    }

    info!(connection_id = id, "realtime connection closed");
    state.send_replace(ConnectionState::Closed);
    handler.session.emit(ClientEvent::Disconnected);
}

async fn send_frame(
    sink: &mut SplitSink<WsStream, Message>,
    frame: &OutboundFrame,
) -> Result<(), ClientError> {
    let text = frame.to_text()?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(ClientError::from_tungstenite)
}
