//! In-process fake of the authentication backend: HTTP account endpoints
//! plus the realtime socket, all on one port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arena_realtime::config::{BackendConfig, RealtimeConfig, ReconcilePolicy};
use arena_realtime::{ApiClient, ClientEvent, ConnectionManager, Credentials, Friend, SessionStore, UserProfile};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, oneshot};

pub const PASSWORD: &str = "secret";

#[derive(Default)]
pub struct BackendState {
    pub upgrades: AtomicUsize,
    pub token_requests: AtomicUsize,
    pub me_requests: AtomicUsize,
    pub logouts: AtomicUsize,
    pub logged_in: AtomicBool,
    pub fail_token: AtomicBool,
    pub fail_logout: AtomicBool,
    /// Close each socket right after the queued frames are pushed.
    pub close_after_push: AtomicBool,
    pub profile: Mutex<UserProfile>,
    /// Frames pushed to every socket as soon as it opens.
    pub push_on_connect: Mutex<Vec<String>>,
    /// Text frames received from clients.
    pub received: Mutex<Vec<String>>,
    pub issued_tokens: Mutex<Vec<String>>,
    pub registered: Mutex<Vec<String>>,
    pub avatar_url: Mutex<Option<String>>,
}

impl BackendState {
    pub fn queue_frame(&self, frame: serde_json::Value) {
        self.push_on_connect.lock().unwrap().push(frame.to_string());
    }

    pub fn set_friends(&self, friends: Vec<Friend>) {
        self.profile.lock().unwrap().friends = friends;
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
    _shutdown: oneshot::Sender<()>,
}

impl Backend {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn upgrades(&self) -> usize {
        self.state.upgrades.load(Ordering::SeqCst)
    }

    pub fn me_requests(&self) -> usize {
        self.state.me_requests.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.state.logouts.load(Ordering::SeqCst)
    }
}

pub fn friend(id: u64, username: &str) -> Friend {
    Friend {
        id,
        username: username.to_string(),
        status: "offline".to_string(),
    }
}

pub fn alice() -> UserProfile {
    UserProfile {
        id: 1,
        username: "alice".into(),
        email: "alice@example.com".into(),
        friends: vec![friend(42, "answer"), friend(7, "lucky")],
        ..Default::default()
    }
}

pub async fn spawn_backend() -> Backend {
    let state = Arc::new(BackendState {
        profile: Mutex::new(alice()),
        ..Default::default()
    });

    let app = Router::new()
        .route("/authentication/auth/login/", post(login))
        .route("/authentication/auth/logout/", post(logout))
        .route("/authentication/auth/token/get-access/", get(access_token))
        .route("/authentication/users/me/", get(me))
        .route("/authentication/users/", post(register))
        .route("/authentication/upload-avatar/", post(upload_avatar))
        .route("/authentication/get-avatar/", get(get_avatar))
        .route("/ws/authentication/", get(ws_upgrade))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    Backend {
        addr,
        state,
        _shutdown: tx,
    }
}

pub fn realtime_config(backend: &Backend, reconcile: ReconcilePolicy) -> RealtimeConfig {
    RealtimeConfig {
        port: backend.addr.port(),
        connect_timeout: Duration::from_secs(5),
        event_capacity: 64,
        reconcile,
        reconcile_interval: None,
    }
}

/// Session store and connection manager pointed at `backend`.
pub fn client(backend: &Backend, reconcile: ReconcilePolicy) -> (SessionStore, ConnectionManager) {
    client_with(backend, realtime_config(backend, reconcile))
}

pub fn client_with(backend: &Backend, config: RealtimeConfig) -> (SessionStore, ConnectionManager) {
    let api = ApiClient::new(&BackendConfig {
        base_url: backend.base_url(),
        request_timeout_secs: 5,
    })
    .unwrap();
    let session = SessionStore::new(api, config.event_capacity);
    let manager = ConnectionManager::new(session.clone(), config);
    (session, manager)
}

/// A TCP port that accepts connections but never answers the handshake.
pub async fn spawn_silent_listener() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    port
}

pub async fn log_in(session: &SessionStore) {
    session
        .login(&Credentials::new("alice", PASSWORD))
        .await
        .unwrap();
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<ClientEvent>, mut pred: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `check` until it holds.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

// ── handlers ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<LoginBody>) -> Response {
    let expected = state.profile.lock().unwrap().username.clone();
    if body.username != expected || body.password != PASSWORD {
        return Json(json!({ "message": "Invalid credentials" })).into_response();
    }
    state.logged_in.store(true, Ordering::SeqCst);
    (
        [(header::SET_COOKIE, "sessionid=fake; Path=/")],
        Json(json!({ "message": "Login successful" })),
    )
        .into_response()
}

async fn logout(State(state): State<Arc<BackendState>>) -> Response {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    if state.fail_logout.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "logout broke").into_response();
    }
    state.logged_in.store(false, Ordering::SeqCst);
    Json(json!({ "message": "Logout successful" })).into_response()
}

async fn access_token(State(state): State<Arc<BackendState>>) -> Response {
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    if state.fail_token.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "token service down").into_response();
    }
    if !state.logged_in.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "no session").into_response();
    }
    let token = format!("tok-{n}");
    state.issued_tokens.lock().unwrap().push(token.clone());
    Json(json!({ "token": token })).into_response()
}

async fn me(State(state): State<Arc<BackendState>>) -> Response {
    state.me_requests.fetch_add(1, Ordering::SeqCst);
    if !state.logged_in.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "not logged in").into_response();
    }
    let user = state.profile.lock().unwrap().clone();
    Json(json!({ "user": user })).into_response()
}

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
}

async fn register(State(state): State<Arc<BackendState>>, Json(body): Json<RegisterBody>) -> Response {
    let mut registered = state.registered.lock().unwrap();
    if registered.contains(&body.username) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "username": ["already taken"] })),
        )
            .into_response();
    }
    registered.push(body.username);
    StatusCode::CREATED.into_response()
}

async fn upload_avatar(State(state): State<Arc<BackendState>>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    if !text.contains("name=\"avatar\"") {
        return Json(json!({ "message": "No avatar provided" })).into_response();
    }
    *state.avatar_url.lock().unwrap() = Some("/media/users/1/avatar/new.png".to_string());
    Json(json!({ "message": "Avatar uploaded successfully" })).into_response()
}

async fn get_avatar(State(state): State<Arc<BackendState>>) -> Response {
    let url = state.avatar_url.lock().unwrap().clone();
    Json(json!({ "avatar_url": url })).into_response()
}

async fn ws_upgrade(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let valid = query
        .get("token")
        .is_some_and(|t| state.issued_tokens.lock().unwrap().contains(t));
    if !valid {
        return (StatusCode::FORBIDDEN, "bad token").into_response();
    }
    state.upgrades.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<BackendState>) {
    let frames = state.push_on_connect.lock().unwrap().clone();
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    if state.close_after_push.load(Ordering::SeqCst) {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => state.received.lock().unwrap().push(text.to_string()),
            Message::Close(_) => break,
            _ => {}
        }
    }
}
