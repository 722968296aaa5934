use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arena_realtime::config::{FileConfig, RealtimeConfig};
use arena_realtime::{
    ApiClient, ClientEvent, ConnectionManager, Credentials, EnsureOutcome, NewUser, OutboundFrame,
    SessionStore, View,
};

/// Username and password from flags or `ARENA_USERNAME`/`ARENA_PASSWORD`.
pub struct Account {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Account {
    fn credentials(&self) -> Result<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
            _ => bail!("--username and --password (or ARENA_USERNAME/ARENA_PASSWORD) are required"),
        }
    }
}

fn session(config: &FileConfig) -> Result<SessionStore> {
    let api = ApiClient::new(&config.backend)
        .with_context(|| format!("bad backend url {:?}", config.backend.base_url))?;
    Ok(SessionStore::new(api, config.realtime.event_capacity.max(1)))
}

async fn logged_in(config: &FileConfig, account: &Account) -> Result<SessionStore> {
    let credentials = account.credentials()?;
    let session = session(config)?;
    session
        .login(&credentials)
        .await
        .with_context(|| format!("login as {} failed", credentials.username))?;
    Ok(session)
}

pub async fn me(config: &FileConfig, account: &Account) -> Result<()> {
    let session = logged_in(config, account).await?;
    let user = session.user().await.context("no profile after login")?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub async fn register(
    config: &FileConfig,
    account: &Account,
    email: String,
    nickname: Option<String>,
) -> Result<()> {
    let credentials = account.credentials()?;
    let new_user = NewUser {
        username: credentials.username.clone(),
        email,
        password: credentials.password,
        nickname,
    };
    session(config)?
        .register(&new_user)
        .await
        .context("registration failed")?;
    println!("registered {}", new_user.username);
    Ok(())
}

pub async fn avatar(config: &FileConfig, account: &Account, file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    let session = logged_in(config, account).await?;
    session
        .upload_avatar(&file_name, bytes)
        .await
        .context("avatar upload failed")?;
    if let Some(url) = session.avatar_url().await {
        println!("{url}");
    }
    Ok(())
}

pub async fn power_up(config: &FileConfig, account: &Account, slot: u8) -> Result<()> {
    let session = logged_in(config, account).await?;
    let mut manager = ConnectionManager::new(session, RealtimeConfig::from_file(&config.realtime));

    match manager.ensure_connected().await? {
        EnsureOutcome::NotAuthenticated => bail!("session is not authenticated"),
        EnsureOutcome::Connected | EnsureOutcome::AlreadyConnected => {}
    }
    manager.send(OutboundFrame::UsePowerUp { slot }).await?;
    manager.teardown().await;
    info!(slot, "power-up sent");
    Ok(())
}

/// Print client events until Ctrl-C or a server-forced logout.
pub async fn watch(config: &FileConfig, account: &Account) -> Result<()> {
    let session = logged_in(config, account).await?;
    let mut events = session.subscribe_events();
    let manager = ConnectionManager::new(session.clone(), RealtimeConfig::from_file(&config.realtime));

    let shutdown = CancellationToken::new();
    let supervisor = tokio::spawn(manager.run(shutdown.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::FriendsChanged) => {
                    println!("{}", serde_json::to_string(&session.friends().await)?);
                }
                Ok(ClientEvent::NotificationAdded(notification)) => {
                    println!("{}", serde_json::to_string(&notification)?);
                }
                Ok(ClientEvent::Navigate(View::ForcedLogout)) => {
                    eprintln!("[arena: logged out by server]");
                    break;
                }
                Ok(other) => println!("{other:?}"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    shutdown.cancel();
    supervisor.await.context("connection supervisor panicked")?;
    Ok(())
}
