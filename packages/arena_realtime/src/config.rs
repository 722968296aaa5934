use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [realtime]
//                    port = 8080
//
//   env var:         ARENA_REALTIME__PORT=8080   (double underscore = nesting)

/// When to re-fetch the authoritative friend list after a pushed delta.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Re-fetch after every friend frame.
    #[default]
    EveryDelta,
    /// Trust pushed deltas; re-fetch on a timer.
    Periodic,
    Never,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub realtime: RealtimeFileConfig,
}

/// HTTP backend settings (lives under `[backend]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Origin the frontend is served from. `https` here means `wss` for
    /// the realtime endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Realtime tunables (lives under `[realtime]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealtimeFileConfig {
    #[serde(default = "default_realtime_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub reconcile: ReconcilePolicy,
    /// Only used with `reconcile = "periodic"`; 0 disables the timer.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for RealtimeFileConfig {
    fn default() -> Self {
        Self {
            port: default_realtime_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            event_capacity: default_event_capacity(),
            reconcile: ReconcilePolicy::default(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_realtime_port() -> u16 {
    8080
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_event_capacity() -> usize {
    256
}
fn default_reconcile_interval_secs() -> u64 {
    60
}

/// Build a figment that layers: defaults → config.toml → ARENA_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `ARENA_BACKEND__BASE_URL=https://arena.example`  →  `backend.base_url`
///   `ARENA_REALTIME__RECONCILE=periodic`  →  `realtime.reconcile`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_toml_path(data_dir)))
        .merge(Env::prefixed("ARENA_").split("__"))
}

/// `~/.arena`, or `None` when there is no home directory.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".arena"))
}

pub fn config_toml_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

// =============================================================================
// Runtime view
// =============================================================================

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub port: u16,
    pub connect_timeout: Duration,
    pub event_capacity: usize,
    pub reconcile: ReconcilePolicy,
    /// Set only for the periodic policy with a non-zero interval
    pub reconcile_interval: Option<Duration>,
}

impl RealtimeConfig {
    pub fn from_file(fc: &RealtimeFileConfig) -> Self {
        let reconcile_interval = match fc.reconcile {
            ReconcilePolicy::Periodic if fc.reconcile_interval_secs > 0 => {
                Some(Duration::from_secs(fc.reconcile_interval_secs))
            }
            _ => None,
        };
        Self {
            port: fc.port,
            connect_timeout: Duration::from_secs(fc.connect_timeout_secs),
            // tokio's broadcast channel panics on zero capacity
            event_capacity: fc.event_capacity.max(1),
            reconcile: fc.reconcile,
            reconcile_interval,
        }
    }
}
