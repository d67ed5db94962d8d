use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub session: SessionConfig,
    pub login: LoginConfig,
    pub dispatch: DispatchConfig,
    pub directory: DirectoryConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Falls back to the storage layout's token file when unset.
    pub token_file: Option<PathBuf>,
    pub hot_reload: bool,
    pub hot_reload_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_file: None,
            hot_reload: true,
            hot_reload_interval_ms: 2_000,
        }
    }
}

impl SessionConfig {
    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginConfig {
    pub challenge_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub expired_retries: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            challenge_timeout_ms: 240_000,
            poll_interval_ms: 25_000,
            expired_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub include_friends: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            include_friends: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RemoteConfig {
    pub replay_file: Option<PathBuf>,
}
