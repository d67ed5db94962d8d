use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{
    AppConfig, DirectoryConfig, DispatchConfig, LogConfig, LoginConfig, RemoteConfig,
    SessionConfig,
};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub session: Option<FileSessionConfig>,
    pub login: Option<FileLoginConfig>,
    pub dispatch: Option<FileDispatchConfig>,
    pub directory: Option<FileDirectoryConfig>,
    pub remote: Option<FileRemoteConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(session) = self.session {
            session.merge_into(&mut config.session);
        }

        if let Some(login) = self.login {
            login.merge_into(&mut config.login);
        }

        if let Some(dispatch) = self.dispatch {
            dispatch.merge_into(&mut config.dispatch);
        }

        if let Some(directory) = self.directory {
            directory.merge_into(&mut config.directory);
        }

        if let Some(remote) = self.remote {
            remote.merge_into(&mut config.remote);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSessionConfig {
    pub token_file: Option<PathBuf>,
    pub hot_reload: Option<bool>,
    pub hot_reload_interval_ms: Option<u64>,
}

impl FileSessionConfig {
    fn merge_into(self, config: &mut SessionConfig) {
        if let Some(token_file) = self.token_file {
            config.token_file = Some(token_file);
        }

        if let Some(hot_reload) = self.hot_reload {
            config.hot_reload = hot_reload;
        }

        if let Some(interval_ms) = self.hot_reload_interval_ms {
            config.hot_reload_interval_ms = interval_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLoginConfig {
    pub challenge_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub expired_retries: Option<u32>,
}

impl FileLoginConfig {
    fn merge_into(self, config: &mut LoginConfig) {
        if let Some(timeout_ms) = self.challenge_timeout_ms {
            config.challenge_timeout_ms = timeout_ms;
        }

        if let Some(interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = interval_ms;
        }

        if let Some(retries) = self.expired_retries {
            config.expired_retries = retries;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDispatchConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl FileDispatchConfig {
    fn merge_into(self, config: &mut DispatchConfig) {
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }

        if let Some(initial_ms) = self.initial_backoff_ms {
            config.initial_backoff_ms = initial_ms;
        }

        if let Some(max_ms) = self.max_backoff_ms {
            config.max_backoff_ms = max_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDirectoryConfig {
    pub include_friends: Option<bool>,
}

impl FileDirectoryConfig {
    fn merge_into(self, config: &mut DirectoryConfig) {
        if let Some(include_friends) = self.include_friends {
            config.include_friends = include_friends;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileRemoteConfig {
    pub replay_file: Option<PathBuf>,
}

impl FileRemoteConfig {
    fn merge_into(self, config: &mut RemoteConfig) {
        if let Some(replay_file) = self.replay_file {
            config.replay_file = Some(replay_file);
        }
    }
}
