use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;

use crate::infra::{config::AppConfig, error::AppError, storage_layout::StorageLayout};

pub struct AppContext {
    pub config: AppConfig,
    _log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, log_guard: Option<WorkerGuard>) -> Self {
        Self {
            config,
            _log_guard: log_guard,
        }
    }

    /// Configured token path, or the default under the storage layout.
    pub fn token_file(&self) -> Result<PathBuf, AppError> {
        if let Some(path) = &self.config.session.token_file {
            return Ok(path.clone());
        }

        let layout = StorageLayout::resolve()?;
        layout.ensure_dirs()?;
        Ok(layout.token_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_token_file_wins_over_layout() {
        let mut config = AppConfig::default();
        config.session.token_file = Some(PathBuf::from("/srv/wxwatch/token.json"));
        let context = AppContext::new(config, None);

        assert_eq!(
            context.token_file().expect("token path should resolve"),
            PathBuf::from("/srv/wxwatch/token.json")
        );
    }
}
