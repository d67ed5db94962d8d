use std::path::Path;

use crate::{
    infra::{self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError},
    usecases::context::AppContext,
};

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config = load_config(config_path)?;
    let log_guard = infra::logging::init(&config.logging)?;

    Ok(AppContext::new(config, log_guard))
}

fn load_config(config_path: Option<&Path>) -> Result<infra::config::AppConfig, AppError> {
    let config_adapter = FileConfigAdapter::new(config_path);
    config_adapter.load().map_err(AppError::Other)
}
