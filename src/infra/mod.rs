//! Infrastructure layer: adapters for config, credential storage, and OS integrations.

pub mod config;
pub mod contracts;
pub mod credential_store;
pub mod credential_watcher;
pub mod error;
pub mod logging;
pub mod secrets;
pub mod shutdown;
pub mod storage_layout;

/// Returns the infra module name for smoke checks.
pub fn module_name() -> &'static str {
    "infra"
}
