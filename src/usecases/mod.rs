//! Use case layer: login, contact resolution, and event dispatch workflows.

pub mod bootstrap;
pub mod bot;
pub mod contact_directory;
pub mod context;
pub mod contracts;
pub mod dispatch;
pub mod hot_login;
pub mod logout;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
