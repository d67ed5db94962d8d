//! Domain layer: session, contact and event entities.

pub mod contact;
pub mod event;
pub mod session;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
