//! Remote collaborators backing the login, contact and transport ports.

pub mod replay;

/// Returns the remote module name for smoke checks.
pub fn module_name() -> &'static str {
    "remote"
}
