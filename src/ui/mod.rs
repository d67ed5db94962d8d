//! UI layer: console presentation of dispatched events.

pub mod console;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
