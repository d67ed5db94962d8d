use std::{io, thread};

const SHUTDOWN_SIGNAL_RECEIVED: &str = "SHUTDOWN_SIGNAL_RECEIVED";
const SHUTDOWN_LISTENER_FAILED: &str = "SHUTDOWN_LISTENER_FAILED";

/// Runs `on_interrupt` once when the process receives Ctrl-C.
///
/// The listener thread is detached; it dies with the process.
pub fn on_ctrl_c<F>(on_interrupt: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("wxwatch-ctrl-c".to_owned())
        .spawn(move || {
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    tracing::info!(
                        code = SHUTDOWN_SIGNAL_RECEIVED,
                        "interrupt received; stopping after current event"
                    );
                    on_interrupt();
                }
                Err(error) => tracing::warn!(
                    code = SHUTDOWN_LISTENER_FAILED,
                    error = %error,
                    "ctrl-c listener failed; interrupt will terminate abruptly"
                ),
            }
        })?;

    Ok(())
}
