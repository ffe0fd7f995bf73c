//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a termination
//! signal; [`raise_on_shutdown`] wires that into a [`CancellationSignal`].
//!
//! **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT`. **Other platforms:** Ctrl-C.

use tokio::task::JoinHandle;

use super::CancellationSignal;

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawns a listener that raises `signal` on the first termination signal.
///
/// The listener exits on its own once `signal` is raised by anything else.
pub fn raise_on_shutdown(signal: &CancellationSignal) -> JoinHandle<()> {
    let signal = signal.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal.cancelled() => {}
            res = wait_for_shutdown_signal() => match res {
                Ok(()) => {
                    tracing::info!("termination signal received, raising cancellation");
                    signal.raise();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install termination signal handlers");
                }
            },
        }
    })
}
