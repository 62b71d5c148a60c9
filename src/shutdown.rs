use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel the returned token on SIGTERM or SIGINT.
///
/// The CLI races its running batch against this token so an interrupted
/// batch still closes its connections before exiting.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, abandoning batch"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, abandoning batch"),
        }
        cancel.cancel();
    });

    Ok(token)
}
