use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel `token` on SIGTERM or SIGINT.
///
/// The signal streams are registered before returning, so a signal that
/// arrives right after startup is not missed. The event loop, gRPC server
/// and dashboard all stop when the token fires.
pub fn install_shutdown_handler(token: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
            }
            _ = token.cancelled() => return,
        }

        token.cancel();
    });

    Ok(())
}
