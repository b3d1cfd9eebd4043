use tokio::sync::watch;

/// Sending half of a shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub type ShutdownRx = watch::Receiver<()>;

pub enum ShutdownResult<T, I> {
    Ok(T),
    Shutdown(I),
}

impl<T, I> ShutdownResult<T, I> {
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown(_))
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Resolves once a shutdown is signalled on `shutdown_rx`.
///
/// A shutdown sent before this call but not yet observed by `shutdown_rx` resolves immediately.
/// If every sender is dropped without signalling, the future never resolves.
pub async fn shutdown_signalled(shutdown_rx: &mut ShutdownRx) {
    if shutdown_rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Returns `true` if a shutdown was signalled and not yet observed by `shutdown_rx`.
pub fn is_shutdown_pending(shutdown_rx: &ShutdownRx) -> bool {
    shutdown_rx.has_changed().unwrap_or(false)
}
