//! Graceful shutdown for the relay.
//!
//! `main` arms [`Shutdown::on_ctrl_c`]; the server and the test harness
//! hold receivers from [`Shutdown::subscribe`] and stop accepting once it fires.

use tokio::sync::broadcast;

/// Broadcasts a single stop signal to every subscriber.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Returns how many subscribers were told.
    pub fn trigger(&self) -> usize {
        match self.tx.send(()) {
            Ok(listeners) => listeners,
            Err(_) => {
                tracing::debug!("Shutdown triggered with no subscribers");
                0
            }
        }
    }

    /// Wait for Ctrl-C, then fire the signal.
    pub async fn on_ctrl_c(&self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await?;
        let listeners = self.trigger();
        tracing::info!(listeners, "Ctrl-C received, draining in-flight requests");
        Ok(())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
