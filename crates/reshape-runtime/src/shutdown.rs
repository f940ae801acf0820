//! Cooperative shutdown signal

use std::future::Future;
use tokio::sync::watch;

/// Sending half of a shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Ask every holder of a [`ShutdownSignal`] to stop
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half, cloned into every unit of work
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

/// Create a connected trigger and signal
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Return `Err(Cancelled)` once shutdown has been requested
    pub fn check(&self) -> crate::Result<()> {
        if self.is_triggered() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless shutdown is requested first
    ///
    /// On shutdown `fut` is dropped without being polled again.
    pub async fn cancellable<F>(&self, fut: F) -> crate::Result<F::Output>
    where
        F: Future,
    {
        self.check()?;
        let mut waiter = self.clone();
        tokio::select! {
            biased;
            _ = waiter.triggered() => Err(crate::Error::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Wait until shutdown is requested
    ///
    /// Pends forever when the trigger has been dropped without firing.
    pub async fn triggered(&mut self) {
        if self.0.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
