use tokio::sync::{mpsc, Mutex};

/// A wakeup with at most one pending instance.
///
/// Backed by a one-slot channel: raising while a wakeup is already queued
/// finds the slot full and does nothing, so a slow event loop never
/// accumulates a backlog. It only learns that the event happened at least
/// once since it last looked.
#[derive(Debug)]
pub struct Signal {
    tx: mpsc::Sender<()>,
    rx: Mutex<mpsc::Receiver<()>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queue a wakeup unless one is already pending.
    pub fn raise(&self) {
        // Full means a wakeup is already queued. Closed cannot happen while
        // `self` owns the receiver.
        let _ = self.tx.try_send(());
    }

    /// Consume a pending wakeup without waiting.
    ///
    /// Returns false if nothing is pending or a waiter currently holds the
    /// receiver; that waiter will consume the wakeup instead.
    pub fn take(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }

    /// Drop a wakeup raised before the caller's current context.
    pub fn clear(&self) {
        while self.take() {}
    }

    /// Wait until a wakeup is pending, then consume it.
    pub async fn wait(&self) {
        let mut rx = self.rx.lock().await;
        // `self.tx` keeps the channel open, so `recv` only returns `Some`.
        let _ = rx.recv().await;
    }
}
