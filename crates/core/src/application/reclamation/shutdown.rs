// Scheduler stop signal (watch channel)

use tokio::sync::watch;

/// Receiving side, selected on by the reclamation loop
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is signalled or the sender is dropped
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Sending side, owned by the [`ReclamationHandle`](super::ReclamationHandle)
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Request shutdown. Recorded even if the loop already exited.
    pub fn signal(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_after_signal() {
        let (sender, mut token) = shutdown_channel();
        assert!(!token.is_requested());

        sender.signal();
        token.wait().await;
        assert!(token.is_requested());
        assert!(sender.is_signalled());
    }

    #[tokio::test]
    async fn test_wait_returns_when_sender_dropped() {
        let (sender, mut token) = shutdown_channel();
        drop(sender);
        token.wait().await;
        assert!(!token.is_requested());
    }

    #[test]
    fn test_signal_without_receivers_is_kept() {
        let (sender, token) = shutdown_channel();
        drop(token);
        sender.signal();
        assert!(sender.is_signalled());
    }
}
