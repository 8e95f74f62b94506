//! Shutdown coordination for the gateway.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks wait on [`Shutdown::wait`]; per-exchange work holds a
/// [`Shutdown::child_token`] so it is cancelled along with the server.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// A token cancelled when shutdown triggers, cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_children() {
        let shutdown = Shutdown::new();
        let child = shutdown.child_token();
        let sibling = shutdown.child_token();

        sibling.cancel();
        assert!(!shutdown.is_triggered());
        assert!(!child.is_cancelled());

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        shutdown.trigger();
        shutdown.trigger();

        waiter.await.unwrap();
        assert!(child.is_cancelled());
    }
}
