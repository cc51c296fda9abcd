//! Shutdown coordination.

use tokio::sync::broadcast;

/// How a stop request treats in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop accepting, drain in-flight requests within the grace period.
    Graceful,
    /// Close everything now.
    Force,
}

impl StopMode {
    pub fn from_force(force: bool) -> Self {
        if force {
            Self::Force
        } else {
            Self::Graceful
        }
    }
}

/// Coordinator for shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<StopMode>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<StopMode> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self, mode: StopMode) {
        let _ = self.tx.send(mode);
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a stop request. A dropped coordinator counts as graceful.
pub async fn recv_stop(rx: &mut broadcast::Receiver<StopMode>) -> StopMode {
    loop {
        match rx.recv().await {
            Ok(mode) => return mode,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return StopMode::Graceful,
        }
    }
}

/// Wait until a forced stop is requested. Pends forever once the coordinator is gone.
pub async fn recv_force(rx: &mut broadcast::Receiver<StopMode>) {
    loop {
        match rx.recv().await {
            Ok(StopMode::Force) => return,
            Ok(StopMode::Graceful) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_mode() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger(StopMode::Force);
        assert_eq!(recv_stop(&mut a).await, StopMode::Force);
        assert_eq!(recv_stop(&mut b).await, StopMode::Force);
    }

    #[tokio::test]
    async fn dropped_coordinator_is_graceful() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        drop(shutdown);
        assert_eq!(recv_stop(&mut rx).await, StopMode::Graceful);
    }

    #[tokio::test]
    async fn force_wait_skips_graceful_requests() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.trigger(StopMode::Graceful);
        shutdown.trigger(StopMode::Force);
        tokio::time::timeout(std::time::Duration::from_secs(1), recv_force(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn force_wait_pends_without_coordinator() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        drop(shutdown);
        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), recv_force(&mut rx)).await;
        assert!(waited.is_err());
    }
}
