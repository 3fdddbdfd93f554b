//! Endpoint lifecycle shared by publishers and subscribers.
//!
//! Every endpoint walks `Created -> Started -> Stopped`. `Stopped` is
//! terminal. The running resources (listener task, peer tasks, shutdown
//! sender) only exist while the endpoint is `Started`.

use crate::error::EzmqError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::debug;

/// Which side of the connection an endpoint is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Binds and sends
    Publisher,
    /// Connects and receives
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Observable endpoint state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// Constructed, not yet started
    Created,
    /// Running; I/O is allowed
    Started,
    /// Stopped for good
    Stopped,
}

/// Resources owned by a started endpoint
#[async_trait]
pub(crate) trait Running: Sized + Send + Sync + 'static {
    /// Signal every task and wait for all of them to finish
    async fn shutdown(self);
}

/// Lifecycle phase together with the running resources
pub(crate) enum Phase<R> {
    Created,
    Started(R),
    Stopped,
}

impl<R> Phase<R> {
    pub(crate) fn state(&self) -> EndpointState {
        match self {
            Phase::Created => EndpointState::Created,
            Phase::Started(_) => EndpointState::Started,
            Phase::Stopped => EndpointState::Stopped,
        }
    }

    /// Running resources, or `NotStarted`
    pub(crate) fn running(&self) -> Result<&R, EzmqError> {
        match self {
            Phase::Started(running) => Ok(running),
            _ => Err(EzmqError::NotStarted),
        }
    }

    pub(crate) fn running_mut(&mut self) -> Result<&mut R, EzmqError> {
        match self {
            Phase::Started(running) => Ok(running),
            _ => Err(EzmqError::NotStarted),
        }
    }
}

/// State machine guarding an endpoint's running resources
pub(crate) struct Lifecycle<R> {
    role: Role,
    phase: Mutex<Phase<R>>,
}

impl<R: Running> Lifecycle<R> {
    pub(crate) fn new(role: Role) -> Self {
        Self {
            role,
            phase: Mutex::new(Phase::Created),
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) async fn state(&self) -> EndpointState {
        self.phase.lock().await.state()
    }

    /// Run `start` and keep its resources, if the endpoint was never started
    pub(crate) async fn start<F, Fut>(&self, start: F) -> Result<(), EzmqError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, EzmqError>>,
    {
        let mut phase = self.phase.lock().await;
        match *phase {
            Phase::Created => {}
            Phase::Started(_) => return Err(EzmqError::AlreadyStarted),
            Phase::Stopped => return Err(EzmqError::AlreadyStopped),
        }

        *phase = Phase::Started(start().await?);
        debug!("{} endpoint started", self.role);
        Ok(())
    }

    /// Move to `Stopped` and tear the running resources down
    pub(crate) async fn stop(&self) -> Result<(), EzmqError> {
        let running = {
            let mut phase = self.phase.lock().await;
            match std::mem::replace(&mut *phase, Phase::Stopped) {
                Phase::Started(running) => running,
                Phase::Created => {
                    *phase = Phase::Created;
                    return Err(EzmqError::NotStarted);
                }
                Phase::Stopped => return Err(EzmqError::AlreadyStopped),
            }
        };

        // Lock released so callers racing with stop see `Stopped` right away
        running.shutdown().await;
        debug!("{} endpoint stopped", self.role);
        Ok(())
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Phase<R>> {
        self.phase.lock().await
    }
}

/// Receiving half of an endpoint's shutdown signal
#[derive(Clone, Debug)]
pub(crate) struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a signal pair; send `true` to trigger
    pub(crate) fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    /// Resolve once shutdown is signalled or the sender is gone
    pub(crate) async fn triggered(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Resources(Arc<AtomicBool>);

    #[async_trait]
    impl Running for Resources {
        async fn shutdown(self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let flag = Arc::new(AtomicBool::new(false));
        let lifecycle = Lifecycle::<Resources>::new(Role::Publisher);
        assert_eq!(lifecycle.state().await, EndpointState::Created);
        assert!(matches!(lifecycle.stop().await, Err(EzmqError::NotStarted)));

        let resources = Resources(flag.clone());
        lifecycle.start(|| async { Ok(resources) }).await.unwrap();
        assert_eq!(lifecycle.state().await, EndpointState::Started);

        let again = lifecycle
            .start(|| async { Ok(Resources(Arc::new(AtomicBool::new(false)))) })
            .await;
        assert!(matches!(again, Err(EzmqError::AlreadyStarted)));

        lifecycle.stop().await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(lifecycle.state().await, EndpointState::Stopped);

        assert!(matches!(lifecycle.stop().await, Err(EzmqError::AlreadyStopped)));
        let restart = lifecycle
            .start(|| async { Ok(Resources(Arc::new(AtomicBool::new(false)))) })
            .await;
        assert!(matches!(restart, Err(EzmqError::AlreadyStopped)));
    }

    #[tokio::test]
    async fn test_failed_start_stays_created() {
        let lifecycle = Lifecycle::<Resources>::new(Role::Publisher);
        let result = lifecycle
            .start(|| async { Err(EzmqError::Error("boom".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(lifecycle.state().await, EndpointState::Created);
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let (tx, mut shutdown) = Shutdown::channel();
        let mut other = shutdown.clone();
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), shutdown.triggered())
                .await
                .is_err()
        );

        tx.send(true).unwrap();
        shutdown.triggered().await;
        drop(tx);
        other.triggered().await;
    }
}
