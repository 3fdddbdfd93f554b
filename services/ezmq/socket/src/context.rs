//! Messaging context.
//!
//! A [`Context`] is the explicit owner of the engine's configuration and its
//! initialized/terminated status. Publishers and subscribers are created
//! from it and refuse to start once it has been terminated.

use crate::config::EndpointConfig;
use crate::error::EzmqError;
use crate::publisher::Publisher;
use crate::subscriber::{Subscriber, SubscriberHandler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Context status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextStatus {
    /// Created, endpoints cannot be made yet
    Uninitialized,
    /// Ready to create and start endpoints
    Initialized,
    /// Shut down
    Terminated,
}

/// Engine context; cheap to clone
#[derive(Clone)]
pub struct Context {
    config: Arc<EndpointConfig>,
    status: Arc<watch::Sender<ContextStatus>>,
}

impl Context {
    /// New, uninitialized context
    pub fn new(config: EndpointConfig) -> Self {
        let (status, _) = watch::channel(ContextStatus::Uninitialized);
        Self {
            config: Arc::new(config),
            status: Arc::new(status),
        }
    }

    /// Mark the context ready; initializing twice is harmless
    pub fn initialize(&self) -> Result<(), EzmqError> {
        let previous = self.status.send_replace(ContextStatus::Initialized);
        if previous != ContextStatus::Initialized {
            info!("Context initialized");
        }
        Ok(())
    }

    /// Terminate the context.
    ///
    /// Endpoints that are already running keep running until stopped, but
    /// none can be created or started afterwards.
    pub fn terminate(&self) -> Result<(), EzmqError> {
        if self.status() != ContextStatus::Initialized {
            return Err(EzmqError::NotInitialized);
        }
        self.status.send_replace(ContextStatus::Terminated);
        info!("Context terminated");
        Ok(())
    }

    /// Current status
    pub fn status(&self) -> ContextStatus {
        *self.status.borrow()
    }

    /// Endpoint configuration used by every endpoint of this context
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Create a publisher that will listen on `port` (0 picks a free port)
    pub fn publisher(&self, port: u16) -> Result<Publisher, EzmqError> {
        let gate = self.gate()?;
        Ok(Publisher::new(port, self.config().clone(), gate))
    }

    /// Create a subscriber for the publisher at `ip:port`
    pub fn subscriber(
        &self,
        ip: &str,
        port: u16,
        handler: Arc<dyn SubscriberHandler>,
    ) -> Result<Subscriber, EzmqError> {
        if ip.is_empty() {
            return Err(EzmqError::InvalidArgument("empty publisher address".into()));
        }
        let gate = self.gate()?;
        Ok(Subscriber::new(ip, port, handler, self.config().clone(), gate))
    }

    fn gate(&self) -> Result<ContextGate, EzmqError> {
        let gate = ContextGate(self.status.subscribe());
        gate.ensure_initialized()?;
        Ok(gate)
    }
}

/// Endpoint-side view of the context status
#[derive(Clone, Debug)]
pub(crate) struct ContextGate(watch::Receiver<ContextStatus>);

impl ContextGate {
    pub(crate) fn ensure_initialized(&self) -> Result<(), EzmqError> {
        match *self.0.borrow() {
            ContextStatus::Initialized => Ok(()),
            _ => Err(EzmqError::NotInitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::tests::Recorder;

    #[tokio::test]
    async fn test_endpoints_need_initialized_context() {
        let context = Context::new(EndpointConfig::default());
        assert_eq!(context.status(), ContextStatus::Uninitialized);
        assert!(matches!(context.publisher(0), Err(EzmqError::NotInitialized)));
        assert!(matches!(context.terminate(), Err(EzmqError::NotInitialized)));

        context.initialize().unwrap();
        context.initialize().unwrap();
        assert_eq!(context.status(), ContextStatus::Initialized);
        assert!(context.publisher(0).is_ok());

        let (recorder, _rx) = Recorder::new();
        assert!(matches!(
            context.subscriber("", 5562, recorder),
            Err(EzmqError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_terminate_blocks_start() {
        let context = Context::new(EndpointConfig::default());
        context.initialize().unwrap();
        let publisher = context.publisher(0).unwrap();

        context.terminate().unwrap();
        assert_eq!(context.status(), ContextStatus::Terminated);
        assert!(matches!(publisher.start().await, Err(EzmqError::NotInitialized)));
        assert!(matches!(context.publisher(0), Err(EzmqError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_running_endpoint_survives_terminate() {
        let context = Context::new(EndpointConfig::default());
        context.initialize().unwrap();
        let publisher = context.publisher(0).unwrap();
        publisher.start().await.unwrap();

        context.terminate().unwrap();
        assert!(publisher.local_addr().await.is_ok());
        publisher.stop().await.unwrap();
    }
}
