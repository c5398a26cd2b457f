//! Production implementations backed by Tokio.

use crate::error::EnvError;
use crate::network::{MessageTransport, TransportFactory};
use crate::types::Endpoint;
use crate::PlaybackContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Production context backed by the Tokio clock.
///
/// Uses `tokio::time::Instant` so that paused-time tests drive the same code
/// path as a real run.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        tokio::spawn(async move {
            future.await;
            debug!(task = %name, "task finished");
        });
    }
}

/// A UDP association to the run's endpoint, created on first use.
///
/// After any send error the socket is dropped so the next send binds and
/// connects a new one.
pub struct UdpTransport {
    endpoint: Endpoint,
    label: String,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Creates an unconnected transport.
    pub fn new(endpoint: Endpoint, label: impl Into<String>) -> Self {
        Self {
            endpoint,
            label: label.into(),
            socket: None,
        }
    }

    async fn connect(&self) -> Result<UdpSocket, EnvError> {
        let authority = self.endpoint.authority();
        let addr = tokio::net::lookup_host(&authority)
            .await
            .map_err(|e| EnvError::unresolvable(&authority, e))?
            .next()
            .ok_or_else(|| EnvError::unresolvable(&authority, "no addresses"))?;

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| EnvError::unresolvable(&authority, e))?;
        socket
            .connect(addr)
            .await
            .map_err(|e| EnvError::unresolvable(&authority, e))?;

        debug!(unit = %self.label, %addr, "UDP association opened");
        Ok(socket)
    }
}

#[async_trait]
impl MessageTransport for UdpTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), EnvError> {
        if self.socket.is_none() {
            match self.connect().await {
                Ok(socket) => self.socket = Some(socket),
                Err(e) => {
                    warn!(unit = %self.label, "UDP connect failed: {}", e);
                    return Err(e);
                }
            }
        }

        let Some(socket) = self.socket.as_ref() else {
            return Err(EnvError::network("socket unavailable"));
        };

        match socket.send(frame).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(unit = %self.label, "UDP send failed, dropping association: {}", e);
                self.socket = None;
                Err(e.into())
            }
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}

/// Opens one [`UdpTransport`] per execution unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    type Transport = UdpTransport;

    fn open(&self, endpoint: &Endpoint, label: &str) -> Self::Transport {
        UdpTransport::new(endpoint.clone(), label)
    }
}
