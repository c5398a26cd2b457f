//! Outbound transport abstraction for execution units.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::Endpoint;

/// One outbound datagram association owned by a single execution unit.
///
/// # Implementations
///
/// - **Production**: `UdpTransport` - a lazily connected UDP socket
/// - **Simulation**: `SimTransport` (in `v2i_sim`) - records frames, injects faults
///
/// # Failure policy
///
/// A failed send closes the association. The next call to [`send`] creates
/// a fresh one. Delivery is fire-and-forget: `Ok(())` only means the frame
/// left this process.
///
/// [`send`]: MessageTransport::send
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Sends one encoded frame to the run's endpoint.
    ///
    /// # Returns
    /// * `Ok(())` - Frame handed to the network stack
    /// * `Err(EnvError)` - The association was dropped and will be recreated
    async fn send(&mut self, frame: &[u8]) -> Result<(), EnvError>;

    /// The destination every frame is sent to.
    fn endpoint(&self) -> &Endpoint;

    /// Whether an association is currently open.
    fn is_connected(&self) -> bool;
}

/// Creates one transport per execution unit.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: MessageTransport;

    /// Opens a transport for the unit named `label`.
    ///
    /// Opening must not touch the network; associations are created on the
    /// first send.
    fn open(&self, endpoint: &Endpoint, label: &str) -> Self::Transport;
}
