//! Core environment context trait for playback units.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The clock and task interface every execution unit runs against.
///
/// This trait abstracts the "real world" so that the playback scheduler can
/// run both against the wall clock (tokio) and against a virtual clock in
/// deterministic tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` (in `v2i_sim`) - a manually advanced clock
///
/// # Drift correction
///
/// The scheduler never chains relative sleeps. It computes every due time
/// against an origin taken from [`PlaybackContext::now`] and sleeps only the
/// remaining delta, so `now` must be monotonic.
#[async_trait]
pub trait PlaybackContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
