//! Simulation context implementing PlaybackContext for deterministic replay.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use v2i_core::StopFlag;
use v2i_env::PlaybackContext;

/// Simulation context backed by a virtual clock.
///
/// This implements `PlaybackContext` using:
/// - A virtual clock that only moves when advanced or slept on
/// - Simulated sleep that advances virtual time instantly
/// - An optional horizon after which a stop is requested
///
/// The clock is shared by clones, so one context should drive one unit at a
/// time; concurrent units would each push the same clock forward.
pub struct SimContext {
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Stop requested once virtual time reaches the horizon
    horizon: Option<(Duration, StopFlag)>,
}

impl SimContext {
    /// Creates a context at virtual time zero.
    pub fn new() -> Self {
        Self {
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            horizon: None,
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Requests `stop` once virtual time reaches `horizon`.
    pub fn with_horizon(mut self, horizon: Duration, stop: StopFlag) -> Self {
        self.horizon = Some((horizon, stop));
        self
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let after = self
            .virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst)
            + duration.as_nanos() as u64;

        if let Some((horizon, stop)) = &self.horizon {
            if after >= horizon.as_nanos() as u64 {
                stop.request();
            }
        }
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.virtual_time_ns.store(time_ns, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            horizon: self.horizon.clone(),
        }
    }
}

#[async_trait]
impl PlaybackContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping is just moving the clock
        self.advance_time(duration);
    }

    fn spawn<F>(&self, _name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new();
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        ctx.set_time(42);
        assert_eq!(ctx.time_ns(), 42);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new();
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[tokio::test]
    async fn test_sleep_advances_instantly() {
        let ctx = SimContext::new();
        ctx.sleep(Duration::from_secs(3_600)).await;
        assert_eq!(ctx.now(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_horizon_requests_stop() {
        let stop = StopFlag::new();
        let ctx = SimContext::new().with_horizon(Duration::from_secs(2), stop.clone());

        ctx.advance_time(Duration::from_millis(1_999));
        assert!(!stop.is_requested());

        ctx.advance_time(Duration::from_millis(1));
        assert!(stop.is_requested());
    }
}
