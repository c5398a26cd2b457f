//! Sample observers used by the CLI.

use std::sync::Arc;
use tracing::{debug, info};
use v2i_core::{SampleEvent, SampleObserver};

/// Writes every sample to the log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl SampleObserver for LoggingObserver {
    fn on_sample(&self, event: &SampleEvent) {
        debug!(
            vehicle = event.vehicle_id,
            lat = event.lat,
            lon = event.lon,
            heading = event.heading_deg,
            speed = event.speed_mps,
            alert = event.alert,
            at_ms = event.at.as_millis() as u64,
            "sample"
        );
    }

    fn on_run_complete(&self) {
        info!("all units finished");
    }

    fn on_teardown(&self) {
        info!("all units finished, exiting");
    }
}

/// Forwards every callback to each inner observer in order.
#[derive(Default, Clone)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn SampleObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn SampleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SampleObserver for FanoutObserver {
    fn on_sample(&self, event: &SampleEvent) {
        for observer in &self.observers {
            observer.on_sample(event);
        }
    }

    fn on_run_complete(&self) {
        for observer in &self.observers {
            observer.on_run_complete();
        }
    }

    fn on_teardown(&self) {
        for observer in &self.observers {
            observer.on_teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use v2i_core::{SampleLog, UnitMode};

    fn event(vehicle_id: i32) -> SampleEvent {
        SampleEvent {
            vehicle_id,
            mode: UnitMode::Scenario,
            heading_deg: 90.0,
            speed_mps: 11.2,
            lat: 39.1,
            lon: -94.6,
            alert: false,
            at: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_fanout_reaches_every_observer() {
        let first = Arc::new(SampleLog::new());
        let second = Arc::new(SampleLog::new());
        let fanout = FanoutObserver::new()
            .with(first.clone())
            .with(Arc::new(LoggingObserver))
            .with(second.clone());
        assert_eq!(fanout.len(), 3);

        fanout.on_sample(&event(7));
        fanout.on_sample(&event(8));
        fanout.on_run_complete();
        fanout.on_teardown();

        for log in [&first, &second] {
            assert_eq!(log.len(), 2);
            assert_eq!(log.for_vehicle(8).len(), 1);
            assert_eq!(log.completions(), 1);
            assert!(log.torn_down());
        }
    }

    #[test]
    fn test_empty_fanout() {
        let fanout = FanoutObserver::new();
        assert!(fanout.is_empty());
        fanout.on_sample(&event(1));
    }
}
