//! Visualization callbacks.
//!
//! The engine reports every emitted basic-status sample to an injected
//! [`SampleObserver`]. Observers are called from the execution units' hot
//! loop and must return quickly.

use crate::playback::UnitMode;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// One emitted basic-status sample as seen by the visualization layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    /// Wire vehicle id (clone index included)
    pub vehicle_id: i32,
    pub mode: UnitMode,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub lat: f64,
    pub lon: f64,

    /// Draw the vehicle in the alert style
    pub alert: bool,

    /// Context time at emission
    pub at: Duration,
}

/// Receives samples and run lifecycle notifications.
pub trait SampleObserver: Send + Sync {
    /// Called once per successfully sent basic-status message.
    fn on_sample(&self, event: &SampleEvent);

    /// The last unit finished; live state can be cleared.
    fn on_run_complete(&self) {}

    /// The last unit finished after an exit request.
    fn on_teardown(&self) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SampleObserver for NullObserver {
    fn on_sample(&self, _event: &SampleEvent) {}
}

/// Keeps every sample in memory.
#[derive(Debug, Default)]
pub struct SampleLog {
    events: Mutex<Vec<SampleEvent>>,
    completions: Mutex<u32>,
    teardowns: Mutex<u32>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all samples so far, in arrival order.
    pub fn events(&self) -> Vec<SampleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Samples of one wire vehicle id.
    pub fn for_vehicle(&self, vehicle_id: i32) -> Vec<SampleEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.vehicle_id == vehicle_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times a run completed normally.
    pub fn completions(&self) -> u32 {
        self.completions.lock().map(|c| *c).unwrap_or(0)
    }

    /// How many times teardown was signalled.
    pub fn teardowns(&self) -> u32 {
        self.teardowns.lock().map(|t| *t).unwrap_or(0)
    }

    pub fn torn_down(&self) -> bool {
        self.teardowns() > 0
    }
}

impl SampleObserver for SampleLog {
    fn on_sample(&self, event: &SampleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(*event);
        }
    }

    fn on_run_complete(&self) {
        if let Ok(mut completions) = self.completions.lock() {
            *completions += 1;
        }
    }

    fn on_teardown(&self) {
        if let Ok(mut teardowns) = self.teardowns.lock() {
            *teardowns += 1;
        }
    }
}
