//! Run parameters, the cooperative stop flag and live body state.

use crate::codec::{BodyState, GearState, TurnSignal};
use crate::track::{validate_sliders, WindowError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use v2i_env::Endpoint;

/// How scenario samples are paced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Pacing {
    /// One sample per base period, positions from the kinematic model.
    Frequency,

    /// Legacy: a fixed number of equally spaced sub-points per segment.
    Resolution { meters: f64 },
}

/// Signal-request settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRequestConfig {
    pub enabled: bool,

    /// Vehicle role code (12 police, 13 fire, 14 ambulance)
    pub role: i32,

    /// Basic-status messages per signal request
    pub bsm_per_request: u32,
}

impl Default for SignalRequestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role: 14,
            bsm_per_request: 10,
        }
    }
}

/// Immutable per-run snapshot handed to every execution unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Receiving infrastructure node
    pub endpoint: Endpoint,

    /// Base sample period in milliseconds
    pub period_ms: u64,

    /// Restart scenario routes after the last waypoint
    pub loop_playback: bool,

    /// Track window slider start (0–100)
    pub window_start: f64,

    /// Track window slider end (0–100)
    pub window_end: f64,

    pub signal_request: SignalRequestConfig,

    /// Send a vehicle-body message with every basic status
    pub body_status: bool,

    /// Flag every sample as an alert for visualization
    pub alert_all: bool,

    pub pacing: Pacing,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            period_ms: 100,
            loop_playback: true,
            window_start: 0.0,
            window_end: 100.0,
            signal_request: SignalRequestConfig::default(),
            body_status: false,
            alert_all: false,
            pacing: Pacing::Frequency,
        }
    }
}

impl RunParameters {
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn with_loop(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.window_start = start;
        self.window_end = end;
        self
    }

    pub fn with_signal_requests(mut self, role: i32, bsm_per_request: u32) -> Self {
        self.signal_request = SignalRequestConfig {
            enabled: true,
            role,
            bsm_per_request,
        };
        self
    }

    pub fn with_body_status(mut self, enabled: bool) -> Self {
        self.body_status = enabled;
        self
    }

    pub fn with_alert_all(mut self, enabled: bool) -> Self {
        self.alert_all = enabled;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// The base period as a `Duration`; never zero.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.max(1))
    }

    /// Checks everything that must hold before any unit starts.
    pub fn validate(&self) -> Result<(), WindowError> {
        validate_sliders(self.window_start, self.window_end)
    }
}

/// Shared cooperative stop request.
///
/// Units poll it; nothing is ever interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Operator-controlled body state read at every body-status emission.
///
/// Unlike [`RunParameters`] this is not snapshotted: edits made during a run
/// show up in the next message.
#[derive(Debug, Default)]
pub struct LiveBodyState {
    gear: AtomicU8,
    turn_signal: AtomicU8,
    flags: AtomicU8,
}

impl LiveBodyState {
    pub fn new(state: BodyState) -> Self {
        let live = Self::default();
        live.set(state);
        live
    }

    pub fn set(&self, state: BodyState) {
        self.gear.store(state.gear as u8, Ordering::Relaxed);
        self.turn_signal.store(state.turn_signal as u8, Ordering::Relaxed);
        self.flags.store(state.flags(), Ordering::Relaxed);
    }

    pub fn set_gear(&self, gear: GearState) {
        self.gear.store(gear as u8, Ordering::Relaxed);
    }

    pub fn set_turn_signal(&self, turn_signal: TurnSignal) {
        self.turn_signal.store(turn_signal as u8, Ordering::Relaxed);
    }

    pub fn set_brake(&self, applied: bool) {
        self.set_flag(BodyState::BRAKE_BIT, applied);
    }

    pub fn set_front_doors(&self, open: bool) {
        self.set_flag(BodyState::FRONT_DOORS_BIT, open);
    }

    pub fn set_rear_doors(&self, open: bool) {
        self.set_flag(BodyState::REAR_DOORS_BIT, open);
    }

    fn set_flag(&self, bit: u8, on: bool) {
        if on {
            self.flags.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> BodyState {
        let flags = self.flags.load(Ordering::Relaxed);
        BodyState {
            gear: GearState::from_code(self.gear.load(Ordering::Relaxed)),
            turn_signal: TurnSignal::from_code(self.turn_signal.load(Ordering::Relaxed)),
            brake_applied: flags & BodyState::BRAKE_BIT != 0,
            front_doors_open: flags & BodyState::FRONT_DOORS_BIT != 0,
            rear_doors_open: flags & BodyState::REAR_DOORS_BIT != 0,
        }
    }
}
