//! Execution units: one per vehicle (and per clone) replaying its data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    PlaybackUnit<Ctx, Net>                    │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  Ctx: PlaybackContext                                  │  │
//! │  │  • now()   → lap origin and due-time drift correction  │  │
//! │  │  • sleep() → wait until the next sample is due         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │   Timeline   │→ │    codec     │→ │ Net: Transport     │  │
//! │  │ (kinematics) │  │ (3 frames)   │  │ (one association)  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! │             stop flag polled before and after every wait     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scenario units walk the waypoint segments; track units replay recorded
//! points at the spacing of their ticks. Both are generic over the context and
//! transport, so the same code runs against Tokio and UDP in production and
//! against a virtual clock in tests.

use crate::codec::{BasicStatus, BodyStatus, MessageKind, SignalRequest};
use crate::kinematics::{resolution_steps, segments, Sample, Segment, Timeline};
use crate::observer::{SampleEvent, SampleObserver};
use crate::params::{LiveBodyState, Pacing, RunParameters, StopFlag};
use crate::route::VehicleRoute;
use crate::track::{TrackPoint, TrackWindow, TICKS_PER_MILLISECOND};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace, warn};
use v2i_env::{MessageTransport, PlaybackContext};

/// Added to the wire id of signal-request messages.
pub const SIGNAL_REQUEST_ID_OFFSET: i32 = 1000;

/// Added to the wire id of vehicle-body messages.
pub const BODY_STATUS_ID_OFFSET: i32 = 2000;

/// What a unit replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitMode {
    Scenario,
    Track,
}

/// Identity of one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub mode: UnitMode,
    pub vehicle_id: i32,

    /// Always 0 for track units
    pub clone_index: u32,
}

impl UnitDescriptor {
    pub fn scenario(vehicle_id: i32, clone_index: u32) -> Self {
        Self {
            mode: UnitMode::Scenario,
            vehicle_id,
            clone_index,
        }
    }

    pub fn track(vehicle_id: i32) -> Self {
        Self {
            mode: UnitMode::Track,
            vehicle_id,
            clone_index: 0,
        }
    }

    /// Vehicle id carried by basic-status frames.
    pub fn wire_id(&self) -> i32 {
        self.vehicle_id.wrapping_add(self.clone_index as i32)
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            UnitMode::Scenario => write!(f, "scenario-{}#{}", self.vehicle_id, self.clone_index),
            UnitMode::Track => write!(f, "track-{}", self.vehicle_id),
        }
    }
}

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOutcome {
    /// Played everything it had
    Completed,

    /// Left early because stop was requested
    Stopped,

    /// Nothing playable in its data or window
    Skipped,

    /// Ended without reporting (panicked or was dropped)
    Faulted,
}

/// Per-unit counters handed back to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: UnitDescriptor,
    pub outcome: UnitOutcome,
    pub basic_sent: u64,
    pub signal_requests_sent: u64,
    pub body_sent: u64,
    pub send_failures: u64,
    pub laps: u32,
}

impl UnitReport {
    pub fn new(unit: UnitDescriptor) -> Self {
        Self {
            unit,
            outcome: UnitOutcome::Completed,
            basic_sent: 0,
            signal_requests_sent: 0,
            body_sent: 0,
            send_failures: 0,
            laps: 0,
        }
    }

    pub fn faulted(unit: UnitDescriptor) -> Self {
        Self {
            outcome: UnitOutcome::Faulted,
            ..Self::new(unit)
        }
    }
}

/// Vehicle and index of the most recently emitted track point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPoint {
    pub vehicle_id: i32,
    pub index: usize,
}

#[derive(Debug, Default)]
struct LastPointState {
    latest: Option<LastPoint>,
    per_vehicle: HashMap<i32, usize>,
}

/// Last emitted track point, overall and per vehicle.
#[derive(Debug, Default)]
pub struct LastEmitted {
    state: Mutex<LastPointState>,
}

impl LastEmitted {
    pub fn record(&self, vehicle_id: i32, index: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.latest = Some(LastPoint { vehicle_id, index });
            state.per_vehicle.insert(vehicle_id, index);
        }
    }

    pub fn latest(&self) -> Option<LastPoint> {
        self.state.lock().ok().and_then(|s| s.latest)
    }

    pub fn for_vehicle(&self, vehicle_id: i32) -> Option<usize> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.per_vehicle.get(&vehicle_id).copied())
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = LastPointState::default();
        }
    }
}

/// Everything a unit shares with the rest of the run.
#[derive(Clone)]
pub struct UnitShared {
    pub params: Arc<RunParameters>,
    pub stop: StopFlag,
    pub body: Arc<LiveBodyState>,
    pub observer: Arc<dyn SampleObserver>,
    pub last_emitted: Arc<LastEmitted>,
}

/// One independent execution unit.
pub struct PlaybackUnit<Ctx, Net>
where
    Ctx: PlaybackContext,
    Net: MessageTransport,
{
    ctx: Arc<Ctx>,
    transport: Net,
    shared: UnitShared,
    report: UnitReport,
}

impl<Ctx, Net> PlaybackUnit<Ctx, Net>
where
    Ctx: PlaybackContext,
    Net: MessageTransport,
{
    pub fn new(ctx: Arc<Ctx>, transport: Net, unit: UnitDescriptor, shared: UnitShared) -> Self {
        Self {
            ctx,
            transport,
            shared,
            report: UnitReport::new(unit),
        }
    }

    pub fn descriptor(&self) -> UnitDescriptor {
        self.report.unit
    }

    fn stopped(&self) -> bool {
        self.shared.stop.is_requested()
    }

    fn finish(mut self, outcome: UnitOutcome) -> UnitReport {
        self.report.outcome = outcome;
        debug!(
            unit = %self.report.unit,
            ?outcome,
            basic = self.report.basic_sent,
            failures = self.report.send_failures,
            "unit finished"
        );
        self.report
    }

    /// Sleeps until `deadline` in slices of one period, polling stop.
    ///
    /// Returns `false` if stop was requested.
    async fn wait_until(&self, deadline: Duration) -> bool {
        let slice = self.shared.params.period();
        loop {
            if self.stopped() {
                return false;
            }
            let now = self.ctx.now();
            if now >= deadline {
                return true;
            }
            self.ctx.sleep((deadline - now).min(slice)).await;
        }
    }

    async fn wait(&self, duration: Duration) -> bool {
        let deadline = self.ctx.now() + duration;
        self.wait_until(deadline).await
    }

    async fn send(&mut self, kind: MessageKind, frame: &[u8]) -> bool {
        match self.transport.send(frame).await {
            Ok(()) => {
                match kind {
                    MessageKind::BasicStatus => self.report.basic_sent += 1,
                    MessageKind::SignalRequest => self.report.signal_requests_sent += 1,
                    MessageKind::BodyStatus => self.report.body_sent += 1,
                }
                true
            }
            Err(e) => {
                self.report.send_failures += 1;
                warn!(unit = %self.report.unit, ?kind, "send failed: {}", e);
                false
            }
        }
    }

    /// Sends a basic status and notifies the observer if it left.
    async fn emit_basic(&mut self, heading_deg: f64, speed_mps: f64, lat: f64, lon: f64, alert: bool) -> bool {
        let at = self.ctx.now();
        let unit = self.report.unit;
        let frame = BasicStatus {
            vehicle_id: unit.wire_id(),
            heading_deg,
            speed_mps,
            lat,
            lon,
            elevation_m: 0.0,
        }
        .encode();

        let sent = self.send(MessageKind::BasicStatus, &frame).await;
        if sent {
            trace!(unit = %unit, lat, lon, speed_mps, "basic status");
            self.shared.observer.on_sample(&SampleEvent {
                vehicle_id: unit.wire_id(),
                mode: unit.mode,
                heading_deg,
                speed_mps,
                lat,
                lon,
                alert: alert || self.shared.params.alert_all,
                at,
            });
        }
        sent
    }

    /// Basic status plus the auxiliary messages of scenario mode.
    async fn emit_scenario(&mut self, sample: &Sample, with_request: bool) {
        let params = Arc::clone(&self.shared.params);
        let wire_id = self.report.unit.wire_id();
        let (lat, lon) = (sample.position.lat, sample.position.lon);

        self.emit_basic(sample.heading_deg, sample.speed_mps, lat, lon, with_request)
            .await;

        if with_request {
            let frame = SignalRequest {
                vehicle_id: wire_id.wrapping_add(SIGNAL_REQUEST_ID_OFFSET),
                heading_deg: sample.heading_deg,
                speed_mps: sample.speed_mps,
                lat,
                lon,
                role: params.signal_request.role,
            }
            .encode();
            self.send(MessageKind::SignalRequest, &frame).await;
        }

        if params.body_status {
            let frame = BodyStatus {
                vehicle_id: wire_id.wrapping_add(BODY_STATUS_ID_OFFSET),
                speed_mps: sample.speed_mps,
                body: self.shared.body.snapshot(),
                accel_mps2: sample.accel_mps2,
            }
            .encode();
            self.send(MessageKind::BodyStatus, &frame).await;
        }
    }

    /// Replays a scenario route until it ends or stop is requested.
    pub async fn play_scenario(mut self, route: &VehicleRoute) -> UnitReport {
        if !route.is_playable() {
            return self.finish(UnitOutcome::Skipped);
        }

        let delay = route.clone_delay_secs(self.report.unit.clone_index);
        if delay > 0.0 && !self.wait(Duration::from_secs_f64(delay)).await {
            return self.finish(UnitOutcome::Stopped);
        }

        let segments = segments(&route.waypoints);
        let first_pause = route.waypoints[0].pause_secs;
        let params = Arc::clone(&self.shared.params);
        debug!(unit = %self.report.unit, segments = segments.len(), "scenario unit started");

        loop {
            let finished = match params.pacing {
                Pacing::Frequency => self.frequency_lap(&segments, first_pause).await,
                Pacing::Resolution { meters } => self.resolution_lap(&segments, meters).await,
            };
            if !finished {
                return self.finish(UnitOutcome::Stopped);
            }
            self.report.laps += 1;

            if !params.loop_playback {
                return self.finish(UnitOutcome::Completed);
            }
            if self.stopped() {
                return self.finish(UnitOutcome::Stopped);
            }
            if params.pacing == Pacing::Frequency && !self.wait(params.period()).await {
                return self.finish(UnitOutcome::Stopped);
            }
        }
    }

    /// One lap at one sample per period. Returns `false` on stop.
    async fn frequency_lap(&mut self, segments: &[Segment], first_pause_secs: f64) -> bool {
        let params = Arc::clone(&self.shared.params);
        let request = params.signal_request;

        if first_pause_secs > 0.0 && !self.wait(Duration::from_secs_f64(first_pause_secs)).await {
            return false;
        }

        // Seeded so the first basic status carries a signal request
        let mut since_request = request.bsm_per_request;
        let origin = self.ctx.now();

        for timed in Timeline::new(segments, params.period()) {
            if !self.wait_until(origin + timed.due).await {
                return false;
            }

            let with_request = request.enabled && since_request >= request.bsm_per_request;
            if with_request {
                since_request = 0;
            } else {
                since_request = since_request.saturating_add(1);
            }

            self.emit_scenario(&timed.sample, with_request).await;
        }
        true
    }

    /// One lap of legacy resolution pacing. Returns `false` on stop.
    async fn resolution_lap(&mut self, segments: &[Segment], meters: f64) -> bool {
        for (i, segment) in segments.iter().enumerate() {
            for step in resolution_steps(segment, meters, i == 0) {
                if self.stopped() {
                    return false;
                }
                let sent = match step.emit {
                    Some(point) => {
                        self.emit_basic(segment.bearing_deg, segment.v1_mps, point.lat, point.lon, false)
                            .await
                    }
                    None => true,
                };
                // A failed step still waits out its own sleep
                if !step.sleep_after.is_zero() && !self.wait(step.sleep_after).await {
                    return false;
                }
                if !sent {
                    // The rest of this segment is dropped
                    break;
                }
            }
        }
        true
    }

    /// Replays the recorded points inside `window` at the spacing of their ticks.
    pub async fn play_track(mut self, points: &[TrackPoint], window: TrackWindow) -> UnitReport {
        let Some(range) = window.range(points) else {
            return self.finish(UnitOutcome::Skipped);
        };
        if self.stopped() {
            return self.finish(UnitOutcome::Stopped);
        }
        debug!(unit = %self.report.unit, points = range.clone().count(), "track unit started");

        let first_index = *range.start();
        let origin_tick = points[first_index].tick;
        let origin = self.ctx.now();

        for index in range {
            let point = &points[index];
            let offset_ms = ((point.tick - origin_tick) / TICKS_PER_MILLISECOND).max(0) as u64;
            if !self.wait_until(origin + Duration::from_millis(offset_ms)).await {
                return self.finish(UnitOutcome::Stopped);
            }

            self.emit_basic(point.heading_deg, point.speed_mps(), point.lat, point.lon, false)
                .await;
            self.shared.last_emitted.record(point.vehicle_id, index);
        }

        self.report.laps = 1;
        self.finish(UnitOutcome::Completed)
    }
}
