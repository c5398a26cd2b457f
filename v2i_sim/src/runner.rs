//! Offline replay runner.
//!
//! Plays every unit of a run against its own virtual clock and a recording
//! transport, one after another. Nothing touches the network and no real
//! time passes, so a run with a given seed always produces the same frames.

use crate::context::SimContext;
use crate::network::{FrameLog, LinkConditions, SimTransport, SimTransportFactory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use v2i_core::{
    CoordinatorError, LastEmitted, LiveBodyState, MessageKind, NullObserver, PlaybackUnit, RunId, RunInput,
    RunParameters, RunSummary, SampleObserver, StopFlag, UnitDescriptor, UnitShared,
};
use v2i_env::{PlaybackContext, TransportFactory};

/// Results from an offline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Seed used for link loss
    pub seed: u64,

    /// Latest virtual time reached by any unit, in seconds
    pub final_time_secs: f64,

    pub summary: RunSummary,

    /// Metrics collected from the recorded frames
    pub metrics: SimulationMetrics,
}

/// Metrics collected from the recorded frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    /// Frames that reached the simulated network
    pub frames_delivered: u64,

    /// Frames lost to the loss rate
    pub frames_lost: u64,

    pub basic_frames: u64,
    pub signal_request_frames: u64,
    pub body_frames: u64,

    /// Shortest gap between consecutive basic frames of one unit (ms)
    pub min_interval_ms: u64,

    /// Longest gap between consecutive basic frames of one unit (ms)
    pub max_interval_ms: u64,
}

impl SimulationMetrics {
    fn collect(log: &FrameLog) -> Self {
        let frames = log.frames();
        let mut metrics = Self {
            frames_delivered: frames.len() as u64,
            frames_lost: log.dropped(),
            ..Default::default()
        };

        let mut last_basic: HashMap<&str, Duration> = HashMap::new();
        let mut intervals = Vec::new();
        for frame in &frames {
            match frame.kind {
                Some(MessageKind::BasicStatus) => {
                    metrics.basic_frames += 1;
                    if let Some(previous) = last_basic.insert(frame.unit.as_str(), frame.at) {
                        intervals.push(frame.at.saturating_sub(previous).as_millis() as u64);
                    }
                }
                Some(MessageKind::SignalRequest) => metrics.signal_request_frames += 1,
                Some(MessageKind::BodyStatus) => metrics.body_frames += 1,
                None => {}
            }
        }

        metrics.min_interval_ms = intervals.iter().copied().min().unwrap_or(0);
        metrics.max_interval_ms = intervals.iter().copied().max().unwrap_or(0);
        metrics
    }
}

/// Runs scenarios and track sets offline.
pub struct ReplaySimulator {
    params: Arc<RunParameters>,

    /// Seed for link loss
    seed: u64,

    conditions: LinkConditions,

    /// Virtual time after which each unit is stopped
    max_duration: Duration,

    observer: Arc<dyn SampleObserver>,
    body: Arc<LiveBodyState>,
    log: FrameLog,
}

impl ReplaySimulator {
    /// Creates a simulator with a perfect link and a 60 s horizon.
    pub fn new(params: RunParameters) -> Self {
        Self {
            params: Arc::new(params),
            seed: 0,
            conditions: LinkConditions::default(),
            max_duration: Duration::from_secs(60),
            observer: Arc::new(NullObserver),
            body: Arc::new(LiveBodyState::default()),
            log: FrameLog::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_conditions(mut self, conditions: LinkConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Sets the per-unit horizon.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration = Duration::from_secs_f64(secs.max(0.0));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SampleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Body state reported in vehicle-body frames.
    pub fn body_state(&self) -> Arc<LiveBodyState> {
        Arc::clone(&self.body)
    }

    /// Frames recorded so far, across runs.
    pub fn frame_log(&self) -> FrameLog {
        self.log.clone()
    }

    /// Plays every unit of `input` to completion or to the horizon.
    pub async fn run(&self, input: &RunInput) -> Result<SimulationResult, CoordinatorError> {
        self.params.validate()?;

        let run_id = RunId::new();
        let log = FrameLog::new();
        let last_emitted = Arc::new(LastEmitted::default());
        let mut reports = Vec::new();
        let mut skipped_vehicles = Vec::new();
        let mut final_time = Duration::ZERO;

        info!(
            run = %run_id,
            seed = self.seed,
            horizon_secs = self.max_duration.as_secs_f64(),
            "simulation started"
        );

        match input {
            RunInput::Scenario(route) => {
                for vehicle in route.vehicles() {
                    if !vehicle.is_playable() {
                        skipped_vehicles.push(vehicle.vehicle_id);
                        continue;
                    }
                    for clone_index in 0..=vehicle.clones {
                        let unit = UnitDescriptor::scenario(vehicle.vehicle_id, clone_index);
                        let (playback, ctx) = self.unit(unit, &log, &last_emitted);
                        reports.push(playback.play_scenario(vehicle).await);
                        final_time = final_time.max(ctx.now());
                    }
                }
            }
            RunInput::Tracks(tracks) => {
                let window = tracks.window(self.params.window_start, self.params.window_end)?;
                for vehicle_id in tracks.vehicle_ids() {
                    let Some(points) = tracks.points(vehicle_id).filter(|p| p.len() >= 2) else {
                        skipped_vehicles.push(vehicle_id);
                        continue;
                    };
                    let unit = UnitDescriptor::track(vehicle_id);
                    let (playback, ctx) = self.unit(unit, &log, &last_emitted);
                    reports.push(playback.play_track(points, window).await);
                    final_time = final_time.max(ctx.now());
                }
            }
        }
        self.observer.on_run_complete();

        reports.sort_by_key(|r| (r.unit.vehicle_id, r.unit.clone_index));
        let summary = RunSummary {
            run_id,
            skipped_vehicles,
            reports,
        };
        let metrics = SimulationMetrics::collect(&log);
        for frame in log.frames() {
            self.log.record(frame);
        }

        info!(
            run = %run_id,
            units = summary.reports.len(),
            delivered = metrics.frames_delivered,
            lost = metrics.frames_lost,
            failures = summary.send_failures(),
            "simulation finished"
        );

        Ok(SimulationResult {
            seed: self.seed,
            final_time_secs: final_time.as_secs_f64(),
            summary,
            metrics,
        })
    }

    fn unit(
        &self,
        unit: UnitDescriptor,
        log: &FrameLog,
        last_emitted: &Arc<LastEmitted>,
    ) -> (PlaybackUnit<SimContext, SimTransport>, Arc<SimContext>) {
        let stop = StopFlag::new();
        let ctx = Arc::new(SimContext::new().with_horizon(self.max_duration, stop.clone()));
        let factory = SimTransportFactory::new(Arc::clone(&ctx), log.clone(), self.conditions.clone(), self.seed);
        let transport = factory.open(&self.params.endpoint, &unit.to_string());

        let shared = UnitShared {
            params: Arc::clone(&self.params),
            stop,
            body: Arc::clone(&self.body),
            observer: Arc::clone(&self.observer),
            last_emitted: Arc::clone(last_emitted),
        };
        (PlaybackUnit::new(Arc::clone(&ctx), transport, unit, shared), ctx)
    }
}
