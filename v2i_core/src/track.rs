//! Imported track model and playback-window resolution.
//!
//! Track points carry absolute timestamps in 100 ns ticks. The set remembers
//! the global minimum and maximum tick across all vehicles so that a pair of
//! 0–100 slider positions can be mapped onto an absolute window.

use crate::geo_math::GeoPoint;
use crate::route::MPH_TO_MPS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Timestamp ticks per millisecond (100 ns ticks).
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// A recorded position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub vehicle_id: i32,
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
    pub speed_mph: f64,
    pub tick: i64,
}

impl TrackPoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mph * MPH_TO_MPS
    }
}

/// Invalid playback window.
#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("Window start {start} must be less than window end {end}")]
    StartNotBeforeEnd { start: f64, end: f64 },

    #[error("Slider value {0} outside 0..=100")]
    SliderRange(f64),
}

/// Validates a pair of 0–100 slider positions.
pub fn validate_sliders(start: f64, end: f64) -> Result<(), WindowError> {
    for value in [start, end] {
        if !(0.0..=100.0).contains(&value) {
            return Err(WindowError::SliderRange(value));
        }
    }
    if start >= end {
        return Err(WindowError::StartNotBeforeEnd { start, end });
    }
    Ok(())
}

/// An absolute `[start, end]` tick window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackWindow {
    pub start_tick: i64,
    pub end_tick: i64,
}

impl TrackWindow {
    /// Maps slider positions onto `[min_tick, max_tick]`.
    pub fn from_sliders(min_tick: i64, max_tick: i64, start: f64, end: f64) -> Result<Self, WindowError> {
        validate_sliders(start, end)?;
        let span = (max_tick - min_tick) as f64;
        Ok(Self {
            start_tick: min_tick + (start / 100.0 * span) as i64,
            end_tick: min_tick + (end / 100.0 * span) as i64,
        })
    }

    /// Indices of the points inside the window, both ends inclusive.
    ///
    /// Returns `None` when fewer than two points qualify.
    pub fn range(&self, points: &[TrackPoint]) -> Option<RangeInclusive<usize>> {
        let first = points.iter().position(|p| p.tick >= self.start_tick)?;
        let last = points.iter().rposition(|p| p.tick <= self.end_tick)?;
        (last > first).then_some(first..=last)
    }
}

/// Every imported vehicle's points, each list in tick order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSet {
    vehicles: BTreeMap<i32, Vec<TrackPoint>>,
    min_tick: i64,
    max_tick: i64,
}

impl TrackSet {
    /// Groups points by vehicle and orders each vehicle's points by tick.
    pub fn from_points(points: impl IntoIterator<Item = TrackPoint>) -> Self {
        let mut vehicles: BTreeMap<i32, Vec<TrackPoint>> = BTreeMap::new();
        let mut min_tick = i64::MAX;
        let mut max_tick = i64::MIN;

        for point in points {
            min_tick = min_tick.min(point.tick);
            max_tick = max_tick.max(point.tick);
            vehicles.entry(point.vehicle_id).or_default().push(point);
        }
        for list in vehicles.values_mut() {
            // Stable, so equal ticks keep import order
            list.sort_by_key(|p| p.tick);
        }

        if vehicles.is_empty() {
            return Self::default();
        }
        Self {
            vehicles,
            min_tick,
            max_tick,
        }
    }

    pub fn min_tick(&self) -> i64 {
        self.min_tick
    }

    pub fn max_tick(&self) -> i64 {
        self.max_tick
    }

    pub fn points(&self, vehicle_id: i32) -> Option<&[TrackPoint]> {
        self.vehicles.get(&vehicle_id).map(Vec::as_slice)
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.vehicles.keys().copied()
    }

    pub fn is_playable(&self, vehicle_id: i32) -> bool {
        self.points(vehicle_id).map_or(false, |p| p.len() >= 2)
    }

    pub fn window(&self, start: f64, end: f64) -> Result<TrackWindow, WindowError> {
        TrackWindow::from_sliders(self.min_tick, self.max_tick, start, end)
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
