//! Segment kinematics and sample timelines.
//!
//! A scenario route is a chain of segments between consecutive waypoints.
//! Each segment is driven at constant acceleration from the entry speed to
//! the arrival speed:
//!
//! ```text
//! a        = (v2² − v1²) / 2d
//! duration = d / v1            if v1 == v2
//!          = (v2 − v1) / a     otherwise
//!          + arrival pause     if v2 == 0
//! ```
//!
//! Durations are whole milliseconds, truncated. The [`Timeline`] walks the
//! segments and yields one sample per base period at offsets `k × P` from
//! the lap origin, so scheduling never accumulates drift.

use crate::geo_math::{bearing, destination, distance, GeoPoint};
use crate::route::Waypoint;
use std::time::Duration;

/// Position and motion at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: GeoPoint,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub accel_mps2: f64,
}

/// Constant acceleration and motion time over `distance_m`.
///
/// Returns `(0, 0)` when the vehicle cannot move: zero distance or both
/// speeds at zero.
pub fn segment_motion(distance_m: f64, v1: f64, v2: f64) -> (f64, f64) {
    if distance_m <= 0.0 || (v1 <= 0.0 && v2 <= 0.0) {
        return (0.0, 0.0);
    }
    if v1 == v2 {
        return (0.0, distance_m / v1);
    }
    let accel = (v2 * v2 - v1 * v1) / (2.0 * distance_m);
    (accel, (v2 - v1) / accel)
}

/// One leg between two consecutive waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub v1_mps: f64,
    pub v2_mps: f64,
    pub accel_mps2: f64,

    /// Motion time plus any arrival pause, in whole milliseconds
    pub duration_ms: u64,
}

impl Segment {
    /// Builds the leg from `from` to `to`.
    pub fn between(from: &Waypoint, to: &Waypoint) -> Self {
        let start = from.position();
        let end = to.position();
        Self::build(
            start,
            end,
            distance(start, end),
            bearing(start, end),
            from.speed_mps(),
            to.speed_mps(),
            to.pause_secs,
        )
    }

    /// Builds a leg of known length and bearing; the end point is derived.
    pub fn along(
        start: GeoPoint,
        bearing_deg: f64,
        distance_m: f64,
        v1_mps: f64,
        v2_mps: f64,
        arrival_pause_secs: f64,
    ) -> Self {
        let end = destination(start, bearing_deg, distance_m);
        Self::build(start, end, distance_m, bearing_deg, v1_mps, v2_mps, arrival_pause_secs)
    }

    fn build(
        start: GeoPoint,
        end: GeoPoint,
        distance_m: f64,
        bearing_deg: f64,
        v1_mps: f64,
        v2_mps: f64,
        arrival_pause_secs: f64,
    ) -> Self {
        let (accel_mps2, motion_secs) = segment_motion(distance_m, v1_mps, v2_mps);

        let mut duration_ms = (motion_secs * 1000.0) as u64;
        if v2_mps == 0.0 && arrival_pause_secs > 0.0 {
            duration_ms += (arrival_pause_secs * 1000.0) as u64;
        }

        Self {
            start,
            end,
            distance_m,
            bearing_deg,
            v1_mps,
            v2_mps,
            accel_mps2,
            duration_ms,
        }
    }

    /// Whether the vehicle stays put for the whole segment.
    pub fn is_stationary(&self) -> bool {
        self.distance_m <= 0.0 || (self.v1_mps <= 0.0 && self.v2_mps <= 0.0)
    }

    /// The sample `dt_secs` after entering the segment.
    ///
    /// Once the speed would turn negative the vehicle is parked at the
    /// segment end with zero speed.
    pub fn sample_at(&self, dt_secs: f64) -> Sample {
        if self.is_stationary() {
            return Sample {
                position: self.start,
                heading_deg: self.bearing_deg,
                speed_mps: 0.0,
                accel_mps2: 0.0,
            };
        }

        let speed = self.v1_mps + self.accel_mps2 * dt_secs;
        if speed < 0.0 {
            return Sample {
                position: self.end,
                heading_deg: self.bearing_deg,
                speed_mps: 0.0,
                accel_mps2: self.accel_mps2,
            };
        }

        let travelled = (self.v1_mps * dt_secs + 0.5 * self.accel_mps2 * dt_secs * dt_secs)
            .clamp(0.0, self.distance_m);
        Sample {
            position: destination(self.start, self.bearing_deg, travelled),
            heading_deg: self.bearing_deg,
            speed_mps: speed,
            accel_mps2: self.accel_mps2,
        }
    }
}

/// Segments for every consecutive waypoint pair.
pub fn segments(waypoints: &[Waypoint]) -> Vec<Segment> {
    waypoints
        .windows(2)
        .map(|pair| Segment::between(&pair[0], &pair[1]))
        .collect()
}

/// A sample with its due time relative to the lap origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub due: Duration,
    pub segment: usize,
    pub sample: Sample,
}

/// Fixed-period sampling over a chain of segments.
///
/// The first sample is the start of segment 0 at offset zero. A segment
/// yields every due time that falls inside `[start, start + duration]`; the
/// next segment starts exactly where the previous one ended.
///
/// Both ends are inclusive: a lone segment of `D` ms at period `P` yields
/// `⌊D / P⌋ + 1` samples, one more than `⌈D / P⌉` when `P` divides `D`.
#[derive(Debug, Clone)]
pub struct Timeline<'a> {
    segments: &'a [Segment],
    period_ms: u64,
    index: usize,
    segment_start_ms: u64,
    next_due_ms: u64,
}

impl<'a> Timeline<'a> {
    pub fn new(segments: &'a [Segment], period: Duration) -> Self {
        Self {
            segments,
            period_ms: (period.as_millis() as u64).max(1),
            index: 0,
            segment_start_ms: 0,
            next_due_ms: 0,
        }
    }

    /// Total lap time: the sum of all segment durations.
    pub fn lap_duration(&self) -> Duration {
        Duration::from_millis(self.segments.iter().map(|s| s.duration_ms).sum())
    }
}

impl Iterator for Timeline<'_> {
    type Item = TimedSample;

    fn next(&mut self) -> Option<TimedSample> {
        loop {
            let segment = self.segments.get(self.index)?;
            let offset_ms = self.next_due_ms - self.segment_start_ms;

            if offset_ms <= segment.duration_ms {
                let item = TimedSample {
                    due: Duration::from_millis(self.next_due_ms),
                    segment: self.index,
                    sample: segment.sample_at(offset_ms as f64 / 1000.0),
                };
                self.next_due_ms += self.period_ms;
                return Some(item);
            }

            self.segment_start_ms += segment.duration_ms;
            self.index += 1;
        }
    }
}

/// One step of legacy resolution pacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionStep {
    /// Point to send, if any
    pub emit: Option<GeoPoint>,

    /// Wait after the step
    pub sleep_after: Duration,
}

/// Splits a segment into `max(1, ⌊d / meters⌋)` equal sub-steps.
///
/// The segment start is only sent when `include_start` is set; its wait is
/// kept either way. The end point carries no wait. Sub-step waits use the
/// entry speed, falling back to the arrival speed, then to zero.
pub fn resolution_steps(segment: &Segment, meters: f64, include_start: bool) -> Vec<ResolutionStep> {
    let count = if meters > 0.0 {
        ((segment.distance_m / meters) as usize).max(1)
    } else {
        1
    };
    let step_m = segment.distance_m / count as f64;

    let speed = if segment.v1_mps > 0.0 {
        segment.v1_mps
    } else {
        segment.v2_mps
    };
    let sleep = if speed > 0.0 {
        Duration::from_millis((segment.distance_m / speed / count as f64 * 1000.0) as u64)
    } else {
        Duration::ZERO
    };

    let mut steps = Vec::with_capacity(count + 1);
    steps.push(ResolutionStep {
        emit: include_start.then_some(segment.start),
        sleep_after: sleep,
    });
    for j in 1..count {
        steps.push(ResolutionStep {
            emit: Some(destination(segment.start, segment.bearing_deg, j as f64 * step_m)),
            sleep_after: sleep,
        });
    }
    steps.push(ResolutionStep {
        emit: Some(segment.end),
        sleep_after: Duration::ZERO,
    });
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn origin() -> GeoPoint {
        GeoPoint::new(39.1, -94.5)
    }

    #[test]
    fn test_equal_speeds_duration_is_distance_over_speed() {
        let (accel, secs) = segment_motion(100.0, 10.0, 10.0);
        assert_eq!(accel, 0.0);
        assert_eq!(secs, 10.0);

        let segment = Segment::along(origin(), 90.0, 100.0, 10.0, 10.0, 0.0);
        assert_eq!(segment.duration_ms, 10_000);
    }

    #[test]
    fn test_acceleration_from_rest() {
        let (accel, secs) = segment_motion(50.0, 0.0, 10.0);
        assert_eq!(accel, 1.0);
        assert_eq!(secs, 10.0);

        let segment = Segment::along(origin(), 0.0, 50.0, 0.0, 10.0, 0.0);
        assert_eq!(segment.duration_ms, 10_000);

        let mid = segment.sample_at(5.0);
        assert_relative_eq!(mid.speed_mps, 5.0);
        assert_relative_eq!(distance(origin(), mid.position), 12.5, max_relative = 1e-6);
    }

    #[test]
    fn test_stop_with_arrival_pause() {
        // 10 m/s to rest over 50 m: a = -1, 10 s, plus 3 s pause
        let segment = Segment::along(origin(), 180.0, 50.0, 10.0, 0.0, 3.0);
        assert_eq!(segment.accel_mps2, -1.0);
        assert_eq!(segment.duration_ms, 13_000);

        let parked = segment.sample_at(12.0);
        assert_eq!(parked.speed_mps, 0.0);
        assert_eq!(parked.position, segment.end);
    }

    #[test]
    fn test_pause_ignored_when_arrival_speed_nonzero() {
        let segment = Segment::along(origin(), 0.0, 100.0, 10.0, 10.0, 5.0);
        assert_eq!(segment.duration_ms, 10_000);
    }

    #[test]
    fn test_degenerate_segments_hold_position() {
        let standing = Segment::along(origin(), 0.0, 100.0, 0.0, 0.0, 2.0);
        assert!(standing.is_stationary());
        assert_eq!(standing.duration_ms, 2_000);
        assert_eq!(standing.sample_at(1.0).position, origin());
        assert_eq!(standing.sample_at(1.0).speed_mps, 0.0);

        let zero_length = Segment::along(origin(), 0.0, 0.0, 10.0, 20.0, 0.0);
        assert_eq!(zero_length.duration_ms, 0);
        assert!(zero_length.sample_at(0.0).accel_mps2.is_finite());
    }

    #[test]
    fn test_timeline_due_times_are_exact_multiples() {
        let segs = vec![
            Segment::along(origin(), 0.0, 50.0, 0.0, 10.0, 0.0),
            Segment::along(origin(), 0.0, 100.0, 10.0, 10.0, 0.0),
        ];
        let samples: Vec<_> = Timeline::new(&segs, Duration::from_millis(100)).collect();

        for (k, s) in samples.iter().enumerate() {
            assert_eq!(s.due, Duration::from_millis(100 * k as u64));
        }

        // floor(10000 / 100) + 1 in the first segment, then 100 more
        assert_eq!(samples.iter().filter(|s| s.segment == 0).count(), 101);
        assert_eq!(samples.iter().filter(|s| s.segment == 1).count(), 100);
        assert_eq!(samples.last().unwrap().due, Duration::from_millis(20_000));
    }

    #[test]
    fn test_timeline_uneven_period() {
        let segs = vec![Segment::along(origin(), 0.0, 100.0, 10.0, 10.0, 0.0)];
        let timeline = Timeline::new(&segs, Duration::from_millis(300));
        assert_eq!(timeline.lap_duration(), Duration::from_secs(10));

        let samples: Vec<_> = timeline.collect();
        assert_eq!(samples.len(), 10_000 / 300 + 1);
        assert!(distance(samples[0].sample.position, origin()) < 1e-6);
        assert_eq!(samples[0].sample.speed_mps, 10.0);
    }

    #[test]
    fn test_segments_from_waypoints() {
        let waypoints = vec![
            Waypoint::new(39.0, -94.5, 20.0, 0.0),
            Waypoint::new(39.001, -94.5, 20.0, 0.0),
            Waypoint::new(39.002, -94.5, 0.0, 4.0),
        ];
        let segs = segments(&waypoints);

        assert_eq!(segs.len(), 2);
        assert_relative_eq!(segs[0].bearing_deg, 0.0, epsilon = 1e-9);
        assert_eq!(segs[1].end, waypoints[2].position());
        assert!(segs[1].duration_ms > 4_000);
        assert!(segments(&waypoints[..1]).is_empty());
    }

    #[test]
    fn test_resolution_steps() {
        let segment = Segment::along(origin(), 90.0, 250.0, 10.0, 10.0, 0.0);

        let steps = resolution_steps(&segment, 100.0, true);
        // floor(250 / 100) = 2 sub-steps: start, one interior point, end
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].emit, Some(origin()));
        assert_eq!(steps[0].sleep_after, Duration::from_millis(12_500));
        assert_relative_eq!(distance(origin(), steps[1].emit.unwrap()), 125.0, max_relative = 1e-6);
        assert_eq!(steps[2].emit, Some(segment.end));
        assert_eq!(steps[2].sleep_after, Duration::ZERO);

        let later = resolution_steps(&segment, 100.0, false);
        assert_eq!(later[0].emit, None);
        assert_eq!(later[0].sleep_after, Duration::from_millis(12_500));
    }

    #[test]
    fn test_resolution_short_or_stationary_segment() {
        let short = Segment::along(origin(), 0.0, 40.0, 0.0, 8.0, 0.0);
        let steps = resolution_steps(&short, 100.0, false);
        assert_eq!(steps.len(), 2);
        // Entry speed is zero so the arrival speed paces it
        assert_eq!(steps[0].sleep_after, Duration::from_millis(5_000));

        let standing = Segment::along(origin(), 0.0, 40.0, 0.0, 0.0, 0.0);
        assert!(resolution_steps(&standing, 10.0, true)
            .iter()
            .all(|s| s.sleep_after == Duration::ZERO));
    }
}
