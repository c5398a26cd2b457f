//! JSON exporter for emitted samples.
//!
//! Exports every sample a run produced, plus its summary, for offline
//! plotting or comparison between runs.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v2i_core::{RunSummary, SampleEvent, SampleLog};

/// One vehicle's samples in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleTrace {
    pub vehicle_id: i32,
    pub samples: Vec<ExportedSample>,
}

/// A sample as written to the export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSample {
    /// Context time in seconds
    pub time_sec: f64,
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
    pub speed_mps: f64,

    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub alert: bool,
}

impl From<&SampleEvent> for ExportedSample {
    fn from(event: &SampleEvent) -> Self {
        Self {
            time_sec: event.at.as_secs_f64(),
            lat: event.lat,
            lon: event.lon,
            heading_deg: event.heading_deg,
            speed_mps: event.speed_mps,
            alert: event.alert,
        }
    }
}

/// Complete sample export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleExport {
    /// Scenario or track file name
    pub source: String,

    /// Time of the last sample in seconds
    pub duration_sec: f64,

    /// Traces ordered by wire vehicle id
    pub vehicles: Vec<VehicleTrace>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl SampleExport {
    /// Creates an empty export.
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            duration_sec: 0.0,
            vehicles: Vec::new(),
            summary: None,
        }
    }

    /// Adds a sample to its vehicle's trace.
    pub fn add_sample(&mut self, event: &SampleEvent) {
        let sample = ExportedSample::from(event);
        self.duration_sec = self.duration_sec.max(sample.time_sec);

        let index = match self
            .vehicles
            .binary_search_by_key(&event.vehicle_id, |t| t.vehicle_id)
        {
            Ok(index) => index,
            Err(index) => {
                self.vehicles.insert(
                    index,
                    VehicleTrace {
                        vehicle_id: event.vehicle_id,
                        samples: Vec::new(),
                    },
                );
                index
            }
        };
        self.vehicles[index].samples.push(sample);
    }

    /// Adds everything recorded in `log`.
    pub fn extend_from_log(&mut self, log: &SampleLog) {
        for event in log.events() {
            self.add_sample(&event);
        }
    }

    /// Attaches the run summary.
    pub fn finalize(&mut self, summary: RunSummary) {
        self.summary = Some(summary);
    }

    pub fn sample_count(&self) -> usize {
        self.vehicles.iter().map(|v| v.samples.len()).sum()
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use v2i_core::{SampleObserver, UnitMode};

    fn event(vehicle_id: i32, at_ms: u64, alert: bool) -> SampleEvent {
        SampleEvent {
            vehicle_id,
            mode: UnitMode::Scenario,
            heading_deg: 0.0,
            speed_mps: 4.47,
            lat: 39.0,
            lon: -94.0,
            alert,
            at: Duration::from_millis(at_ms),
        }
    }

    #[test]
    fn test_samples_grouped_by_vehicle() {
        let log = SampleLog::new();
        log.on_sample(&event(12, 0, true));
        log.on_sample(&event(10, 0, false));
        log.on_sample(&event(12, 100, false));
        log.on_sample(&event(10, 1_500, false));

        let mut export = SampleExport::new("downtown.json");
        export.extend_from_log(&log);

        let ids: Vec<i32> = export.vehicles.iter().map(|v| v.vehicle_id).collect();
        assert_eq!(ids, vec![10, 12]);
        assert_eq!(export.sample_count(), 4);
        assert_eq!(export.duration_sec, 1.5);
        assert!(export.vehicles[1].samples[0].alert);
    }

    #[test]
    fn test_alert_omitted_when_false() {
        let mut export = SampleExport::new("t");
        export.add_sample(&event(1, 0, false));

        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("alert"));
        assert!(!json.contains("summary"));

        let back: SampleExport = serde_json::from_str(&json).unwrap();
        assert!(!back.vehicles[0].samples[0].alert);
    }

    #[test]
    fn test_write_to_file() {
        let mut export = SampleExport::new("t");
        export.add_sample(&event(3, 200, true));

        let path = std::env::temp_dir().join(format!("v2i-export-{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(written.contains("\"vehicle_id\": 3"));
    }
}
