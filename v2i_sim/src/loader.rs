//! JSON scenario and track files.
//!
//! A scenario file lists vehicles with their clone settings and waypoints;
//! colors are allocated while loading, in file order. A track file is a flat
//! array of recorded points for any number of vehicles.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use v2i_core::{Route, RouteError, TrackPoint, TrackSet, Waypoint};

/// Errors raised while loading input files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid scenario: {0}")]
    Route(#[from] RouteError),
}

/// One vehicle as written in a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleEntry {
    pub vehicle_id: i32,

    #[serde(default)]
    pub clones: u32,

    #[serde(default)]
    pub clone_offset_secs: f64,

    pub waypoints: Vec<Waypoint>,
}

/// On-disk scenario layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    pub vehicles: Vec<VehicleEntry>,
}

impl ScenarioFile {
    /// Builds a route, validating clone settings and allocating colors.
    pub fn into_route(self) -> Result<Route, LoadError> {
        let mut route = Route::new(self.name);
        for vehicle in self.vehicles {
            route.add_vehicle(vehicle.vehicle_id, vehicle.clones, vehicle.clone_offset_secs)?;
            for waypoint in vehicle.waypoints {
                route.push_waypoint(vehicle.vehicle_id, waypoint)?;
            }
        }
        Ok(route)
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses a scenario from JSON text.
pub fn parse_scenario(json: &str, path: &Path) -> Result<Route, LoadError> {
    let file: ScenarioFile = serde_json::from_str(json).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    file.into_route()
}

/// Parses a track set from JSON text.
pub fn parse_tracks(json: &str, path: &Path) -> Result<TrackSet, LoadError> {
    let points: Vec<TrackPoint> = serde_json::from_str(json).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TrackSet::from_points(points))
}

/// Loads a scenario file.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Route, LoadError> {
    let path = path.as_ref();
    let route = parse_scenario(&read(path)?, path)?;
    info!(path = %path.display(), name = %route.name, vehicles = route.len(), "scenario loaded");
    Ok(route)
}

/// Loads a track file.
pub fn load_tracks(path: impl AsRef<Path>) -> Result<TrackSet, LoadError> {
    let path = path.as_ref();
    let tracks = parse_tracks(&read(path)?, path)?;
    info!(
        path = %path.display(),
        vehicles = tracks.vehicle_ids().count(),
        "tracks loaded"
    );
    Ok(tracks)
}
