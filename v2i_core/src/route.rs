//! Scenario model: per-vehicle waypoint routes, clones and display colors.
//!
//! A [`Route`] is assembled by the editing collaborator before a run and is
//! read-only while the engine plays it. Waypoint sequence indices are the
//! positions in each vehicle's list, so they are contiguous from 0 by
//! construction.

use crate::geo_math::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Miles per hour to meters per second.
pub const MPH_TO_MPS: f64 = 0.44704;

/// Maximum clones per vehicle.
pub const MAX_CLONES: u32 = 50;

/// Maximum start delay between consecutive clones, in seconds.
pub const MAX_CLONE_OFFSET_SECS: f64 = 600.0;

/// Errors raised while editing a route.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("Vehicle {0} already exists")]
    DuplicateVehicle(i32),

    #[error("Unknown vehicle {0}")]
    UnknownVehicle(i32),

    #[error("Clone count {0} outside 0..=50")]
    CloneCount(u32),

    #[error("Clone offset {0}s outside 0..=600s")]
    CloneOffset(f64),

    #[error("Waypoint {index} out of range for vehicle {vehicle_id}")]
    WaypointIndex { vehicle_id: i32, index: usize },
}

/// The fixed display palette, in allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaletteColor {
    Cyan,
    Coral,
    Pink,
    Gold,
    Lavender,
    Lime,
    Orange,
    Magenta,
    PowderBlue,
    Yellow,
}

impl PaletteColor {
    pub const ALL: [PaletteColor; 10] = [
        PaletteColor::Cyan,
        PaletteColor::Coral,
        PaletteColor::Pink,
        PaletteColor::Gold,
        PaletteColor::Lavender,
        PaletteColor::Lime,
        PaletteColor::Orange,
        PaletteColor::Magenta,
        PaletteColor::PowderBlue,
        PaletteColor::Yellow,
    ];

    /// Color used for imported track vehicles.
    pub const TRACK: PaletteColor = PaletteColor::Pink;

    /// sRGB components.
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            PaletteColor::Cyan => [0x00, 0xFF, 0xFF],
            PaletteColor::Coral => [0xFF, 0x7F, 0x50],
            PaletteColor::Pink => [0xFF, 0xC0, 0xCB],
            PaletteColor::Gold => [0xFF, 0xD7, 0x00],
            PaletteColor::Lavender => [0xE6, 0xE6, 0xFA],
            PaletteColor::Lime => [0x00, 0xFF, 0x00],
            PaletteColor::Orange => [0xFF, 0xA5, 0x00],
            PaletteColor::Magenta => [0xFF, 0x00, 0xFF],
            PaletteColor::PowderBlue => [0xB0, 0xE0, 0xE6],
            PaletteColor::Yellow => [0xFF, 0xFF, 0x00],
        }
    }
}

/// One authored waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,

    /// Target speed on arrival, in mph
    pub speed_mph: f64,

    /// Dwell time at arrival, in seconds
    #[serde(default)]
    pub pause_secs: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, speed_mph: f64, pause_secs: f64) -> Self {
        Self {
            lat,
            lon,
            speed_mph,
            pause_secs,
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mph * MPH_TO_MPS
    }
}

/// A vehicle's route plus its clone settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRoute {
    pub vehicle_id: i32,
    pub waypoints: Vec<Waypoint>,
    pub clones: u32,
    pub clone_offset_secs: f64,
    pub color: PaletteColor,
}

impl VehicleRoute {
    /// A route needs at least one segment to be played.
    pub fn is_playable(&self) -> bool {
        self.waypoints.len() >= 2
    }

    /// Start delay of the given clone in seconds.
    pub fn clone_delay_secs(&self, clone_index: u32) -> f64 {
        self.clone_offset_secs * clone_index as f64
    }
}

/// A scenario: every vehicle's route keyed by vehicle id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    vehicles: BTreeMap<i32, VehicleRoute>,
}

impl Route {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vehicles: BTreeMap::new(),
        }
    }

    /// Adds an empty vehicle and allocates its display color.
    ///
    /// The first palette color not held by another vehicle is used. Once all
    /// ten are taken, colors are reused cyclically by vehicle count.
    pub fn add_vehicle(
        &mut self,
        vehicle_id: i32,
        clones: u32,
        clone_offset_secs: f64,
    ) -> Result<PaletteColor, RouteError> {
        if self.vehicles.contains_key(&vehicle_id) {
            return Err(RouteError::DuplicateVehicle(vehicle_id));
        }
        if clones > MAX_CLONES {
            return Err(RouteError::CloneCount(clones));
        }
        if !(0.0..=MAX_CLONE_OFFSET_SECS).contains(&clone_offset_secs) {
            return Err(RouteError::CloneOffset(clone_offset_secs));
        }

        let color = self.next_color();
        self.vehicles.insert(
            vehicle_id,
            VehicleRoute {
                vehicle_id,
                waypoints: Vec::new(),
                clones,
                clone_offset_secs,
                color,
            },
        );
        Ok(color)
    }

    fn next_color(&self) -> PaletteColor {
        PaletteColor::ALL
            .iter()
            .copied()
            .find(|c| !self.vehicles.values().any(|v| v.color == *c))
            .unwrap_or(PaletteColor::ALL[self.vehicles.len() % PaletteColor::ALL.len()])
    }

    /// Removes a vehicle, releasing its color.
    pub fn remove_vehicle(&mut self, vehicle_id: i32) -> Option<VehicleRoute> {
        self.vehicles.remove(&vehicle_id)
    }

    /// Appends a waypoint and returns its sequence index.
    pub fn push_waypoint(&mut self, vehicle_id: i32, waypoint: Waypoint) -> Result<usize, RouteError> {
        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or(RouteError::UnknownVehicle(vehicle_id))?;
        vehicle.waypoints.push(waypoint);
        Ok(vehicle.waypoints.len() - 1)
    }

    /// Replaces the waypoint at `index`.
    pub fn set_waypoint(&mut self, vehicle_id: i32, index: usize, waypoint: Waypoint) -> Result<(), RouteError> {
        let vehicle = self
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or(RouteError::UnknownVehicle(vehicle_id))?;
        let slot = vehicle
            .waypoints
            .get_mut(index)
            .ok_or(RouteError::WaypointIndex { vehicle_id, index })?;
        *slot = waypoint;
        Ok(())
    }

    pub fn vehicle(&self, vehicle_id: i32) -> Option<&VehicleRoute> {
        self.vehicles.get(&vehicle_id)
    }

    /// Vehicles in ascending id order.
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleRoute> {
        self.vehicles.values()
    }

    /// Display color of a wire vehicle id, clones included.
    pub fn color_of(&self, wire_id: i32) -> Option<PaletteColor> {
        self.vehicles
            .values()
            .find(|v| wire_id >= v.vehicle_id && (wire_id - v.vehicle_id) as i64 <= v.clones as i64)
            .map(|v| v.color)
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }
}
