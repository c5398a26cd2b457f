//! V2I Replay Core - trajectory playback and message encoding
//!
//! This library turns sparse vehicle trajectories into a dense, correctly
//! paced stream of V2I status messages:
//! 1. **Kinematics**: constant-acceleration segments between waypoints, sampled at a fixed period
//! 2. **Playback**: one execution unit per vehicle and clone, drift-corrected against a monotonic clock
//! 3. **Wire format**: fixed-layout big-endian basic-status, signal-request and vehicle-body frames

pub mod codec;
pub mod coordinator;
pub mod geo_math;
pub mod kinematics;
pub mod observer;
pub mod params;
pub mod playback;
pub mod route;
pub mod track;

// Re-export key types for convenience
pub use codec::{BasicStatus, BodyState, BodyStatus, GearState, MessageKind, SignalRequest, TurnSignal};
pub use coordinator::{CoordinatorError, RunCoordinator, RunHandle, RunId, RunInput, RunSummary};
pub use geo_math::GeoPoint;
pub use observer::{NullObserver, SampleEvent, SampleLog, SampleObserver};
pub use params::{LiveBodyState, Pacing, RunParameters, SignalRequestConfig, StopFlag};
pub use playback::{
    LastEmitted, LastPoint, PlaybackUnit, UnitDescriptor, UnitMode, UnitOutcome, UnitReport, UnitShared,
};
pub use route::{PaletteColor, Route, RouteError, VehicleRoute, Waypoint};
pub use track::{TrackPoint, TrackSet, TrackWindow, WindowError};
