//! V2I Replay Harness
//!
//! Loaders, observers and an offline runner around the replay engine, plus
//! the `v2i-sim` command line tool.
//!
//! # Core Principle: Replay Without a Network
//!
//! Offline runs intercept the two sources of non-determinism in playback:
//! - **Time**: a virtual clock that moves only when a unit sleeps or sends
//! - **Network**: a recording transport with seeded loss and injected failures
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ReplaySimulator                       │
//! │                                                          │
//! │  for each vehicle / clone:                               │
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────┐    │
//! │  │ SimContext │──►│ PlaybackUnit │──►│ SimTransport │    │
//! │  │ (horizon)  │   │              │   │ (loss, fail) │    │
//! │  └────────────┘   └──────┬───────┘   └──────┬───────┘    │
//! │                          │                  │            │
//! │                   SampleObserver         FrameLog        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use v2i_sim::{load_scenario, ReplaySimulator};
//! use v2i_core::{RunInput, RunParameters};
//!
//! let route = load_scenario("downtown.json")?;
//! let result = ReplaySimulator::new(RunParameters::default().with_loop(false))
//!     .with_seed(42)
//!     .run(&RunInput::Scenario(route.into()))
//!     .await?;
//! ```

mod context;
pub mod exporter;
pub mod loader;
mod network;
pub mod observers;
pub mod runner;

pub use context::SimContext;
pub use exporter::SampleExport;
pub use loader::{load_scenario, load_tracks, LoadError};
pub use network::{FrameLog, LinkConditions, SentFrame, SimTransport, SimTransportFactory};
pub use observers::{FanoutObserver, LoggingObserver};
pub use runner::{ReplaySimulator, SimulationMetrics, SimulationResult};
