//! V2I Replay Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the playback engine run
//! both against the real world (Tokio clock, UDP sockets) and inside a
//! deterministic harness (virtual clock, recording transport).
//!
//! # Core Concept
//!
//! Every execution unit talks to exactly two things:
//! - A [`PlaybackContext`] for `now()`, `sleep()` and `spawn()`
//! - A [`MessageTransport`] that ships encoded frames to one [`Endpoint`]
//!
//! # Example
//!
//! ```ignore
//! use v2i_env::{PlaybackContext, MessageTransport};
//!
//! async fn emit<Ctx: PlaybackContext, Net: MessageTransport>(
//!     ctx: &Ctx,
//!     net: &mut Net,
//!     origin: Duration,
//!     due: Duration,
//!     frame: &[u8],
//! ) {
//!     let elapsed = ctx.now() - origin;
//!     ctx.sleep(due.saturating_sub(elapsed)).await;
//!     let _ = net.send(frame).await;
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;

pub use context::PlaybackContext;
pub use network::{MessageTransport, TransportFactory};
pub use types::Endpoint;
pub use error::EnvError;
pub use tokio_impl::{TokioContext, UdpTransport, UdpTransportFactory};
