//! AlgoLab Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the AlgoLab engines
//! to run both against a **Production** clock (tokio) and inside a
//! **Simulation** harness with a virtual clock.
//!
//! # Core Concept: The Reactor Pattern
//!
//! The engines never touch the outside world directly. Everything that would
//! make a run non-reproducible is routed through this crate:
//! - Time (`now()`, `sleep()`)
//! - Randomness (`derive_rng()`)
//! - Audio output (`audio::output()`)
//!
//! By deriving all entropy from a single 64-bit seed, any race or capacity
//! run becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use algolab_env::LabContext;
//!
//! async fn frame_loop<Ctx: LabContext>(ctx: &Ctx, race: &mut RaceScheduler) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(16)).await;
//!         race.on_frame(ctx.now());
//!     }
//! }
//! ```

pub mod audio;
mod context;
mod types;
mod error;
mod tokio_impl;

pub use audio::{AudioRoute, AudioSink, TracingSink};
pub use context::LabContext;
pub use types::{Cue, SinkState, Waveform};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
