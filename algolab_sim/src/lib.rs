//! AlgoLab Deterministic Simulation Harness
//!
//! This crate runs the AlgoLab engines headlessly. Where the browser would
//! call the engines from its animation-frame loop, a [`FrameDriver`] sleeps
//! on a [`LabContext`](algolab_env::LabContext) clock and delivers frames.
//!
//! # Core Principle: The Reactor Pattern
//!
//! Every source of non-determinism is routed through the context:
//! - **Time**: the virtual clock moves only when the driver sleeps
//! - **Randomness**: datasets, traffic particles and frame jitter each draw
//!   from their own stream derived from a single 64-bit seed
//! - **Audio**: cues land in a [`RecordingSink`] instead of a sound card
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ FrameDriver (SimContext virtual clock, 60 Hz)        │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │ on_frame(now)               │ advance(now)          │
//! │  ┌────▼──────────┐            ┌─────▼────────┐              │
//! │  │ RaceScheduler │            │ CapacityLoop │              │
//! │  │  lane A → B   │            │  200 ms tick │              │
//! │  └────┬──────────┘            └─────┬────────┘              │
//! │       │ cues                        │ snapshots             │
//! │  ┌────▼──────────┐            ┌─────▼────────┐              │
//! │  │ RecordingSink │            │  SimExport   │              │
//! │  └───────────────┘            └──────────────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use algolab_sim::{ScenarioRunner, ScenarioId};
//!
//! let runner = ScenarioRunner::new(42);
//! let result = runner.run(ScenarioId::BubbleVsQuick).await;
//! assert!(result.passed);
//! ```

mod context;
mod driver;
mod error;
mod exporter;
mod runner;
pub mod scenarios;
mod sink;

pub use context::SimContext;
pub use driver::{DriveOutcome, FrameDriver, SimConfig};
pub use error::SimError;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use sink::RecordingSink;
