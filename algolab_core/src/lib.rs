//! AlgoLab Core - Engines for two interactive teaching widgets
//!
//! This library holds the stateful logic behind:
//! 1. **AlgoRace**: a side-by-side sorting race where two algorithms run as
//!    resumable step sequences over identical data, with audible cues.
//! 2. **SystemScaler**: a capacity puzzle where the user tunes replicas,
//!    cache and database until a three-tier system stops falling over.
//!
//! Rendering is left to the host. Engines are advanced by calling
//! [`Tickable::on_tick`] from whatever clock the host has.

pub mod capacity;
pub mod cue;
pub mod error;
pub mod race;
pub mod schedule;
pub mod sort_engine;

// Re-export key types for convenience
pub use capacity::{CapacityLoop, CapacitySimulator, Knob, Knobs, LoadBreakdown, Scenario};
pub use error::{CapacityError, ConfigError, LabError};
pub use race::{LaneId, RaceConfig, RaceEvent, RaceScheduler};
pub use schedule::{CancelHandle, Interval, TickStatus, Tickable};
pub use sort_engine::{SortAlgorithm, Step, StepEngine};
