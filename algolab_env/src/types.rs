//! Common types for the AlgoLab environment abstraction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Oscillator shape used for a cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waveform::Sine => write!(f, "sine"),
            Waveform::Triangle => write!(f, "triangle"),
        }
    }
}

/// A short audio note.
///
/// The sink is expected to start the note at `volume` and ramp it down
/// exponentially over `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Oscillator frequency in Hz
    pub frequency_hz: f64,

    /// Oscillator shape
    pub waveform: Waveform,

    /// Starting gain (0.0 - 1.0)
    pub volume: f64,

    /// Note length in milliseconds
    pub duration_ms: u32,
}

impl Cue {
    /// Default starting gain for step cues.
    pub const DEFAULT_VOLUME: f64 = 0.05;

    /// Default note length for step cues.
    pub const DEFAULT_DURATION_MS: u32 = 100;

    /// Creates a cue with the default volume and length.
    pub fn new(frequency_hz: f64, waveform: Waveform) -> Self {
        Self {
            frequency_hz,
            waveform,
            volume: Self::DEFAULT_VOLUME,
            duration_ms: Self::DEFAULT_DURATION_MS,
        }
    }
}

/// Lifecycle state reported by an audio sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkState {
    /// Producing sound
    Running,

    /// Created but not allowed to play yet (e.g. waiting for a user gesture)
    Suspended,
}
