//! JSON exporter for offline rendering.
//!
//! Exports simulation frames as JSON so a renderer can replay a headless run
//! bar by bar and tick by tick.

use algolab_core::capacity::{CapacityEvent, CapacitySnapshot};
use algolab_core::race::{RaceEvent, RaceSnapshot};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Host time in seconds
    pub time_sec: f64,

    /// Frame number since the run started
    pub frame: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<RaceSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacitySnapshot>,

    /// Events raised since the previous exported frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SimEvent {
    Race { event: RaceEvent },
    Capacity { event: CapacityEvent },
    Note { message: String },
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
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
    use algolab_core::LaneId;

    #[test]
    fn test_export_shape() {
        let mut export = SimExport::new("launch_day", 42);
        export.add_frame(SimFrame {
            time_sec: 0.5,
            frame: 30,
            race: None,
            capacity: None,
            events: vec![
                SimEvent::Race {
                    event: RaceEvent::LaneStarted { lane: LaneId::B },
                },
                SimEvent::Note {
                    message: "reset".into(),
                },
            ],
        });
        export.finalize(true, None);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["scenario"], "launch_day");
        assert_eq!(json["duration_sec"], 0.5);
        assert_eq!(json["frames"][0]["events"][0]["source"], "race");
        assert_eq!(json["frames"][0]["events"][1]["message"], "reset");
        assert!(json["frames"][0].get("race").is_none());
        assert!(json.get("failure_reason").is_none());
    }
}
