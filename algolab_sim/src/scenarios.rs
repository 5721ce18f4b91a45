//! Named scenarios for the simulation harness.

use algolab_core::capacity::{Knobs, Scenario};
use algolab_core::{RaceConfig, SortAlgorithm};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// The widget's default race on 50 bars
    BubbleVsQuick,

    /// Two algorithms with very different step profiles
    MergeVsSelection,

    /// Every ordered pair of algorithms on a small dataset
    AllPairs,

    /// Speed divisor 4: one step every fourth frame
    SlowMotion,

    /// "Generate New Data" pressed in the middle of a race
    ResetMidRace,

    /// Suspended output, a failing device, then muted
    AudioFallback,

    /// Race and capacity loop torn down through one handle
    Unmount,

    /// Same seed twice, identical runs
    Replay,

    // ═══════════════════════════════════════════════════
    // CAPACITY SCENARIOS
    // ═══════════════════════════════════════════════════

    /// Overloaded single replica, scaled out until stable, then solved
    LaunchDay,

    /// Database-bound system rescued by the cache
    CacheRescue,

    /// Maximum traffic that no knob setting can absorb
    FlashCrowd,

    /// Switching scenarios while the tick loop keeps running
    ScenarioSwitch,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        let mut all = Self::races();
        all.extend(Self::capacity());
        all
    }

    /// Returns the sorting race scenarios.
    pub fn races() -> Vec<ScenarioId> {
        vec![
            ScenarioId::BubbleVsQuick,
            ScenarioId::MergeVsSelection,
            ScenarioId::AllPairs,
            ScenarioId::SlowMotion,
            ScenarioId::ResetMidRace,
            ScenarioId::AudioFallback,
            ScenarioId::Unmount,
            ScenarioId::Replay,
        ]
    }

    /// Returns the capacity scenarios.
    pub fn capacity() -> Vec<ScenarioId> {
        vec![
            ScenarioId::LaunchDay,
            ScenarioId::CacheRescue,
            ScenarioId::FlashCrowd,
            ScenarioId::ScenarioSwitch,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::BubbleVsQuick => "bubble_vs_quick",
            ScenarioId::MergeVsSelection => "merge_vs_selection",
            ScenarioId::AllPairs => "all_pairs",
            ScenarioId::SlowMotion => "slow_motion",
            ScenarioId::ResetMidRace => "reset_mid_race",
            ScenarioId::AudioFallback => "audio_fallback",
            ScenarioId::Unmount => "unmount",
            ScenarioId::Replay => "replay",
            ScenarioId::LaunchDay => "launch_day",
            ScenarioId::CacheRescue => "cache_rescue",
            ScenarioId::FlashCrowd => "flash_crowd",
            ScenarioId::ScenarioSwitch => "scenario_switch",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::BubbleVsQuick => "Default race: Bubble Sort vs Quick Sort, 50 elements",
            ScenarioId::MergeVsSelection => "Merge Sort vs Selection Sort, 40 elements",
            ScenarioId::AllPairs => "All 16 algorithm pairings on 12 elements, sorted output checked",
            ScenarioId::SlowMotion => "Speed divisor 4, step count matches frame count",
            ScenarioId::ResetMidRace => "Reset after 30 frames, step consumption must stop",
            ScenarioId::AudioFallback => "Suspended or failing audio skips cues, mute suppresses them",
            ScenarioId::Unmount => "One cancel stops the race, the capacity loop and the driver",
            ScenarioId::Replay => "Two runs from the same seed produce identical snapshots",
            ScenarioId::LaunchDay => "50 RPS on one replica, scale out, celebrate, solve",
            ScenarioId::CacheRescue => "120 RPS bound by the database, fixed by a full cache",
            ScenarioId::FlashCrowd => "250 RPS stays critical at every knob maximum",
            ScenarioId::ScenarioSwitch => "Load a new scenario mid-run, knobs and history reset",
        }
    }

    /// Returns true for the capacity simulator scenarios.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            ScenarioId::LaunchDay
                | ScenarioId::CacheRescue
                | ScenarioId::FlashCrowd
                | ScenarioId::ScenarioSwitch
        )
    }

    /// The race this scenario runs, if it is a single-race scenario.
    pub fn race_config(&self) -> Option<RaceConfig> {
        let config = match self {
            ScenarioId::BubbleVsQuick | ScenarioId::Replay => RaceConfig::default(),
            ScenarioId::MergeVsSelection => {
                RaceConfig::new(SortAlgorithm::Merge, SortAlgorithm::Selection).with_data_size(40)
            }
            ScenarioId::SlowMotion => RaceConfig::new(SortAlgorithm::Selection, SortAlgorithm::Quick)
                .with_data_size(10)
                .with_speed_divisor(4),
            ScenarioId::ResetMidRace | ScenarioId::Unmount => {
                RaceConfig::default().with_data_size(30)
            }
            ScenarioId::AudioFallback => {
                RaceConfig::new(SortAlgorithm::Quick, SortAlgorithm::Merge).with_data_size(16)
            }
            _ => return None,
        };
        Some(config)
    }

    /// The capacity puzzle this scenario starts from.
    pub fn capacity_scenario(&self) -> Option<Scenario> {
        match self {
            ScenarioId::LaunchDay | ScenarioId::ScenarioSwitch | ScenarioId::Unmount => {
                Some(launch_day())
            }
            ScenarioId::CacheRescue => Some(read_heavy_api()),
            ScenarioId::FlashCrowd => Some(flash_crowd()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::all()
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}

/// A single web tier that cannot keep up with modest traffic.
pub fn launch_day() -> Scenario {
    Scenario::new(
        "Launch Day",
        "The product just launched and the single app server is melting. Get latency under 100ms.",
    )
}

/// Read-heavy traffic that overwhelms a small database.
pub fn read_heavy_api() -> Scenario {
    Scenario::new(
        "Read-Heavy API",
        "Reads dominate and the database is the bottleneck. Add caching.",
    )
    .with_knobs(Knobs {
        traffic: 120.0,
        replicas: 10,
        db_capacity: 2,
        cache_capacity: 0,
    })
}

/// Traffic past what the largest configuration can serve.
pub fn flash_crowd() -> Scenario {
    Scenario::new(
        "Flash Crowd",
        "A viral post sends 250 RPS. Find out where the architecture tops out.",
    )
    .with_knobs(Knobs {
        traffic: 250.0,
        replicas: 1,
        db_capacity: 1,
        cache_capacity: 0,
    })
    .with_target_latency(200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
            assert_eq!(id.to_string(), id.name());
        }
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_every_scenario_has_a_subject() {
        for id in ScenarioId::all() {
            let has_race = id.race_config().is_some() || id == ScenarioId::AllPairs;
            let has_capacity = id.capacity_scenario().is_some();
            assert!(has_race || has_capacity, "{} drives nothing", id);
            assert_eq!(id.is_capacity(), ScenarioId::capacity().contains(&id));
        }
    }

    #[test]
    fn test_race_presets_are_valid() {
        for id in ScenarioId::races() {
            if let Some(config) = id.race_config() {
                config.validate().unwrap();
            }
        }
    }
}
