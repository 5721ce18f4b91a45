//! Capacity Simulator
//! ==================
//!
//! A toy queuing model of a three-tier web system (app replicas, cache,
//! database). Every 200 ms the simulator turns the current knob values into
//! a latency and error-rate estimate, smooths them, and decides whether the
//! system is stable.
//!
//! # Load model
//! ```text
//! appLoad         = traffic / (replicas * 15)
//! cacheEfficiency = (cache / 10) * 0.8
//! dbLoad          = traffic * (1 - cacheEfficiency) / (db * 20)
//! cacheLoad       = cache > 0 ? traffic / (cache * 50) : 0
//! bottleneck      = max(appLoad, dbLoad, cacheLoad)
//! latency         = 20 + (bottleneck > 0.7 ? (bottleneck - 0.7)^2 * 1000 : 0)
//! errorRate       = bottleneck > 1.1 ? min((bottleneck - 1.1) * 100, 100) : 0
//! ```
//!
//! Stability is judged on the raw per-tick values, while the displayed
//! latency and error rate are exponential moving averages of them.

use crate::error::{CapacityError, LabError};
use crate::schedule::{CancelHandle, Interval, TickStatus, Tickable};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Simulation tick period.
pub const TICK_PERIOD: Duration = Duration::from_millis(200);

/// Raw samples kept for the latency chart.
pub const HISTORY_LEN: usize = 30;

/// Flow particles kept for display.
pub const PARTICLE_LEN: usize = 16;

/// Chance of spawning a flow particle on a tick.
pub const PARTICLE_SPAWN_CHANCE: f64 = 0.8;

const BASE_LATENCY_MS: f64 = 20.0;
const LATENCY_KNEE: f64 = 0.7;
const ERROR_KNEE: f64 = 1.1;
const LATENCY_SMOOTHING: f64 = 0.6;
const ERROR_SMOOTHING: f64 = 0.8;

// =============================================================================
// SCENARIO & KNOBS
// =============================================================================

fn default_traffic() -> f64 {
    50.0
}

fn default_one() -> u32 {
    1
}

fn default_target_latency() -> f64 {
    100.0
}

/// A capacity puzzle, as supplied by the component props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Name of the system design scenario
    pub scenario_name: String,

    /// The problem the user needs to solve
    #[serde(default)]
    pub description: String,

    /// Initial requests per second
    #[serde(default = "default_traffic")]
    pub initial_traffic: f64,

    /// Initial number of app server replicas
    #[serde(default = "default_one")]
    pub initial_replicas: u32,

    /// Initial database capacity units
    #[serde(default = "default_one")]
    pub initial_db_capacity: u32,

    /// Initial cache capacity units
    #[serde(default)]
    pub initial_cache_capacity: u32,

    /// Raw latency (ms) at or below which the system counts as stable
    #[serde(default = "default_target_latency")]
    pub target_latency: f64,
}

impl Scenario {
    /// Creates a scenario with the default starting knobs.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            scenario_name: name.into(),
            description: description.into(),
            initial_traffic: default_traffic(),
            initial_replicas: 1,
            initial_db_capacity: 1,
            initial_cache_capacity: 0,
            target_latency: default_target_latency(),
        }
    }

    /// Sets the starting knobs.
    pub fn with_knobs(mut self, knobs: Knobs) -> Self {
        self.initial_traffic = knobs.traffic;
        self.initial_replicas = knobs.replicas;
        self.initial_db_capacity = knobs.db_capacity;
        self.initial_cache_capacity = knobs.cache_capacity;
        self
    }

    /// Sets the target latency.
    pub fn with_target_latency(mut self, target_ms: f64) -> Self {
        self.target_latency = target_ms;
        self
    }

    /// The knob values this scenario starts from.
    pub fn initial_knobs(&self) -> Knobs {
        Knobs {
            traffic: self.initial_traffic,
            replicas: self.initial_replicas,
            db_capacity: self.initial_db_capacity,
            cache_capacity: self.initial_cache_capacity,
        }
    }

    /// Parses SystemScaler props.
    pub fn from_props_json(json: &str) -> Result<Self, LabError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One adjustable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Knob {
    Traffic,
    Replicas,
    DbCapacity,
    CacheCapacity,
}

/// Range and granularity of a knob's control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl KnobBounds {
    /// Clamps into range and snaps to the step grid anchored at `min`.
    pub fn apply(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        let snapped = self.min + ((clamped - self.min) / self.step).round() * self.step;
        snapped.min(self.max)
    }
}

impl Knob {
    pub const ALL: [Knob; 4] = [
        Knob::Traffic,
        Knob::Replicas,
        Knob::DbCapacity,
        Knob::CacheCapacity,
    ];

    /// The control bounds for this knob.
    pub fn bounds(&self) -> KnobBounds {
        match self {
            Knob::Traffic => KnobBounds {
                min: 10.0,
                max: 250.0,
                step: 10.0,
            },
            Knob::Replicas | Knob::DbCapacity => KnobBounds {
                min: 1.0,
                max: 10.0,
                step: 1.0,
            },
            Knob::CacheCapacity => KnobBounds {
                min: 0.0,
                max: 10.0,
                step: 1.0,
            },
        }
    }
}

impl fmt::Display for Knob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Knob::Traffic => write!(f, "traffic"),
            Knob::Replicas => write!(f, "replicas"),
            Knob::DbCapacity => write!(f, "db"),
            Knob::CacheCapacity => write!(f, "cache"),
        }
    }
}

/// Current input values.
///
/// The simulator reads these as-is. [`Knobs::set`], [`Knobs::adjust`] and
/// [`Knobs::clamped`] are the input boundary where control bounds apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Knobs {
    /// Requests per second
    pub traffic: f64,
    pub replicas: u32,
    pub db_capacity: u32,
    pub cache_capacity: u32,
}

impl Knobs {
    /// Returns a knob's value.
    pub fn get(&self, knob: Knob) -> f64 {
        match knob {
            Knob::Traffic => self.traffic,
            Knob::Replicas => self.replicas as f64,
            Knob::DbCapacity => self.db_capacity as f64,
            Knob::CacheCapacity => self.cache_capacity as f64,
        }
    }

    /// Slider input: clamps and snaps `value`, then stores it.
    pub fn set(&mut self, knob: Knob, value: f64) {
        let value = knob.bounds().apply(value);
        match knob {
            Knob::Traffic => self.traffic = value,
            Knob::Replicas => self.replicas = value as u32,
            Knob::DbCapacity => self.db_capacity = value as u32,
            Knob::CacheCapacity => self.cache_capacity = value as u32,
        }
    }

    /// Button input: moves a knob by `delta` steps.
    pub fn adjust(&mut self, knob: Knob, delta: i32) {
        let step = knob.bounds().step;
        self.set(knob, self.get(knob) + delta as f64 * step);
    }

    /// Returns a copy with every knob inside its bounds.
    pub fn clamped(&self) -> Knobs {
        let mut knobs = *self;
        for knob in Knob::ALL {
            knobs.set(knob, self.get(knob));
        }
        knobs
    }
}

// =============================================================================
// LOAD MODEL
// =============================================================================

/// The tier with the highest load ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    App,
    Database,
    Cache,
}

/// Every intermediate value of one load evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBreakdown {
    pub app_load: f64,
    pub cache_efficiency: f64,
    pub traffic_to_db: f64,
    pub db_load: f64,
    pub cache_load: f64,
    pub bottleneck: f64,
    pub bottleneck_tier: Tier,
    pub raw_latency: f64,
    pub raw_error_rate: f64,
}

impl LoadBreakdown {
    /// Evaluates the load model for `knobs`. Performs no clamping.
    pub fn evaluate(knobs: &Knobs) -> Self {
        let traffic = knobs.traffic;
        let replicas = knobs.replicas as f64;
        let db = knobs.db_capacity as f64;
        let cache = knobs.cache_capacity as f64;

        let app_load = traffic / (replicas * 15.0);
        let cache_efficiency = (cache / 10.0) * 0.8;
        let traffic_to_db = traffic * (1.0 - cache_efficiency);
        let db_load = traffic_to_db / (db * 20.0);
        let cache_load = if cache > 0.0 {
            traffic / (cache * 50.0)
        } else {
            0.0
        };

        let bottleneck = app_load.max(db_load).max(cache_load);
        let bottleneck_tier = if bottleneck == app_load {
            Tier::App
        } else if bottleneck == db_load {
            Tier::Database
        } else {
            Tier::Cache
        };

        let raw_latency = BASE_LATENCY_MS
            + if bottleneck > LATENCY_KNEE {
                (bottleneck - LATENCY_KNEE).powi(2) * 1000.0
            } else {
                0.0
            };
        let raw_error_rate = if bottleneck > ERROR_KNEE {
            ((bottleneck - ERROR_KNEE) * 100.0).min(100.0)
        } else {
            0.0
        };

        Self {
            app_load,
            cache_efficiency,
            traffic_to_db,
            db_load,
            cache_load,
            bottleneck,
            bottleneck_tier,
            raw_latency,
            raw_error_rate,
        }
    }

    /// Stability predicate, evaluated on raw values.
    pub fn is_stable(&self, target_latency: f64) -> bool {
        self.raw_latency <= target_latency && self.raw_error_rate < 1.0
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// One raw (pre-smoothing) history entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub latency: f64,
    pub errors: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParticleStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParticleTarget {
    Cache,
    Database,
}

/// A request dot flowing across the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficParticle {
    pub id: u64,
    pub status: ParticleStatus,
    pub target: ParticleTarget,
    pub y_offset: f64,
}

/// Fire-and-forget notifications for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CapacityEvent {
    /// The system just went from unstable to stable
    Celebrate,

    /// The user committed a stable configuration
    Solved { message: String },
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub breakdown: LoadBreakdown,
    pub latency: f64,
    pub error_rate: f64,
    pub stable: bool,
    pub particle: Option<TrafficParticle>,
    pub events: Vec<CapacityEvent>,
}

/// Display state of the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySnapshot {
    pub scenario_name: String,
    pub description: String,
    pub knobs: Knobs,
    pub target_latency: f64,
    pub latency: f64,
    pub error_rate: f64,
    pub success_capacity: i64,
    pub stable: bool,
    pub status: &'static str,
    pub history: Vec<Sample>,
    pub particles: Vec<TrafficParticle>,
}

/// Fixed-tick capacity simulation.
pub struct CapacitySimulator {
    scenario: Scenario,
    knobs: Knobs,
    latency: f64,
    error_rate: f64,
    stable: bool,
    was_stable: bool,
    last: Option<LoadBreakdown>,
    history: VecDeque<Sample>,
    particles: VecDeque<TrafficParticle>,
    next_particle_id: u64,
    rng: ChaCha8Rng,
    ticks: u64,
}

impl CapacitySimulator {
    /// Creates a simulator at the scenario's starting knobs.
    pub fn new(scenario: Scenario, rng: ChaCha8Rng) -> Self {
        Self {
            knobs: scenario.initial_knobs(),
            scenario,
            latency: BASE_LATENCY_MS,
            error_rate: 0.0,
            stable: true,
            was_stable: true,
            last: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
            particles: VecDeque::with_capacity(PARTICLE_LEN),
            next_particle_id: 0,
            rng,
            ticks: 0,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Switches to another scenario.
    ///
    /// Knobs return to the scenario's initial values and history is cleared.
    /// The smoothed outputs carry over.
    pub fn load_scenario(&mut self, scenario: Scenario) {
        info!("Loading capacity scenario: {}", scenario.scenario_name);
        self.knobs = scenario.initial_knobs();
        self.scenario = scenario;
        self.history.clear();
        self.was_stable = true;
    }

    pub fn knobs(&self) -> &Knobs {
        &self.knobs
    }

    /// Mutable access for the input boundary.
    pub fn knobs_mut(&mut self) -> &mut Knobs {
        &mut self.knobs
    }

    /// Replaces all knobs without clamping.
    pub fn set_knobs(&mut self, knobs: Knobs) {
        self.knobs = knobs;
    }

    /// Smoothed latency in ms.
    pub fn latency(&self) -> f64 {
        self.latency
    }

    /// Smoothed error rate in percent.
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Stability decided on the last tick.
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Percentage of requests succeeding, as displayed.
    pub fn success_capacity(&self) -> i64 {
        (100.0 - self.error_rate).round() as i64
    }

    pub fn status_label(&self) -> &'static str {
        if self.stable {
            "STATUS: OPTIMIZED"
        } else {
            "STATUS: CRITICAL"
        }
    }

    /// Raw samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Flow particles, oldest first.
    pub fn particles(&self) -> impl Iterator<Item = &TrafficParticle> {
        self.particles.iter()
    }

    /// Breakdown computed on the last tick.
    pub fn last_breakdown(&self) -> Option<&LoadBreakdown> {
        self.last.as_ref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one simulation tick.
    pub fn tick(&mut self) -> TickReport {
        let breakdown = LoadBreakdown::evaluate(&self.knobs);

        self.latency = LATENCY_SMOOTHING * self.latency
            + (1.0 - LATENCY_SMOOTHING) * breakdown.raw_latency;
        self.error_rate =
            ERROR_SMOOTHING * self.error_rate + (1.0 - ERROR_SMOOTHING) * breakdown.raw_error_rate;

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(Sample {
            latency: breakdown.raw_latency,
            errors: breakdown.raw_error_rate,
        });

        let stable = breakdown.is_stable(self.scenario.target_latency);
        let mut events = Vec::new();
        if stable && !self.was_stable {
            info!(
                "System stabilized at {:.0}ms (raw {:.0}ms)",
                self.latency, breakdown.raw_latency
            );
            events.push(CapacityEvent::Celebrate);
        }
        self.stable = stable;
        self.was_stable = stable;

        let particle = self.spawn_particle(&breakdown);

        self.ticks += 1;
        self.last = Some(breakdown);
        debug!(
            tick = self.ticks,
            bottleneck = breakdown.bottleneck,
            raw_latency = breakdown.raw_latency,
            stable,
            "capacity tick"
        );

        TickReport {
            tick: self.ticks,
            breakdown,
            latency: self.latency,
            error_rate: self.error_rate,
            stable,
            particle,
            events,
        }
    }

    fn spawn_particle(&mut self, breakdown: &LoadBreakdown) -> Option<TrafficParticle> {
        if self.rng.gen::<f64>() >= PARTICLE_SPAWN_CHANCE {
            return None;
        }
        let status = if self.rng.gen::<f64>() * 100.0 > breakdown.raw_error_rate {
            ParticleStatus::Ok
        } else {
            ParticleStatus::Error
        };
        let target = if self.rng.gen::<f64>() < breakdown.cache_efficiency {
            ParticleTarget::Cache
        } else {
            ParticleTarget::Database
        };
        let particle = TrafficParticle {
            id: self.next_particle_id,
            status,
            target,
            y_offset: self.rng.gen::<f64>() * 40.0 - 20.0,
        };
        self.next_particle_id += 1;

        if self.particles.len() == PARTICLE_LEN {
            self.particles.pop_front();
        }
        self.particles.push_back(particle);
        Some(particle)
    }

    /// Commits the current configuration.
    ///
    /// Only allowed while stable. Returns the status message for the chat
    /// thread.
    pub fn solve(&self) -> Result<CapacityEvent, CapacityError> {
        if !self.stable {
            return Err(CapacityError::Unstable {
                latency: self.latency,
                error_rate: self.error_rate,
            });
        }
        let message = format!(
            "System Scaled! Replicas: {}, DB: {}, Cache: {}. Steady at {}ms.",
            self.knobs.replicas,
            self.knobs.db_capacity,
            self.knobs.cache_capacity,
            self.latency.round() as i64
        );
        info!("{}", message);
        Ok(CapacityEvent::Solved { message })
    }

    /// Captures the display state.
    pub fn snapshot(&self) -> CapacitySnapshot {
        CapacitySnapshot {
            scenario_name: self.scenario.scenario_name.clone(),
            description: self.scenario.description.clone(),
            knobs: self.knobs,
            target_latency: self.scenario.target_latency,
            latency: self.latency,
            error_rate: self.error_rate,
            success_capacity: self.success_capacity(),
            stable: self.stable,
            status: self.status_label(),
            history: self.history.iter().copied().collect(),
            particles: self.particles.iter().copied().collect(),
        }
    }
}

impl fmt::Debug for CapacitySimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacitySimulator")
            .field("scenario", &self.scenario.scenario_name)
            .field("knobs", &self.knobs)
            .field("latency", &self.latency)
            .field("error_rate", &self.error_rate)
            .field("stable", &self.stable)
            .field("ticks", &self.ticks)
            .finish()
    }
}

// =============================================================================
// TICK LOOP
// =============================================================================

/// Runs a simulator once per [`TICK_PERIOD`] of host time.
#[derive(Debug)]
pub struct CapacityLoop {
    simulator: CapacitySimulator,
    interval: Interval,
    cancel: CancelHandle,
    running: bool,
}

impl CapacityLoop {
    /// Wraps a simulator. The first tick fires one period after the first
    /// observed host time.
    pub fn new(simulator: CapacitySimulator) -> Self {
        Self {
            simulator,
            interval: Interval::new(TICK_PERIOD),
            cancel: CancelHandle::new(),
            running: true,
        }
    }

    /// Shares a cancellation handle with other loops.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn simulator(&self) -> &CapacitySimulator {
        &self.simulator
    }

    pub fn simulator_mut(&mut self) -> &mut CapacitySimulator {
        &mut self.simulator
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.cancel.is_cancelled()
    }

    /// Stops the loop. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Runs every tick that came due by host time `now`.
    pub fn advance(&mut self, now: Duration) -> Vec<TickReport> {
        if !self.is_running() {
            self.running = false;
            return Vec::new();
        }
        let due = self.interval.due(now);
        (0..due).map(|_| self.simulator.tick()).collect()
    }
}

impl Tickable for CapacityLoop {
    fn on_tick(&mut self, now: Duration) -> TickStatus {
        self.advance(now);
        if self.is_running() {
            TickStatus::Active
        } else {
            TickStatus::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn knobs(traffic: f64, replicas: u32, db: u32, cache: u32) -> Knobs {
        Knobs {
            traffic,
            replicas,
            db_capacity: db,
            cache_capacity: cache,
        }
    }

    fn simulator(knobs: Knobs, target: f64) -> CapacitySimulator {
        let scenario = Scenario::new("test", "")
            .with_knobs(knobs)
            .with_target_latency(target);
        CapacitySimulator::new(scenario, ChaCha8Rng::seed_from_u64(42))
    }

    #[test]
    fn test_overloaded_single_replica() {
        let b = LoadBreakdown::evaluate(&knobs(50.0, 1, 1, 0));

        assert_relative_eq!(b.app_load, 50.0 / 15.0);
        assert_relative_eq!(b.db_load, 2.5);
        assert_relative_eq!(b.cache_load, 0.0);
        assert_eq!(b.bottleneck_tier, Tier::App);
        assert_relative_eq!(
            b.raw_latency,
            20.0 + (50.0 / 15.0 - 0.7f64).powi(2) * 1000.0,
            epsilon = 1e-9
        );
        assert!(b.raw_latency > 6900.0);
        assert_relative_eq!(b.raw_error_rate, 100.0);
        assert!(!b.is_stable(100.0));
    }

    #[test]
    fn test_idle_fully_scaled_system() {
        let b = LoadBreakdown::evaluate(&knobs(10.0, 10, 10, 10));
        assert!(b.bottleneck <= 0.1);
        assert_relative_eq!(b.raw_latency, 20.0);
        assert_relative_eq!(b.raw_error_rate, 0.0);
        assert!(b.is_stable(20.0));
        assert!(b.is_stable(500.0));
        assert!(!b.is_stable(19.9));
    }

    #[test]
    fn test_cache_offloads_database() {
        let without = LoadBreakdown::evaluate(&knobs(100.0, 10, 2, 0));
        let with = LoadBreakdown::evaluate(&knobs(100.0, 10, 2, 5));

        assert_relative_eq!(with.cache_efficiency, 0.4);
        assert_relative_eq!(with.traffic_to_db, 60.0);
        assert!(with.db_load < without.db_load);
        assert_relative_eq!(with.cache_load, 100.0 / 250.0);
        assert_eq!(without.bottleneck_tier, Tier::Database);
    }

    #[test]
    fn test_smoothing() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        let raw = LoadBreakdown::evaluate(sim.knobs());

        let report = sim.tick();
        assert_relative_eq!(report.latency, 0.6 * 20.0 + 0.4 * raw.raw_latency);
        assert_relative_eq!(report.error_rate, 0.2 * 100.0);

        let report = sim.tick();
        let expected = 0.6 * (0.6 * 20.0 + 0.4 * raw.raw_latency) + 0.4 * raw.raw_latency;
        assert_relative_eq!(report.latency, expected);
        assert_relative_eq!(report.error_rate, 0.8 * 20.0 + 0.2 * 100.0);
    }

    #[test]
    fn test_stability_uses_raw_values() {
        // Start overloaded so the smoothed latency lags far behind
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        for _ in 0..5 {
            sim.tick();
        }
        assert!(!sim.is_stable());

        sim.set_knobs(knobs(10.0, 10, 10, 10));
        let report = sim.tick();

        assert!(report.stable);
        assert!(report.latency > 100.0, "smoothed latency still high");
        assert_eq!(report.events, vec![CapacityEvent::Celebrate]);

        // Only on the transition
        assert!(sim.tick().events.is_empty());
    }

    #[test]
    fn test_no_celebration_when_stable_from_start() {
        let mut sim = simulator(knobs(10.0, 10, 10, 10), 100.0);
        for _ in 0..10 {
            assert!(sim.tick().events.is_empty());
        }
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        for _ in 0..HISTORY_LEN {
            sim.tick();
        }
        sim.set_knobs(knobs(10.0, 10, 10, 10));
        for _ in 0..5 {
            sim.tick();
            assert!(sim.history_len() <= HISTORY_LEN);
        }

        assert_eq!(sim.history_len(), HISTORY_LEN);
        let samples: Vec<&Sample> = sim.history().collect();
        // The five newest are the calm ones, the oldest five overloaded ones are gone
        assert!(samples[..HISTORY_LEN - 5].iter().all(|s| s.latency > 6000.0));
        assert!(samples[HISTORY_LEN - 5..].iter().all(|s| s.latency == 20.0));
    }

    #[test]
    fn test_particles_are_bounded() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        let mut spawned = 0;
        for _ in 0..200 {
            if let Some(p) = sim.tick().particle {
                // Error rate is 100%, so nothing gets through
                assert_eq!(p.status, ParticleStatus::Error);
                assert_eq!(p.target, ParticleTarget::Database);
                assert!((-20.0..20.0).contains(&p.y_offset));
                spawned += 1;
            }
        }
        assert!(spawned > 100);
        assert_eq!(sim.particles().count(), PARTICLE_LEN);
    }

    #[test]
    fn test_load_scenario_resets_knobs_and_history() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        sim.knobs_mut().adjust(Knob::Replicas, 3);
        sim.tick();
        sim.tick();

        let next = Scenario::new("Black Friday", "Traffic spike").with_knobs(knobs(200.0, 2, 2, 0));
        sim.load_scenario(next);

        assert_eq!(sim.knobs(), &knobs(200.0, 2, 2, 0));
        assert_eq!(sim.history_len(), 0);
        assert_eq!(sim.scenario().scenario_name, "Black Friday");
        // Ticks keep counting across scenarios
        sim.tick();
        assert_eq!(sim.ticks(), 3);
    }

    #[test]
    fn test_knob_boundary_clamps_and_snaps() {
        let mut k = knobs(50.0, 1, 1, 0);
        k.set(Knob::Traffic, 263.0);
        assert_relative_eq!(k.traffic, 250.0);
        k.set(Knob::Traffic, 44.0);
        assert_relative_eq!(k.traffic, 40.0);
        k.set(Knob::Traffic, 1.0);
        assert_relative_eq!(k.traffic, 10.0);

        k.adjust(Knob::Replicas, -1);
        assert_eq!(k.replicas, 1);
        k.adjust(Knob::Replicas, 20);
        assert_eq!(k.replicas, 10);
        k.adjust(Knob::CacheCapacity, -1);
        assert_eq!(k.cache_capacity, 0);
        k.adjust(Knob::DbCapacity, 2);
        assert_eq!(k.db_capacity, 3);

        let wild = knobs(1000.0, 0, 99, 42).clamped();
        assert_eq!(wild, knobs(250.0, 1, 10, 10));
    }

    #[test]
    fn test_simulator_does_not_clamp() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        sim.set_knobs(knobs(1000.0, 0, 1, 0));
        let report = sim.tick();
        assert!(report.breakdown.app_load.is_infinite());
        assert_relative_eq!(report.breakdown.raw_error_rate, 100.0);
        assert!(!report.stable);
    }

    #[test]
    fn test_solve_requires_stability() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        sim.tick();
        assert!(matches!(sim.solve(), Err(CapacityError::Unstable { .. })));

        let mut sim = simulator(knobs(40.0, 4, 3, 2), 100.0);
        sim.tick();
        assert!(sim.is_stable());
        match sim.solve().unwrap() {
            CapacityEvent::Solved { message } => {
                assert_eq!(message, "System Scaled! Replicas: 4, DB: 3, Cache: 2. Steady at 20ms.");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_props_defaults() {
        let scenario = Scenario::from_props_json(
            r#"{"scenarioName": "Launch Day", "description": "Scale it", "targetLatency": 150}"#,
        )
        .unwrap();
        assert_relative_eq!(scenario.initial_traffic, 50.0);
        assert_eq!(scenario.initial_replicas, 1);
        assert_eq!(scenario.initial_db_capacity, 1);
        assert_eq!(scenario.initial_cache_capacity, 0);
        assert_relative_eq!(scenario.target_latency, 150.0);
    }

    #[test]
    fn test_loop_ticks_every_200ms() {
        let sim = simulator(knobs(10.0, 10, 10, 10), 100.0);
        let mut tick_loop = CapacityLoop::new(sim);

        // 60 Hz frames for two seconds
        for frame in 0..=120u64 {
            tick_loop.on_tick(Duration::from_micros(frame * 16_667));
        }
        assert_eq!(tick_loop.simulator().ticks(), 10);
    }

    #[test]
    fn test_loop_cancel_stops_ticks() {
        let cancel = CancelHandle::new();
        let sim = simulator(knobs(10.0, 10, 10, 10), 100.0);
        let mut tick_loop = CapacityLoop::new(sim).with_cancel(cancel.clone());

        tick_loop.on_tick(Duration::ZERO);
        tick_loop.on_tick(Duration::from_millis(400));
        assert_eq!(tick_loop.simulator().ticks(), 2);

        cancel.cancel();
        assert_eq!(tick_loop.on_tick(Duration::from_millis(1000)), TickStatus::Idle);
        assert_eq!(tick_loop.simulator().ticks(), 2);
    }

    #[test]
    fn test_snapshot_status() {
        let mut sim = simulator(knobs(50.0, 1, 1, 0), 100.0);
        assert_eq!(sim.snapshot().status, "STATUS: OPTIMIZED");
        sim.tick();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.status, "STATUS: CRITICAL");
        assert_eq!(snapshot.success_capacity, 80);
        assert_eq!(snapshot.history.len(), 1);
    }
}
