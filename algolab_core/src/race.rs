//! Two-lane sorting race.
//!
//! A race runs two [`StepEngine`]s on identical datasets, one after the
//! other: lane A runs to completion, and only then does lane B's clock start.
//! Both lanes are advanced from the host's frame callback; nothing here
//! blocks or owns a timer.
//!
//! ```text
//!  start(t0)          A finishes at t1              B finishes at t2
//!     │ A: step step step ... done │ B: step step ... done │
//!     └──────── elapsed A ─────────┴────── elapsed B ──────┘
//! ```

use crate::cue::cue_for_step;
use crate::error::{ConfigError, LabError};
use crate::schedule::{CancelHandle, TickStatus, Tickable};
use crate::sort_engine::{random_dataset, SortAlgorithm, Step, StepEngine};

use algolab_env::{AudioRoute, Cue};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default dataset length.
pub const DEFAULT_DATA_SIZE: usize = 50;

/// Largest dataset a race accepts.
pub const MAX_DATA_SIZE: usize = 10_000;

fn default_data_size() -> usize {
    DEFAULT_DATA_SIZE
}

fn default_speed_divisor() -> u32 {
    1
}

/// Race configuration, as supplied by the component props.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceConfig {
    /// Algorithm for lane A
    pub algo_a: SortAlgorithm,

    /// Algorithm for lane B
    pub algo_b: SortAlgorithm,

    /// Number of bars in each lane
    #[serde(default = "default_data_size")]
    pub data_size: usize,

    /// Frames per step (1 = one step every frame)
    #[serde(default = "default_speed_divisor")]
    pub speed_divisor: u32,

    /// Start with cues suppressed
    #[serde(default)]
    pub muted: bool,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            algo_a: SortAlgorithm::Bubble,
            algo_b: SortAlgorithm::Quick,
            data_size: DEFAULT_DATA_SIZE,
            speed_divisor: 1,
            muted: false,
        }
    }
}

impl RaceConfig {
    /// Creates a config racing `algo_a` against `algo_b`.
    pub fn new(algo_a: SortAlgorithm, algo_b: SortAlgorithm) -> Self {
        Self {
            algo_a,
            algo_b,
            ..Default::default()
        }
    }

    /// Sets the dataset length.
    pub fn with_data_size(mut self, data_size: usize) -> Self {
        self.data_size = data_size;
        self
    }

    /// Sets the speed divisor.
    pub fn with_speed_divisor(mut self, divisor: u32) -> Self {
        self.speed_divisor = divisor;
        self
    }

    /// Sets the initial mute state.
    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    /// Checks the config can drive a race.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_size == 0 {
            return Err(ConfigError::ZeroDataSize);
        }
        if self.data_size > MAX_DATA_SIZE {
            return Err(ConfigError::DataSizeTooLarge {
                size: self.data_size,
                max: MAX_DATA_SIZE,
            });
        }
        if self.speed_divisor == 0 {
            return Err(ConfigError::ZeroSpeedDivisor);
        }
        Ok(())
    }

    /// Parses and validates `{algoA, algoB, dataSize}` props.
    pub fn from_props_json(json: &str) -> Result<Self, LabError> {
        let config: RaceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Which side of the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneId {
    A,
    B,
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneId::A => write!(f, "A"),
            LaneId::B => write!(f, "B"),
        }
    }
}

/// Picks the winner of a race.
///
/// A lane wins only when both lanes are finished and its elapsed time is
/// strictly smaller. Ties have no winner.
pub fn decide_winner(
    finished_a: bool,
    elapsed_a: Duration,
    finished_b: bool,
    elapsed_b: Duration,
) -> Option<LaneId> {
    if !(finished_a && finished_b) {
        return None;
    }
    if elapsed_a < elapsed_b {
        Some(LaneId::A)
    } else if elapsed_b < elapsed_a {
        Some(LaneId::B)
    } else {
        None
    }
}

// =============================================================================
// LANES
// =============================================================================

enum LaneAdvance {
    /// Driver loop not running
    Idle,
    /// Loop running, but this frame is throttled by the speed divisor
    Throttled,
    Stepped(Step),
    Finished,
}

/// One side of the race: a displayed dataset, an engine run and a clock.
#[derive(Debug)]
pub struct Lane {
    id: LaneId,
    algorithm: SortAlgorithm,
    data: Vec<u32>,
    active: Vec<usize>,
    elapsed: Duration,
    finished: bool,
    started_at: Option<Duration>,
    engine: Option<StepEngine>,
    looping: bool,
    frame_count: u64,
    steps_consumed: u64,
}

impl Lane {
    fn new(id: LaneId, algorithm: SortAlgorithm) -> Self {
        Self {
            id,
            algorithm,
            data: Vec::new(),
            active: Vec::new(),
            elapsed: Duration::ZERO,
            finished: false,
            started_at: None,
            engine: None,
            looping: false,
            frame_count: 0,
            steps_consumed: 0,
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn algorithm(&self) -> SortAlgorithm {
        self.algorithm
    }

    /// The dataset as currently displayed.
    pub fn data(&self) -> &[u32] {
        &self.data
    }

    /// Indices touched by the most recent step.
    pub fn active_indices(&self) -> &[usize] {
        &self.active
    }

    /// Time since this lane's clock started.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true while the lane's driver loop is scheduled.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Steps pulled in the current run.
    pub fn steps_consumed(&self) -> u64 {
        self.steps_consumed
    }

    fn reseed(&mut self, data: Vec<u32>) {
        self.data = data;
        self.active.clear();
        self.elapsed = Duration::ZERO;
        self.finished = false;
        self.started_at = None;
        self.engine = None;
        self.looping = false;
        self.frame_count = 0;
        self.steps_consumed = 0;
    }

    /// Seeds a fresh engine from a copy of the displayed data.
    fn arm(&mut self) {
        let data = self.data.clone();
        self.reseed(data);
        self.engine = Some(StepEngine::new(self.algorithm, &self.data));
    }

    /// Starts the lane's clock and driver loop.
    fn begin(&mut self, now: Duration) {
        self.started_at = Some(now);
        self.elapsed = Duration::ZERO;
        self.frame_count = 0;
        self.looping = true;
    }

    fn stop(&mut self) {
        self.looping = false;
    }

    fn advance(&mut self, now: Duration, divisor: u64) -> LaneAdvance {
        if !self.looping {
            return LaneAdvance::Idle;
        }
        if let Some(start) = self.started_at {
            self.elapsed = now.saturating_sub(start);
        }

        let due = self.frame_count % divisor == 0;
        self.frame_count += 1;
        if !due {
            return LaneAdvance::Throttled;
        }

        match self.engine.as_mut().and_then(Iterator::next) {
            Some(step) => {
                self.steps_consumed += 1;
                self.active.clear();
                self.active.extend_from_slice(step.indices());
                if let Some(snapshot) = step.snapshot() {
                    self.data.clear();
                    self.data.extend_from_slice(snapshot);
                }
                LaneAdvance::Stepped(step)
            }
            None => {
                self.finished = true;
                self.active.clear();
                self.engine = None;
                self.looping = false;
                LaneAdvance::Finished
            }
        }
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Something the rendering collaborator may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaceEvent {
    /// A lane's clock started from the completion hook of the lane before it
    LaneStarted { lane: LaneId },

    /// A lane's engine ran out of steps
    LaneFinished { lane: LaneId, elapsed: Duration },

    /// Both lanes are finished
    RaceFinished { winner: Option<LaneId> },
}

/// A cue produced during a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CueRecord {
    pub lane: LaneId,
    pub cue: Cue,

    /// False when the audio output was unavailable or suspended
    pub played: bool,
}

/// Everything that happened during one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub cues: Vec<CueRecord>,
    pub events: Vec<RaceEvent>,
}

/// Display state of one lane.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSnapshot {
    pub label: String,
    pub data: Vec<u32>,
    pub active_indices: Vec<usize>,
    pub elapsed_ms: f64,
    pub finished: bool,
    pub winner: bool,
}

/// Display state of the whole race.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSnapshot {
    pub lane_a: LaneSnapshot,
    pub lane_b: LaneSnapshot,
    pub running: bool,
    pub muted: bool,
    pub start_enabled: bool,
    pub summary: String,
}

/// Drives two lanes under a shared frame cadence.
pub struct RaceScheduler {
    config: RaceConfig,
    lane_a: Lane,
    lane_b: Lane,
    running: bool,
    muted: bool,
    race_reported: bool,
    audio: AudioRoute,
    rng: ChaCha8Rng,
    cancel: CancelHandle,
    total_steps: u64,
}

impl RaceScheduler {
    /// Creates a race and generates its first dataset.
    ///
    /// `config` is used as given; call [`RaceConfig::validate`] first when it
    /// comes from outside. A zero speed divisor is treated as 1 and a data size
    /// above [`MAX_DATA_SIZE`] is capped.
    pub fn new(mut config: RaceConfig, rng: ChaCha8Rng) -> Self {
        if config.data_size > MAX_DATA_SIZE {
            warn!("dataSize {} capped at {}", config.data_size, MAX_DATA_SIZE);
            config.data_size = MAX_DATA_SIZE;
        }
        let mut scheduler = Self {
            lane_a: Lane::new(LaneId::A, config.algo_a),
            lane_b: Lane::new(LaneId::B, config.algo_b),
            running: false,
            muted: config.muted,
            race_reported: false,
            audio: AudioRoute::default(),
            rng,
            cancel: CancelHandle::new(),
            total_steps: 0,
            config,
        };
        scheduler.generate_data();
        scheduler
    }

    /// Routes cues somewhere other than the process-wide output.
    pub fn with_audio(mut self, audio: AudioRoute) -> Self {
        self.audio = audio;
        self
    }

    /// Shares a cancellation handle with other loops.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Returns a lane.
    pub fn lane(&self, id: LaneId) -> &Lane {
        match id {
            LaneId::A => &self.lane_a,
            LaneId::B => &self.lane_b,
        }
    }

    /// Returns true between `start` and the next `generate_data`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn both_finished(&self) -> bool {
        self.lane_a.finished && self.lane_b.finished
    }

    /// Steps pulled by either lane since this scheduler was created.
    pub fn total_steps_consumed(&self) -> u64 {
        self.total_steps
    }

    pub fn winner(&self) -> Option<LaneId> {
        decide_winner(
            self.lane_a.finished,
            self.lane_a.elapsed,
            self.lane_b.finished,
            self.lane_b.elapsed,
        )
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Flips the mute state and returns the new value.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Footer line shown under the race.
    pub fn summary(&self) -> String {
        format!(
            "Comparing {} vs {} with {} elements",
            self.config.algo_a, self.config.algo_b, self.config.data_size
        )
    }

    /// Returns true when the start control should be enabled.
    pub fn can_start(&self) -> bool {
        !(self.running && !self.both_finished())
    }

    /// Resets the race onto a fresh random dataset.
    ///
    /// Stops both lanes' loops, gives both lanes the same new data, and
    /// zeroes all timers and flags.
    pub fn generate_data(&mut self) {
        self.lane_a.stop();
        self.lane_b.stop();

        let data = random_dataset(&mut self.rng, self.config.data_size);
        self.lane_a.reseed(data.clone());
        self.lane_b.reseed(data);
        self.running = false;
        self.race_reported = false;

        debug!(size = self.config.data_size, "Generated race data");
    }

    /// Starts the race at host time `now`.
    ///
    /// Returns false (and changes nothing) while a race is in progress.
    pub fn start(&mut self, now: Duration) -> bool {
        if !self.can_start() {
            debug!("Start ignored: race already in progress");
            return false;
        }
        if self.cancel.is_cancelled() {
            warn!("Start ignored: race was cancelled");
            return false;
        }

        self.running = true;
        self.race_reported = false;
        self.lane_a.arm();
        self.lane_b.arm();
        self.lane_a.begin(now);

        info!(
            "Race started: {} vs {} ({} elements)",
            self.config.algo_a, self.config.algo_b, self.config.data_size
        );
        true
    }

    /// Stops both lanes' loops. Idempotent; leaves the data in place.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.lane_a.stop();
        self.lane_b.stop();
    }

    /// Advances the race by one display frame.
    pub fn on_frame(&mut self, now: Duration) -> FrameReport {
        let mut report = FrameReport::default();
        if self.cancel.is_cancelled() {
            self.lane_a.stop();
            self.lane_b.stop();
            return report;
        }

        let divisor = u64::from(self.config.speed_divisor.max(1));
        // B only steps on frames after the one in which it was started
        let b_was_looping = self.lane_b.looping;

        match self.lane_a.advance(now, divisor) {
            LaneAdvance::Stepped(step) => {
                self.total_steps += 1;
                self.emit_cue(LaneId::A, &step, &mut report);
            }
            LaneAdvance::Finished => {
                self.on_lane_finished(LaneId::A, &mut report);
                self.lane_b.begin(now);
                report.events.push(RaceEvent::LaneStarted { lane: LaneId::B });
                debug!("Lane B started at {:?}", now);
            }
            LaneAdvance::Idle | LaneAdvance::Throttled => {}
        }

        if b_was_looping {
            match self.lane_b.advance(now, divisor) {
                LaneAdvance::Stepped(step) => {
                    self.total_steps += 1;
                    self.emit_cue(LaneId::B, &step, &mut report);
                }
                LaneAdvance::Finished => self.on_lane_finished(LaneId::B, &mut report),
                LaneAdvance::Idle | LaneAdvance::Throttled => {}
            }
        }

        if self.running && self.both_finished() && !self.race_reported {
            self.race_reported = true;
            let winner = self.winner();
            report.events.push(RaceEvent::RaceFinished { winner });
            match winner {
                Some(lane) => info!(
                    "Race finished: lane {} ({}) wins, {:?} vs {:?}",
                    lane,
                    self.lane(lane).algorithm,
                    self.lane_a.elapsed,
                    self.lane_b.elapsed
                ),
                None => info!("Race finished: tie at {:?}", self.lane_a.elapsed),
            }
        }

        report
    }

    fn on_lane_finished(&mut self, lane: LaneId, report: &mut FrameReport) {
        let finished = self.lane(lane);
        let elapsed = finished.elapsed;
        debug!(
            "Lane {} ({}) finished after {} steps in {:?}",
            lane, finished.algorithm, finished.steps_consumed, elapsed
        );
        report.events.push(RaceEvent::LaneFinished { lane, elapsed });
    }

    fn emit_cue(&mut self, lane: LaneId, step: &Step, report: &mut FrameReport) {
        if self.muted {
            return;
        }
        let Some(cue) = cue_for_step(step, self.lane(lane).data()) else {
            return;
        };
        let played = match self.audio.play(&cue) {
            Ok(()) => true,
            Err(e) => {
                trace!("Cue skipped: {}", e);
                false
            }
        };
        report.cues.push(CueRecord { lane, cue, played });
    }

    fn lane_snapshot(&self, id: LaneId) -> LaneSnapshot {
        let lane = self.lane(id);
        LaneSnapshot {
            label: lane.algorithm.name().to_string(),
            data: lane.data.clone(),
            active_indices: lane.active.clone(),
            elapsed_ms: lane.elapsed.as_secs_f64() * 1000.0,
            finished: lane.finished,
            winner: self.winner() == Some(id),
        }
    }

    /// Captures the display state for the rendering collaborator.
    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            lane_a: self.lane_snapshot(LaneId::A),
            lane_b: self.lane_snapshot(LaneId::B),
            running: self.running,
            muted: self.muted,
            start_enabled: self.can_start(),
            summary: self.summary(),
        }
    }
}

impl Tickable for RaceScheduler {
    fn on_tick(&mut self, now: Duration) -> TickStatus {
        self.on_frame(now);
        if self.lane_a.looping || self.lane_b.looping {
            TickStatus::Active
        } else {
            TickStatus::Idle
        }
    }
}

impl fmt::Debug for RaceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaceScheduler")
            .field("config", &self.config)
            .field("lane_a", &self.lane_a)
            .field("lane_b", &self.lane_b)
            .field("running", &self.running)
            .field("muted", &self.muted)
            .finish()
    }
}
