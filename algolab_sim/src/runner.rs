//! Scenario runner - drives the engines frame by frame and checks them.

use crate::context::SimContext;
use crate::driver::{DriveOutcome, FrameDriver, SimConfig};
use crate::error::{ensure, SimError};
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::{self, ScenarioId};
use crate::sink::RecordingSink;

use algolab_core::capacity::{
    CapacityEvent, CapacityLoop, CapacitySimulator, Knob, ParticleTarget, Scenario, Tier,
    TickReport, HISTORY_LEN,
};
use algolab_core::race::{FrameReport, RaceEvent};
use algolab_core::{CapacityError, LaneId, RaceConfig, RaceScheduler, SortAlgorithm};
use algolab_env::{AudioRoute, LabContext, SinkState};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RNG stream for race datasets.
pub const RACE_STREAM: u64 = 0x9e3779b97f4a7c15;

/// RNG stream for traffic particles.
pub const CAPACITY_STREAM: u64 = 0x517cc1b727220a95;

/// How long a props-driven capacity session runs.
pub const SCALER_PROPS_DURATION: Duration = Duration::from_secs(10);

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total frames delivered
    pub total_frames: u64,

    /// Final host time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Recorded frames, when recording was requested
    pub export: Option<SimExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Sort steps pulled by any lane
    pub steps_consumed: u64,

    /// Cues produced by races
    pub cues_emitted: u64,

    /// Cues accepted by the audio output
    pub cues_played: u64,

    /// Races that reported a result
    pub races_finished: u64,

    /// Winner of the last finished race
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<LaneId>,

    /// Capacity simulator ticks
    pub capacity_ticks: u64,

    /// Unstable to stable transitions
    pub celebrations: u64,

    /// Highest smoothed latency seen (ms)
    pub max_latency_ms: f64,
}

/// Runs named scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Export every Nth frame
    record_every: Option<u64>,

    /// Where race cues go (default: a fresh recording sink per run)
    audio: Option<AudioRoute>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            config: SimConfig {
                seed,
                ..Default::default()
            },
            record_every: None,
            audio: None,
        }
    }

    /// Sets the frame rate.
    pub fn with_frame_rate(mut self, hz: u32) -> Self {
        self.config.frame_rate_hz = hz;
        self
    }

    /// Sets the frame jitter standard deviation.
    pub fn with_jitter(mut self, std_dev_ms: f64) -> Self {
        self.config.frame_jitter_ms = std_dev_ms;
        self
    }

    /// Sets the frame cap.
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.config.max_frames = frames;
        self
    }

    /// Records every `every`-th frame into the result's export.
    pub fn with_recording(mut self, every: u64) -> Self {
        self.record_every = Some(every.max(1));
        self
    }

    /// Sends race cues to `audio` instead of a recording sink.
    pub fn with_audio(mut self, audio: AudioRoute) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn session<Ctx: LabContext>(&self, ctx: Arc<Ctx>, name: &str) -> Session<Ctx> {
        let audio = self
            .audio
            .clone()
            .unwrap_or_else(|| AudioRoute::Sink(RecordingSink::shared()));
        Session::new(ctx, &self.config, name, self.record_every, audio)
    }

    /// Runs a scenario on a virtual clock.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_in(SimContext::shared(self.config.seed), scenario)
            .await
    }

    /// Runs a scenario against any context.
    pub async fn run_in<Ctx: LabContext>(
        &self,
        ctx: Arc<Ctx>,
        scenario: ScenarioId,
    ) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={})",
            scenario.name(),
            self.config.seed
        );
        debug!("  {}", scenario.description());

        let mut session = self.session(ctx, scenario.name());
        let outcome = match scenario {
            ScenarioId::AllPairs => run_all_pairs(&mut session).await,
            ScenarioId::SlowMotion => run_slow_motion(&mut session, scenario).await,
            ScenarioId::ResetMidRace => run_reset_mid_race(&mut session, scenario).await,
            ScenarioId::AudioFallback => run_audio_fallback(&mut session, scenario).await,
            ScenarioId::Unmount => run_unmount(&mut session, scenario).await,
            ScenarioId::Replay => run_replay(&mut session, &self.config).await,
            ScenarioId::LaunchDay => run_launch_day(&mut session).await,
            ScenarioId::CacheRescue => run_cache_rescue(&mut session).await,
            ScenarioId::FlashCrowd => run_flash_crowd(&mut session).await,
            ScenarioId::ScenarioSwitch => run_scenario_switch(&mut session).await,
            ScenarioId::BubbleVsQuick | ScenarioId::MergeVsSelection => {
                run_preset_race(&mut session, scenario).await
            }
        };
        session.finish(outcome)
    }

    /// Runs one race from AlgoRace props.
    pub async fn run_race_props<Ctx: LabContext>(
        &self,
        ctx: Arc<Ctx>,
        config: RaceConfig,
    ) -> ScenarioResult {
        info!("Starting race from props: {}", summarize(&config));
        let mut session = self.session(ctx, "race_props");
        let outcome = match config.validate() {
            Ok(()) => run_race(&mut session, config).await.map(|_| ()),
            Err(e) => Err(SimError::Lab(e.into())),
        };
        session.finish(outcome)
    }

    /// Runs a capacity session from SystemScaler props.
    pub async fn run_scaler_props<Ctx: LabContext>(
        &self,
        ctx: Arc<Ctx>,
        scenario: Scenario,
    ) -> ScenarioResult {
        info!("Starting capacity session from props: {}", scenario.scenario_name);
        let mut session = self.session(ctx, "scaler_props");
        let outcome = run_scaler(&mut session, scenario).await;
        session.finish(outcome)
    }
}

fn summarize(config: &RaceConfig) -> String {
    format!(
        "{} vs {} ({} elements)",
        config.algo_a, config.algo_b, config.data_size
    )
}

// =============================================================================
// SESSION
// =============================================================================

/// State shared by every step of one scenario run.
struct Session<Ctx: LabContext> {
    name: String,
    seed: u64,
    driver: FrameDriver<Ctx>,
    audio: AudioRoute,
    metrics: ScenarioMetrics,
    export: Option<SimExport>,
    record_every: u64,
    pending: Vec<SimEvent>,
}

impl<Ctx: LabContext> Session<Ctx> {
    fn new(
        ctx: Arc<Ctx>,
        config: &SimConfig,
        name: &str,
        record_every: Option<u64>,
        audio: AudioRoute,
    ) -> Self {
        Self {
            name: name.to_string(),
            seed: config.seed,
            driver: FrameDriver::new(ctx, config),
            audio,
            metrics: ScenarioMetrics::default(),
            export: record_every.map(|_| SimExport::new(name, config.seed)),
            record_every: record_every.unwrap_or(u64::MAX),
            pending: Vec::new(),
        }
    }

    fn ctx(&self) -> &Arc<Ctx> {
        self.driver.context()
    }

    fn now(&self) -> Duration {
        self.driver.now()
    }

    fn race(&self, config: RaceConfig) -> RaceScheduler {
        RaceScheduler::new(config, self.ctx().derive_rng(RACE_STREAM))
            .with_audio(self.audio.clone())
    }

    fn capacity(&self, scenario: Scenario) -> CapacityLoop {
        CapacityLoop::new(CapacitySimulator::new(
            scenario,
            self.ctx().derive_rng(CAPACITY_STREAM),
        ))
    }

    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.pending.push(SimEvent::Note { message });
    }

    async fn next_frame(&mut self) -> Result<Duration, SimError> {
        let now = self.driver.next_frame().await?;
        if self.driver.frames() % 60 == 0 {
            debug!("  frame={} t={:.2}s", self.driver.frames(), now.as_secs_f64());
        }
        Ok(now)
    }

    fn absorb_race(&mut self, report: &FrameReport) {
        self.metrics.cues_emitted += report.cues.len() as u64;
        self.metrics.cues_played += report.cues.iter().filter(|c| c.played).count() as u64;
        for event in &report.events {
            if let RaceEvent::RaceFinished { winner } = event {
                self.metrics.races_finished += 1;
                self.metrics.winner = *winner;
            }
            self.pending.push(SimEvent::Race { event: *event });
        }
    }

    fn absorb_ticks(&mut self, ticks: &[TickReport]) {
        self.metrics.capacity_ticks += ticks.len() as u64;
        for tick in ticks {
            self.metrics.max_latency_ms = self.metrics.max_latency_ms.max(tick.latency);
            for event in &tick.events {
                if *event == CapacityEvent::Celebrate {
                    self.metrics.celebrations += 1;
                }
                self.pending.push(SimEvent::Capacity {
                    event: event.clone(),
                });
            }
        }
    }

    fn record(&mut self, race: Option<&RaceScheduler>, capacity: Option<&CapacitySimulator>) {
        let Some(export) = self.export.as_mut() else {
            self.pending.clear();
            return;
        };
        let frame = self.driver.frames();
        if frame % self.record_every != 0 {
            return;
        }
        export.add_frame(SimFrame {
            time_sec: self.driver.now().as_secs_f64(),
            frame,
            race: race.map(RaceScheduler::snapshot),
            capacity: capacity.map(CapacitySimulator::snapshot),
            events: std::mem::take(&mut self.pending),
        });
    }

    /// Advances a race by one frame and checks lane sequencing.
    async fn race_frame(&mut self, race: &mut RaceScheduler) -> Result<FrameReport, SimError> {
        let now = self.next_frame().await?;
        let before = race.total_steps_consumed();
        let report = race.on_frame(now);
        self.metrics.steps_consumed += race.total_steps_consumed() - before;
        self.absorb_race(&report);
        self.record(Some(&*race), None);

        ensure(
            race.lane(LaneId::B).steps_consumed() == 0 || race.lane(LaneId::A).is_finished(),
            || "lane B stepped before lane A finished".to_string(),
        )?;
        Ok(report)
    }

    /// Runs frames until neither lane's loop is scheduled.
    async fn race_to_finish(
        &mut self,
        race: &mut RaceScheduler,
    ) -> Result<Vec<RaceEvent>, SimError> {
        let mut events = Vec::new();
        loop {
            let report = self.race_frame(race).await?;
            events.extend(report.events);
            if !race.lane(LaneId::A).is_looping() && !race.lane(LaneId::B).is_looping() {
                return Ok(events);
            }
        }
    }

    /// Runs the capacity loop for `duration` of host time.
    async fn capacity_for(
        &mut self,
        tick_loop: &mut CapacityLoop,
        duration: Duration,
    ) -> Result<Vec<TickReport>, SimError> {
        let until = self.now() + duration;
        let mut reports = Vec::new();
        while self.now() < until {
            let now = self.next_frame().await?;
            let ticks = tick_loop.advance(now);
            self.absorb_ticks(&ticks);
            self.record(None, Some(tick_loop.simulator()));
            reports.extend(ticks);
        }
        Ok(reports)
    }

    fn finish(mut self, outcome: Result<(), SimError>) -> ScenarioResult {
        let failure_reason = outcome.err().map(|e| e.to_string());
        let passed = failure_reason.is_none();
        if let Some(reason) = &failure_reason {
            warn!("Scenario {} failed: {}", self.name, reason);
        }
        if let Some(export) = self.export.as_mut() {
            export.finalize(passed, failure_reason.clone());
        }

        ScenarioResult {
            scenario: self.name,
            seed: self.seed,
            passed,
            total_frames: self.driver.frames(),
            final_time_secs: self.driver.now().as_secs_f64(),
            failure_reason,
            metrics: self.metrics,
            export: self.export,
        }
    }
}

// =============================================================================
// RACE SCENARIOS
// =============================================================================

fn is_sorted(data: &[u32]) -> bool {
    data.windows(2).all(|w| w[0] <= w[1])
}

fn sorted_copy(data: &[u32]) -> Vec<u32> {
    let mut sorted = data.to_vec();
    sorted.sort_unstable();
    sorted
}

fn preset(scenario: ScenarioId) -> Result<RaceConfig, SimError> {
    scenario
        .race_config()
        .ok_or_else(|| SimError::Assertion(format!("{} has no race preset", scenario)))
}

/// Runs one race to the end and checks the result.
async fn run_race<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    config: RaceConfig,
) -> Result<RaceScheduler, SimError> {
    let mut race = s.race(config);
    let original = race.lane(LaneId::A).data().to_vec();
    ensure(race.lane(LaneId::B).data() == original.as_slice(), || {
        "lanes started on different data".to_string()
    })?;

    ensure(race.start(s.now()), || "race refused to start".to_string())?;
    let events = s.race_to_finish(&mut race).await?;

    ensure(race.both_finished(), || "race ended without both lanes finishing".to_string())?;
    let expected = sorted_copy(&original);
    for lane in [LaneId::A, LaneId::B] {
        ensure(race.lane(lane).data() == expected.as_slice(), || {
            format!("lane {} is not a sorted permutation", lane)
        })?;
        ensure(race.lane(lane).active_indices().is_empty(), || {
            format!("lane {} kept active indices after finishing", lane)
        })?;
    }

    let a_done = events
        .iter()
        .position(|e| matches!(e, RaceEvent::LaneFinished { lane: LaneId::A, .. }));
    let b_start = events
        .iter()
        .position(|e| matches!(e, RaceEvent::LaneStarted { lane: LaneId::B }));
    ensure(matches!((a_done, b_start), (Some(a), Some(b)) if a < b), || {
        "lane B did not start from lane A's completion".to_string()
    })?;

    let results: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RaceEvent::RaceFinished { winner } => Some(*winner),
            _ => None,
        })
        .collect();
    ensure(results == vec![race.winner()], || {
        format!("expected one race result, got {:?}", results)
    })?;

    debug!(
        "  {} {:?} vs {} {:?}",
        config_label(&race, LaneId::A),
        race.lane(LaneId::A).elapsed(),
        config_label(&race, LaneId::B),
        race.lane(LaneId::B).elapsed()
    );
    Ok(race)
}

fn config_label(race: &RaceScheduler, lane: LaneId) -> &'static str {
    race.lane(lane).algorithm().name()
}

async fn run_preset_race<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: ScenarioId,
) -> Result<(), SimError> {
    let race = run_race(s, preset(scenario)?).await?;

    // Quadratic lanes lose to n log n lanes at these sizes
    let expected = match scenario {
        ScenarioId::BubbleVsQuick => Some(LaneId::B),
        ScenarioId::MergeVsSelection => Some(LaneId::A),
        _ => None,
    };
    if expected.is_some() {
        ensure(race.winner() == expected, || {
            format!("expected winner {:?}, got {:?}", expected, race.winner())
        })?;
    }
    Ok(())
}

async fn run_all_pairs<Ctx: LabContext>(s: &mut Session<Ctx>) -> Result<(), SimError> {
    for algo_a in SortAlgorithm::ALL {
        for algo_b in SortAlgorithm::ALL {
            let config = RaceConfig::new(algo_a, algo_b).with_data_size(12);
            let race = run_race(s, config).await?;
            if algo_a == algo_b {
                let (a, b) = (race.lane(LaneId::A), race.lane(LaneId::B));
                ensure(a.steps_consumed() == b.steps_consumed(), || {
                    format!(
                        "{} took {} steps in lane A but {} in lane B",
                        algo_a,
                        a.steps_consumed(),
                        b.steps_consumed()
                    )
                })?;
            }
            let snapshot = race.snapshot();
            ensure(
                snapshot.lane_a.winner == (race.winner() == Some(LaneId::A))
                    && snapshot.lane_b.winner == (race.winner() == Some(LaneId::B)),
                || "snapshot winner flags disagree with the result".to_string(),
            )?;
        }
    }
    ensure(s.metrics.races_finished == 16, || {
        format!("expected 16 races, got {}", s.metrics.races_finished)
    })
}

async fn run_slow_motion<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: ScenarioId,
) -> Result<(), SimError> {
    let config = preset(scenario)?;
    let divisor = u64::from(config.speed_divisor);
    let mut race = s.race(config);
    ensure(race.start(s.now()), || "race refused to start".to_string())?;

    let mut lane_frames = [0u64; 2];
    loop {
        let looping = [
            race.lane(LaneId::A).is_looping(),
            race.lane(LaneId::B).is_looping(),
        ];
        s.race_frame(&mut race).await?;
        for (frames, active) in lane_frames.iter_mut().zip(looping) {
            if active {
                *frames += 1;
            }
        }
        if !race.lane(LaneId::A).is_looping() && !race.lane(LaneId::B).is_looping() {
            break;
        }
    }

    for (lane, frames) in [LaneId::A, LaneId::B].into_iter().zip(lane_frames) {
        let steps = race.lane(lane).steps_consumed();
        // One pull every `divisor` frames, plus the pull that finds the end
        ensure(frames == divisor * steps + 1, || {
            format!(
                "lane {} ran {} frames for {} steps at divisor {}",
                lane, frames, steps, divisor
            )
        })?;
        ensure(is_sorted(race.lane(lane).data()), || {
            format!("lane {} is not sorted", lane)
        })?;
    }

    let steps = race.lane(LaneId::A).steps_consumed() + race.lane(LaneId::B).steps_consumed();
    ensure(s.metrics.cues_emitted == steps, || {
        format!("{} cues for {} steps", s.metrics.cues_emitted, steps)
    })
}

async fn run_reset_mid_race<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: ScenarioId,
) -> Result<(), SimError> {
    let mut race = s.race(preset(scenario)?);
    ensure(race.start(s.now()), || "race refused to start".to_string())?;
    for _ in 0..30 {
        s.race_frame(&mut race).await?;
    }
    ensure(race.is_running(), || "race stopped on its own".to_string())?;
    ensure(!race.start(s.now()), || "start accepted while running".to_string())?;

    let old_data = race.lane(LaneId::A).data().to_vec();
    race.generate_data();
    s.note("Generate New Data");
    let consumed = race.total_steps_consumed();

    for _ in 0..30 {
        s.race_frame(&mut race).await?;
    }
    ensure(race.total_steps_consumed() == consumed, || {
        format!(
            "steps kept flowing after reset: {} -> {}",
            consumed,
            race.total_steps_consumed()
        )
    })?;
    ensure(!race.is_running(), || "race still running after reset".to_string())?;
    for lane in [LaneId::A, LaneId::B] {
        let lane = race.lane(lane);
        ensure(
            !lane.is_looping() && lane.elapsed().is_zero() && lane.steps_consumed() == 0,
            || format!("lane {} not reset", lane.id()),
        )?;
    }
    ensure(race.lane(LaneId::A).data() == race.lane(LaneId::B).data(), || {
        "lanes got different data".to_string()
    })?;
    if race.lane(LaneId::A).data() == old_data.as_slice() {
        s.note("Reset produced identical data");
    }

    // The fresh data races normally
    ensure(race.start(s.now()), || "restart refused".to_string())?;
    s.race_to_finish(&mut race).await?;
    ensure(
        is_sorted(race.lane(LaneId::A).data()) && is_sorted(race.lane(LaneId::B).data()),
        || "race after reset did not sort".to_string(),
    )
}

async fn run_audio_fallback<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: ScenarioId,
) -> Result<(), SimError> {
    let sink = RecordingSink::shared();
    sink.set_state(SinkState::Suspended);
    let mut race = s
        .race(preset(scenario)?)
        .with_audio(AudioRoute::Sink(sink.clone()));
    ensure(race.start(s.now()), || "race refused to start".to_string())?;

    let mut skipped = 0;
    for _ in 0..20 {
        let report = s.race_frame(&mut race).await?;
        ensure(report.cues.iter().all(|c| !c.played), || {
            "suspended sink played a cue".to_string()
        })?;
        skipped += report.cues.len();
    }
    ensure(skipped > 0 && sink.is_empty(), || {
        format!("expected skipped cues, got {} and {} played", skipped, sink.len())
    })?;

    sink.set_state(SinkState::Running);
    sink.set_failing(true);
    for _ in 0..10 {
        let report = s.race_frame(&mut race).await?;
        ensure(report.cues.iter().all(|c| !c.played), || {
            "failing sink reported a played cue".to_string()
        })?;
    }
    ensure(sink.is_empty(), || "failing sink stored a cue".to_string())?;

    sink.set_failing(false);
    s.note("Audio resumed");
    let mut played = 0;
    for _ in 0..20 {
        played += s.race_frame(&mut race).await?.cues.len();
    }
    ensure(played == sink.len(), || {
        format!("{} cues reported, {} reached the sink", played, sink.len())
    })?;

    ensure(race.toggle_mute(), || "toggle did not mute".to_string())?;
    s.note("Muted");
    let steps = race.total_steps_consumed();
    for _ in 0..20 {
        let report = s.race_frame(&mut race).await?;
        ensure(report.cues.is_empty(), || "muted race emitted a cue".to_string())?;
    }
    ensure(race.total_steps_consumed() > steps, || {
        "mute stopped the race".to_string()
    })?;
    ensure(sink.len() == played, || "muted cue reached the sink".to_string())?;

    race.set_muted(false);
    s.race_to_finish(&mut race).await?;
    ensure(race.both_finished(), || "race did not finish".to_string())
}

async fn run_unmount<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: ScenarioId,
) -> Result<(), SimError> {
    let cancel = s.driver.cancel_handle();
    let mut race = s.race(preset(scenario)?).with_cancel(cancel.clone());
    let launch = scenario
        .capacity_scenario()
        .ok_or_else(|| SimError::Assertion("no capacity scenario".into()))?;
    let mut tick_loop = s.capacity(launch).with_cancel(cancel.clone());

    ensure(race.start(s.now()), || "race refused to start".to_string())?;
    for _ in 0..100 {
        let now = s.next_frame().await?;
        let before = race.total_steps_consumed();
        let report = race.on_frame(now);
        s.metrics.steps_consumed += race.total_steps_consumed() - before;
        s.absorb_race(&report);
        let ticks = tick_loop.advance(now);
        s.absorb_ticks(&ticks);
        s.record(Some(&race), Some(tick_loop.simulator()));
    }
    ensure(tick_loop.simulator().ticks() > 0, || "capacity loop never ticked".to_string())?;

    cancel.cancel();
    s.note("Unmounted");
    let steps = race.total_steps_consumed();
    let ticks = tick_loop.simulator().ticks();

    match s.next_frame().await {
        Err(SimError::Stopped(DriveOutcome::Cancelled)) => {}
        other => {
            return Err(SimError::Assertion(format!(
                "driver kept delivering frames after cancel: {:?}",
                other
            )))
        }
    }

    // Stray callbacks after unmount do nothing
    let later = s.now() + Duration::from_secs(5);
    race.on_frame(later);
    tick_loop.advance(later);
    race.cancel();
    race.cancel();
    ensure(race.total_steps_consumed() == steps, || "race stepped after cancel".to_string())?;
    ensure(tick_loop.simulator().ticks() == ticks, || "capacity ticked after cancel".to_string())?;
    ensure(!tick_loop.is_running(), || "capacity loop still running".to_string())?;
    ensure(!race.start(later), || "cancelled race restarted".to_string())
}

async fn run_replay<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    config: &SimConfig,
) -> Result<(), SimError> {
    let race_config = preset(ScenarioId::Replay)?;

    let mut runs = Vec::new();
    for seed in [s.seed, s.seed, s.seed.wrapping_add(1)] {
        let replay_config = SimConfig {
            seed,
            ..config.clone()
        };
        let mut replay = Session::new(
            SimContext::shared(seed),
            &replay_config,
            "replay",
            None,
            AudioRoute::Sink(RecordingSink::shared()),
        );
        // The dataset stream is fixed per seed, so this is the data the race gets
        let initial = replay.race(race_config.clone()).lane(LaneId::A).data().to_vec();
        let race = run_race(&mut replay, race_config.clone()).await?;
        s.metrics.steps_consumed += replay.metrics.steps_consumed;
        s.metrics.races_finished += replay.metrics.races_finished;
        runs.push((
            initial,
            race.snapshot(),
            replay.driver.frames(),
            replay.metrics.cues_emitted,
        ));
    }

    ensure(runs[0] == runs[1], || "same seed produced different runs".to_string())?;
    ensure(runs[0].0 != runs[2].0, || {
        "different seeds produced the same dataset".to_string()
    })
}

// =============================================================================
// CAPACITY SCENARIOS
// =============================================================================

fn celebrations(reports: &[TickReport]) -> usize {
    reports
        .iter()
        .flat_map(|r| r.events.iter())
        .filter(|e| **e == CapacityEvent::Celebrate)
        .count()
}

fn capacity_preset(scenario: ScenarioId) -> Result<Scenario, SimError> {
    scenario
        .capacity_scenario()
        .ok_or_else(|| SimError::Assertion(format!("{} has no capacity preset", scenario)))
}

async fn run_launch_day<Ctx: LabContext>(s: &mut Session<Ctx>) -> Result<(), SimError> {
    let mut tick_loop = s.capacity(capacity_preset(ScenarioId::LaunchDay)?);

    let reports = s.capacity_for(&mut tick_loop, Duration::from_secs(2)).await?;
    let sim = tick_loop.simulator();
    ensure(!reports.is_empty() && reports.iter().all(|r| !r.stable), || {
        "single replica should be unstable".to_string()
    })?;
    ensure(sim.status_label() == "STATUS: CRITICAL", || sim.status_label().to_string())?;
    ensure(matches!(sim.solve(), Err(CapacityError::Unstable { .. })), || {
        "solve accepted an unstable system".to_string()
    })?;

    let knobs = tick_loop.simulator_mut().knobs_mut();
    knobs.adjust(Knob::Replicas, 4);
    knobs.adjust(Knob::DbCapacity, 2);
    s.note("Scaled to 5 replicas, 3 DB units");

    let reports = s.capacity_for(&mut tick_loop, Duration::from_secs(2)).await?;
    ensure(reports.iter().all(|r| r.stable), || "scaled system not stable".to_string())?;
    ensure(celebrations(&reports) == 1, || {
        format!("expected one celebration, got {}", celebrations(&reports))
    })?;

    match tick_loop.simulator().solve() {
        Ok(CapacityEvent::Solved { message }) => {
            ensure(
                message.starts_with("System Scaled! Replicas: 5, DB: 3, Cache: 0. Steady at "),
                || format!("unexpected message: {}", message),
            )?;
            s.pending.push(SimEvent::Capacity {
                event: CapacityEvent::Solved { message },
            });
            Ok(())
        }
        other => Err(SimError::Assertion(format!("solve failed: {:?}", other))),
    }
}

async fn run_cache_rescue<Ctx: LabContext>(s: &mut Session<Ctx>) -> Result<(), SimError> {
    let mut tick_loop = s.capacity(capacity_preset(ScenarioId::CacheRescue)?);

    let reports = s.capacity_for(&mut tick_loop, Duration::from_secs(1)).await?;
    let last = reports
        .last()
        .ok_or_else(|| SimError::Assertion("no ticks in one second".into()))?;
    ensure(last.breakdown.bottleneck_tier == Tier::Database && !last.stable, || {
        format!("expected an unstable database bottleneck, got {:?}", last.breakdown)
    })?;

    tick_loop
        .simulator_mut()
        .knobs_mut()
        .set(Knob::CacheCapacity, 10.0);
    s.note("Cache set to 10");

    let reports = s.capacity_for(&mut tick_loop, Duration::from_secs(3)).await?;
    let last = reports
        .last()
        .ok_or_else(|| SimError::Assertion("no ticks after adding cache".into()))?;
    ensure(last.breakdown.bottleneck_tier == Tier::App && last.stable, || {
        format!("cache did not move the bottleneck: {:?}", last.breakdown)
    })?;
    ensure(celebrations(&reports) == 1, || "expected one celebration".to_string())?;
    let reached_cache = tick_loop
        .simulator()
        .particles()
        .any(|p| p.target == ParticleTarget::Cache);
    ensure(reached_cache, || "no traffic reached the cache".to_string())
}

async fn run_flash_crowd<Ctx: LabContext>(s: &mut Session<Ctx>) -> Result<(), SimError> {
    let mut tick_loop = s.capacity(capacity_preset(ScenarioId::FlashCrowd)?);

    let knobs = tick_loop.simulator_mut().knobs_mut();
    for knob in [Knob::Replicas, Knob::DbCapacity, Knob::CacheCapacity] {
        knobs.adjust(knob, 20);
    }
    knobs.set(Knob::Traffic, 400.0);
    let knobs = *knobs;
    ensure(
        knobs.traffic == 250.0
            && knobs.replicas == 10
            && knobs.db_capacity == 10
            && knobs.cache_capacity == 10,
        || format!("knobs escaped their bounds: {:?}", knobs),
    )?;

    let reports = s.capacity_for(&mut tick_loop, Duration::from_secs(3)).await?;
    ensure(!reports.is_empty() && reports.iter().all(|r| !r.stable), || {
        "250 RPS should never stabilize".to_string()
    })?;
    ensure(celebrations(&reports) == 0, || "celebrated an unstable system".to_string())?;

    let sim = tick_loop.simulator();
    ensure(sim.error_rate() > 0.0 && sim.success_capacity() < 100, || {
        format!("expected dropped requests, error rate {}", sim.error_rate())
    })?;
    match sim.solve() {
        Err(e @ CapacityError::Unstable { .. }) => {
            s.note(e.to_string());
            Ok(())
        }
        other => Err(SimError::Assertion(format!("solve should fail: {:?}", other))),
    }
}

async fn run_scenario_switch<Ctx: LabContext>(s: &mut Session<Ctx>) -> Result<(), SimError> {
    let mut tick_loop = s.capacity(capacity_preset(ScenarioId::ScenarioSwitch)?);
    s.capacity_for(&mut tick_loop, Duration::from_secs(1)).await?;
    tick_loop
        .simulator_mut()
        .knobs_mut()
        .adjust(Knob::Replicas, 2);

    let latency = tick_loop.simulator().latency();
    let ticks = tick_loop.simulator().ticks();
    let next = scenarios::read_heavy_api();
    let expected = next.initial_knobs();
    tick_loop.simulator_mut().load_scenario(next);
    s.note("Loaded Read-Heavy API");

    let sim = tick_loop.simulator();
    ensure(*sim.knobs() == expected, || "knobs not reset".to_string())?;
    ensure(sim.history_len() == 0, || "history not cleared".to_string())?;
    ensure(sim.latency() == latency, || "smoothed latency was reset".to_string())?;

    s.capacity_for(&mut tick_loop, Duration::from_secs(7)).await?;
    let sim = tick_loop.simulator();
    let since = (sim.ticks() - ticks) as usize;
    ensure(since > 0, || "tick loop stopped after switching".to_string())?;
    ensure(sim.history_len() == since.min(HISTORY_LEN), || {
        format!("history holds {} after {} ticks", sim.history_len(), since)
    })
}

async fn run_scaler<Ctx: LabContext>(
    s: &mut Session<Ctx>,
    scenario: Scenario,
) -> Result<(), SimError> {
    let mut tick_loop = s.capacity(scenario);
    let reports = s
        .capacity_for(&mut tick_loop, SCALER_PROPS_DURATION)
        .await?;
    ensure(
        reports
            .iter()
            .all(|r| (0.0..=100.0).contains(&r.error_rate) && r.latency >= 20.0),
        || "capacity output left its range".to_string(),
    )?;

    let sim = tick_loop.simulator();
    info!(
        "{} | latency {:.0}ms | success {}% | {}",
        sim.scenario().scenario_name,
        sim.latency(),
        sim.success_capacity(),
        sim.status_label()
    );
    match sim.solve() {
        Ok(CapacityEvent::Solved { message }) => info!("{}", message),
        Ok(_) => {}
        Err(e) => info!("Not solvable as configured: {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_scenario_passes() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).await;
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[tokio::test]
    async fn test_scenarios_pass_with_jitter() {
        let runner = ScenarioRunner::new(7).with_jitter(3.0);
        for scenario in [
            ScenarioId::BubbleVsQuick,
            ScenarioId::SlowMotion,
            ScenarioId::Replay,
            ScenarioId::LaunchDay,
        ] {
            let result = runner.run(scenario).await;
            assert!(result.passed, "{} failed: {:?}", scenario, result.failure_reason);
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_result() {
        let runner = ScenarioRunner::new(1234);
        let a = runner.run(ScenarioId::BubbleVsQuick).await;
        let b = runner.run(ScenarioId::BubbleVsQuick).await;

        assert_eq!(a.total_frames, b.total_frames);
        assert_eq!(a.metrics.steps_consumed, b.metrics.steps_consumed);
        assert_eq!(a.metrics.winner, Some(LaneId::B));
    }

    #[tokio::test]
    async fn test_recording_exports_frames() {
        let runner = ScenarioRunner::new(42).with_recording(10);
        let result = runner.run(ScenarioId::LaunchDay).await;

        let export = result.export.expect("recording requested");
        assert!(export.passed);
        assert!(!export.frames.is_empty());
        assert!(export.frames.iter().all(|f| f.frame % 10 == 0));
        assert!(export.frames.iter().all(|f| f.capacity.is_some()));
    }

    #[tokio::test]
    async fn test_frame_limit_fails_scenario() {
        let runner = ScenarioRunner::new(42).with_max_frames(50);
        let result = runner.run(ScenarioId::BubbleVsQuick).await;

        assert!(!result.passed);
        assert_eq!(result.total_frames, 50);
        assert!(result.failure_reason.unwrap().contains("FrameLimit"));
    }

    #[tokio::test]
    async fn test_race_props() {
        let runner = ScenarioRunner::new(42);
        let config =
            RaceConfig::from_props_json(r#"{"algoA": "Merge Sort", "algoB": "bubble", "dataSize": 20}"#)
                .unwrap();
        let result = runner
            .run_race_props(SimContext::shared(42), config)
            .await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.races_finished, 1);

        let invalid = RaceConfig::default().with_speed_divisor(0);
        let result = runner
            .run_race_props(SimContext::shared(42), invalid)
            .await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_scaler_props() {
        let runner = ScenarioRunner::new(42);
        let scenario = Scenario::from_props_json(
            r#"{"scenarioName": "Checkout", "initialTraffic": 40, "initialReplicas": 4, "initialDbCapacity": 3}"#,
        )
        .unwrap();
        let result = runner
            .run_scaler_props(SimContext::shared(42), scenario)
            .await;
        assert!(result.passed);
        // 200ms ticks over ten seconds of 60 Hz frames
        assert!((49..=50).contains(&result.metrics.capacity_ticks));
    }
}
