//! FrameDriver - stands in for the browser's animation-frame loop.

use algolab_core::{CancelHandle, TickStatus, Tickable};
use algolab_env::LabContext;

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// RNG stream used for frame jitter.
pub const JITTER_STREAM: u64 = 0xF4A3;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Display frame rate in Hz
    pub frame_rate_hz: u32,

    /// Standard deviation of frame-to-frame jitter in milliseconds (0 = none)
    pub frame_jitter_ms: f64,

    /// Frames after which a run is abandoned (0 = unlimited)
    pub max_frames: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frame_rate_hz: 60,
            frame_jitter_ms: 0.0,
            max_frames: 20_000,
        }
    }
}

impl SimConfig {
    /// Nominal time between two frames.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

/// Why a drive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The target reported it had nothing left to do
    Idle,

    /// `max_frames` was reached first
    FrameLimit,

    /// The cancel handle fired
    Cancelled,
}

/// Calls tick targets once per frame against a [`LabContext`] clock.
///
/// With a `SimContext` each frame sleep only advances the virtual clock, so a
/// full race runs in microseconds and is reproducible from its seed.
pub struct FrameDriver<Ctx: LabContext> {
    ctx: Arc<Ctx>,
    frame_period: Duration,
    jitter: Option<Normal<f64>>,
    rng: ChaCha8Rng,
    max_frames: u64,
    cancel: CancelHandle,
    frames: u64,
}

impl<Ctx: LabContext> FrameDriver<Ctx> {
    /// Creates a driver for `ctx` using the frame settings of `config`.
    pub fn new(ctx: Arc<Ctx>, config: &SimConfig) -> Self {
        let jitter = if config.frame_jitter_ms > 0.0 {
            Normal::new(0.0, config.frame_jitter_ms).ok()
        } else {
            None
        };
        let rng = ctx.derive_rng(JITTER_STREAM);
        Self {
            ctx,
            frame_period: config.frame_period(),
            jitter,
            rng,
            max_frames: config.max_frames,
            cancel: CancelHandle::new(),
            frames: 0,
        }
    }

    /// Shares a cancellation handle with the targets being driven.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.ctx
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Frames delivered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Current host time.
    pub fn now(&self) -> Duration {
        self.ctx.now()
    }

    fn next_period(&mut self) -> Duration {
        match &self.jitter {
            Some(normal) => {
                let jitter_ms = normal.sample(&mut self.rng);
                let period_ms = self.frame_period.as_secs_f64() * 1000.0 + jitter_ms;
                // Frames never arrive out of order
                Duration::from_secs_f64(period_ms.max(1.0) / 1000.0)
            }
            None => self.frame_period,
        }
    }

    /// Waits for the next frame and returns its timestamp.
    ///
    /// Returns `Err` with the reason once no further frame will be delivered.
    pub async fn next_frame(&mut self) -> Result<Duration, DriveOutcome> {
        if self.cancel.is_cancelled() {
            return Err(DriveOutcome::Cancelled);
        }
        if self.max_frames > 0 && self.frames >= self.max_frames {
            return Err(DriveOutcome::FrameLimit);
        }
        let period = self.next_period();
        self.ctx.sleep(period).await;
        self.frames += 1;
        Ok(self.ctx.now())
    }

    /// Ticks `target` every frame until it goes idle or the driver stops.
    pub async fn run<T: Tickable + ?Sized>(&mut self, target: &mut T) -> DriveOutcome {
        let started = self.frames;
        let outcome = loop {
            let now = match self.next_frame().await {
                Ok(now) => now,
                Err(outcome) => break outcome,
            };
            if target.on_tick(now) == TickStatus::Idle {
                break DriveOutcome::Idle;
            }
        };
        debug!(
            frames = self.frames - started,
            now = ?self.ctx.now(),
            ?outcome,
            "Drive loop ended"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use proptest::prelude::*;

    struct Countdown {
        remaining: u32,
        seen: Vec<Duration>,
    }

    impl Tickable for Countdown {
        fn on_tick(&mut self, now: Duration) -> TickStatus {
            self.seen.push(now);
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                TickStatus::Idle
            } else {
                TickStatus::Active
            }
        }
    }

    fn countdown(n: u32) -> Countdown {
        Countdown {
            remaining: n,
            seen: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_runs_until_idle_on_virtual_clock() {
        let ctx = SimContext::shared(7);
        let config = SimConfig {
            frame_rate_hz: 50,
            ..Default::default()
        };
        let mut driver = FrameDriver::new(ctx.clone(), &config);
        let mut target = countdown(5);

        assert_eq!(driver.run(&mut target).await, DriveOutcome::Idle);
        assert_eq!(driver.frames(), 5);
        assert_eq!(ctx.now(), Duration::from_millis(100));
        assert_eq!(target.seen[0], Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_frame_limit() {
        let ctx = SimContext::shared(7);
        let config = SimConfig {
            max_frames: 3,
            ..Default::default()
        };
        let mut driver = FrameDriver::new(ctx, &config);
        let mut target = countdown(100);

        assert_eq!(driver.run(&mut target).await, DriveOutcome::FrameLimit);
        assert_eq!(target.seen.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_driver() {
        let ctx = SimContext::shared(7);
        let cancel = CancelHandle::new();
        let mut driver = FrameDriver::new(ctx, &SimConfig::default()).with_cancel(cancel.clone());

        assert!(driver.next_frame().await.is_ok());
        cancel.cancel();
        assert_eq!(driver.next_frame().await, Err(DriveOutcome::Cancelled));

        let mut target = countdown(10);
        assert_eq!(driver.run(&mut target).await, DriveOutcome::Cancelled);
        assert!(target.seen.is_empty());
    }

    #[tokio::test]
    async fn test_jitter_is_deterministic_and_monotonic() {
        let config = SimConfig {
            frame_jitter_ms: 4.0,
            max_frames: 200,
            ..Default::default()
        };

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut driver = FrameDriver::new(SimContext::shared(99), &config);
            let mut target = countdown(u32::MAX);
            driver.run(&mut target).await;
            runs.push(target.seen);
        }

        assert_eq!(runs[0], runs[1]);
        assert!(runs[0].windows(2).all(|w| w[1] > w[0]));
        // Jitter actually moved some frames off the nominal grid
        let nominal = config.frame_period();
        assert!(runs[0]
            .windows(2)
            .any(|w| (w[1] - w[0]) != nominal));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_jittered_frames_stay_ordered(seed in any::<u64>(), jitter in 0.0f64..40.0, frames in 1u64..300) {
            let config = SimConfig {
                seed,
                frame_jitter_ms: jitter,
                max_frames: frames,
                ..Default::default()
            };
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let seen = runtime.block_on(async {
                let mut driver = FrameDriver::new(SimContext::shared(seed), &config);
                let mut target = countdown(u32::MAX);
                driver.run(&mut target).await;
                target.seen
            });

            prop_assert_eq!(seen.len() as u64, frames);
            prop_assert!(seen[0] >= Duration::from_millis(1));
            prop_assert!(seen.windows(2).all(|w| w[1] - w[0] >= Duration::from_millis(1)));
        }
    }
}
