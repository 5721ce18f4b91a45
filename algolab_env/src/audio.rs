//! Process-wide audio output.
//!
//! There is at most one audio output per process. It is created lazily on
//! first use from an installed factory, shared by every caller through
//! [`output`], and torn down explicitly with [`teardown`]. When no factory is
//! installed (headless runs) the output is simply absent and callers skip
//! their cues.
//!
//! ```text
//!  install_factory(f) ──► output() ──first call──► f() ──► Arc<dyn AudioSink>
//!                            │                               ▲
//!                            └──────── later calls ──────────┘
//!  teardown() drops the sink; the next output() call recreates it
//! ```

use crate::error::EnvError;
use crate::types::{Cue, SinkState};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Something that can turn cues into sound.
pub trait AudioSink: Send + Sync + 'static {
    /// Returns the current lifecycle state.
    fn state(&self) -> SinkState;

    /// Plays a single cue. Must not block for the duration of the note.
    fn play(&self, cue: &Cue) -> Result<(), EnvError>;
}

/// Builds the process-wide sink. Returning `None` means no backend exists.
pub type SinkFactory = Box<dyn Fn() -> Option<Arc<dyn AudioSink>> + Send + Sync>;

struct AudioOutput {
    factory: Option<SinkFactory>,
    sink: Option<Arc<dyn AudioSink>>,
}

static OUTPUT: Mutex<AudioOutput> = Mutex::new(AudioOutput {
    factory: None,
    sink: None,
});

fn lock_output() -> MutexGuard<'static, AudioOutput> {
    // A panic while holding the lock cannot leave the two Options in a
    // state that is unsafe to read, so poisoning is ignored.
    OUTPUT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Installs the factory used to create the sink on first use.
///
/// Any sink created by a previous factory is dropped.
pub fn install_factory(factory: SinkFactory) {
    let mut output = lock_output();
    output.factory = Some(factory);
    output.sink = None;
}

/// Returns the shared sink, creating it on first use.
pub fn output() -> Option<Arc<dyn AudioSink>> {
    let mut output = lock_output();
    if output.sink.is_none() {
        let created = output.factory.as_ref().and_then(|factory| factory());
        output.sink = created;
    }
    output.sink.clone()
}

/// Drops the shared sink and the factory.
///
/// Idempotent. After teardown `output()` returns `None` until a new factory
/// is installed.
pub fn teardown() {
    let mut output = lock_output();
    output.sink = None;
    output.factory = None;
}

/// Plays `cue` on `sink` if the sink is running.
pub fn play_on(sink: &dyn AudioSink, cue: &Cue) -> Result<(), EnvError> {
    match sink.state() {
        SinkState::Suspended => Err(EnvError::AudioSuspended),
        SinkState::Running => sink.play(cue),
    }
}

/// Where a component sends its cues.
#[derive(Clone, Default)]
pub enum AudioRoute {
    /// The process-wide output from [`output`]
    #[default]
    Global,

    /// A sink owned by the caller (tests, embedded hosts)
    Sink(Arc<dyn AudioSink>),

    /// Never play anything
    Disabled,
}

impl AudioRoute {
    /// Plays a cue through this route.
    ///
    /// # Returns
    /// * `Ok(())` - The sink accepted the cue
    /// * `Err(EnvError::AudioUnavailable)` - No sink on this route
    /// * `Err(EnvError::AudioSuspended)` - The sink is not running
    pub fn play(&self, cue: &Cue) -> Result<(), EnvError> {
        match self {
            AudioRoute::Global => match output() {
                Some(sink) => play_on(sink.as_ref(), cue),
                None => Err(EnvError::AudioUnavailable),
            },
            AudioRoute::Sink(sink) => play_on(sink.as_ref(), cue),
            AudioRoute::Disabled => Err(EnvError::AudioUnavailable),
        }
    }
}

impl fmt::Debug for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioRoute::Global => write!(f, "AudioRoute::Global"),
            AudioRoute::Sink(_) => write!(f, "AudioRoute::Sink(..)"),
            AudioRoute::Disabled => write!(f, "AudioRoute::Disabled"),
        }
    }
}

/// Sink that writes every cue to the log at TRACE level.
///
/// Used by headless hosts that want to see the sonification without a
/// sound card.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AudioSink for TracingSink {
    fn state(&self) -> SinkState {
        SinkState::Running
    }

    fn play(&self, cue: &Cue) -> Result<(), EnvError> {
        trace!(
            frequency_hz = cue.frequency_hz,
            waveform = %cue.waveform,
            "cue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Waveform;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        state: SinkState,
        played: AtomicUsize,
    }

    impl AudioSink for CountingSink {
        fn state(&self) -> SinkState {
            self.state
        }

        fn play(&self, _cue: &Cue) -> Result<(), EnvError> {
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_route_skips_suspended_sink() {
        let sink = Arc::new(CountingSink {
            state: SinkState::Suspended,
            played: AtomicUsize::new(0),
        });
        let route = AudioRoute::Sink(sink.clone());

        let result = route.play(&Cue::new(440.0, Waveform::Sine));

        assert!(matches!(result, Err(EnvError::AudioSuspended)));
        assert_eq!(sink.played.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_route_plays_on_running_sink() {
        let sink = Arc::new(CountingSink {
            state: SinkState::Running,
            played: AtomicUsize::new(0),
        });
        let route = AudioRoute::Sink(sink.clone());

        route.play(&Cue::new(440.0, Waveform::Triangle)).unwrap();
        route.play(&Cue::new(220.0, Waveform::Sine)).unwrap();

        assert_eq!(sink.played.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_route_is_unavailable() {
        let result = AudioRoute::Disabled.play(&Cue::new(440.0, Waveform::Sine));
        assert!(matches!(result, Err(EnvError::AudioUnavailable)));
    }

    // The only test touching the process-wide output, so it cannot race
    // with another test in this crate.
    #[test]
    fn test_global_output_lifecycle() {
        teardown();
        assert!(output().is_none());

        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        install_factory(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(TracingSink) as Arc<dyn AudioSink>)
        }));

        // Created lazily, once
        assert_eq!(created.load(Ordering::SeqCst), 0);
        assert!(output().is_some());
        assert!(output().is_some());
        assert_eq!(created.load(Ordering::SeqCst), 1);

        AudioRoute::Global
            .play(&Cue::new(300.0, Waveform::Sine))
            .unwrap();

        teardown();
        teardown();
        assert!(output().is_none());
    }
}
