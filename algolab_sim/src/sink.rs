//! Audio sink that records cues instead of playing them.

use algolab_env::{AudioSink, Cue, EnvError, SinkState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Recording {
    state: SinkState,
    failing: bool,
    cues: Vec<Cue>,
}

/// In-memory sink for headless runs.
///
/// Every accepted cue is kept in order so scenarios can check what would have
/// been heard. The sink can be suspended to exercise the skip path.
#[derive(Debug)]
pub struct RecordingSink {
    inner: Mutex<Recording>,
}

impl RecordingSink {
    /// Creates a running sink with no cues.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Recording {
                state: SinkState::Running,
                failing: false,
                cues: Vec::new(),
            }),
        }
    }

    /// Creates an Arc-wrapped sink, ready for an `AudioRoute::Sink`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: SinkState) {
        self.lock().state = state;
    }

    /// Makes every following `play` fail as if the device was lost.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Cues accepted so far, oldest first.
    pub fn cues(&self) -> Vec<Cue> {
        self.lock().cues.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().cues.clear();
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RecordingSink {
    fn state(&self) -> SinkState {
        self.lock().state
    }

    fn play(&self, cue: &Cue) -> Result<(), EnvError> {
        let mut recording = self.lock();
        if recording.failing {
            return Err(EnvError::backend("device lost"));
        }
        recording.cues.push(*cue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use algolab_env::{AudioRoute, Waveform};

    #[test]
    fn test_records_in_order() {
        let sink = RecordingSink::shared();
        let route = AudioRoute::Sink(sink.clone());

        route.play(&Cue::new(200.0, Waveform::Sine)).unwrap();
        route.play(&Cue::new(800.0, Waveform::Triangle)).unwrap();

        let cues = sink.cues();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].waveform, Waveform::Sine);
        assert_eq!(cues[1].frequency_hz, 800.0);
    }

    #[test]
    fn test_suspended_sink_records_nothing() {
        let sink = RecordingSink::shared();
        sink.set_state(SinkState::Suspended);
        let route = AudioRoute::Sink(sink.clone());

        assert!(matches!(
            route.play(&Cue::new(440.0, Waveform::Sine)),
            Err(EnvError::AudioSuspended)
        ));
        assert!(sink.is_empty());

        sink.set_state(SinkState::Running);
        route.play(&Cue::new(440.0, Waveform::Sine)).unwrap();
        assert_eq!(sink.len(), 1);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_failing_sink_reports_backend_error() {
        let sink = RecordingSink::shared();
        sink.set_failing(true);
        let route = AudioRoute::Sink(sink.clone());

        let result = route.play(&Cue::new(440.0, Waveform::Sine));
        assert!(matches!(result, Err(EnvError::AudioBackend(_))));
        assert!(sink.is_empty());
    }
}
