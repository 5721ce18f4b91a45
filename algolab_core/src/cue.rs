//! Sonification of sort steps.
//!
//! Each step becomes one short note whose pitch follows the value under the
//! step's first index: small bars sound low, tall bars sound high.

use crate::sort_engine::Step;
use algolab_env::{Cue, Waveform};

/// Value mapped to [`LOW_HZ`].
pub const LOW_VALUE: f64 = 10.0;

/// Value mapped to [`HIGH_HZ`].
pub const HIGH_VALUE: f64 = 100.0;

/// Pitch for the smallest dataset value.
pub const LOW_HZ: f64 = 200.0;

/// Pitch for the largest dataset value.
pub const HIGH_HZ: f64 = 800.0;

/// Value used when the first index falls outside the dataset.
pub const FALLBACK_VALUE: u32 = 50;

/// Linear map from a dataset value onto the cue band.
pub fn frequency_for(value: u32) -> f64 {
    LOW_HZ + (value as f64 - LOW_VALUE) * (HIGH_HZ - LOW_HZ) / (HIGH_VALUE - LOW_VALUE)
}

/// Waveform for a step: triangle for swaps, sine for compares.
pub fn waveform_for(step: &Step) -> Waveform {
    if step.is_swap() {
        Waveform::Triangle
    } else {
        Waveform::Sine
    }
}

/// Builds the cue for `step`, reading the value from `data`.
///
/// `data` should be the lane's displayed dataset after the step was applied.
/// Returns `None` for steps without indices.
pub fn cue_for_step(step: &Step, data: &[u32]) -> Option<Cue> {
    let first = *step.indices().first()?;
    let value = data.get(first).copied().unwrap_or(FALLBACK_VALUE);
    Some(Cue::new(frequency_for(value), waveform_for(step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_endpoints() {
        assert_relative_eq!(frequency_for(10), 200.0);
        assert_relative_eq!(frequency_for(100), 800.0);
        assert_relative_eq!(frequency_for(55), 500.0);
    }

    #[test]
    fn test_cue_waveforms() {
        let data = [10, 100];
        let compare = Step::Compare { indices: [1, 0] };
        let swap = Step::Swap {
            indices: vec![0, 1],
            snapshot: data.to_vec(),
        };

        let cue = cue_for_step(&compare, &data).unwrap();
        assert_eq!(cue.waveform, Waveform::Sine);
        assert_relative_eq!(cue.frequency_hz, 800.0);

        let cue = cue_for_step(&swap, &data).unwrap();
        assert_eq!(cue.waveform, Waveform::Triangle);
        assert_relative_eq!(cue.frequency_hz, 200.0);
        assert_relative_eq!(cue.volume, Cue::DEFAULT_VOLUME);
        assert_eq!(cue.duration_ms, 100);
    }

    #[test]
    fn test_out_of_range_index_uses_fallback() {
        let step = Step::Compare { indices: [7, 8] };
        let cue = cue_for_step(&step, &[20, 30]).unwrap();
        assert_relative_eq!(cue.frequency_hz, frequency_for(FALLBACK_VALUE));
    }
}
