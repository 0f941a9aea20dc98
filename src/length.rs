//! Analytic frame-count estimate from declared clip duration.
//!
//! Used as the sort and cost key while bucketing, so audio is only decoded
//! once a batch reaches the matrix assembler.

use crate::config::DataConfig;
use crate::corpus::AudioDescriptor;

/// Frame-count estimator for a fixed sample rate and frame step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthEstimator {
    sample_rate: u32,
    frame_step_samples: usize,
}

impl LengthEstimator {
    /// Build from a validated config.
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            frame_step_samples: config.frame_step_samples(),
        }
    }

    /// Frame step in samples.
    pub fn frame_step_samples(&self) -> usize {
        self.frame_step_samples
    }

    /// `ceil(duration * sample_rate / frame_step_samples)`.
    ///
    /// An unset duration estimates to zero frames; the corpus reader refuses
    /// such records, so this only happens for hand-built descriptors.
    pub fn frames(&self, audio: &AudioDescriptor) -> usize {
        let Some(duration) = audio.duration else {
            return 0;
        };
        let num_signal = (duration * self.sample_rate as f64) as usize;
        num_signal.div_ceil(self.frame_step_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(duration: f64) -> AudioDescriptor {
        AudioDescriptor {
            path: "a.wav".into(),
            offset: 0.0,
            duration: Some(duration),
        }
    }

    #[test]
    fn test_one_second_at_16k_10ms() {
        let est = LengthEstimator::from_config(&DataConfig::default());
        assert_eq!(est.frame_step_samples(), 160);
        assert_eq!(est.frames(&clip(1.0)), 100);
    }

    #[test]
    fn test_partial_frame_rounds_up() {
        let est = LengthEstimator::from_config(&DataConfig::default());
        // 0.0101 s = 161 samples -> 2 frames
        assert_eq!(est.frames(&clip(0.0101)), 2);
        assert_eq!(est.frames(&clip(0.0)), 0);
    }

    #[test]
    fn test_custom_step() {
        let cfg = DataConfig {
            sample_rate: 8_000,
            frame_step_ms: 25.0,
            ..DataConfig::default()
        };
        let est = LengthEstimator::from_config(&cfg);
        assert_eq!(est.frame_step_samples(), 200);
        assert_eq!(est.frames(&clip(1.0)), 40);
    }

    #[test]
    fn test_unset_duration_is_zero() {
        let est = LengthEstimator::from_config(&DataConfig::default());
        let audio = AudioDescriptor {
            duration: None,
            ..clip(1.0)
        };
        assert_eq!(est.frames(&audio), 0);
    }
}
