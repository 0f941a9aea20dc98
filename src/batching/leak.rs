//! Carry-over store for undersized batches.

use super::Batch;
use crate::config::CostPolicy;
use crate::corpus::RawSample;
use crate::length::LengthEstimator;

/// Cost of a batch under `policy`: sample count, or the larger of the summed
/// target lengths and summed estimated frames.
pub fn batch_cost(batch: &[RawSample], policy: CostPolicy, estimator: &LengthEstimator) -> usize {
    match policy {
        CostPolicy::Batch => batch.len(),
        CostPolicy::Token => {
            let text: usize = batch.iter().map(|s| s.target_ids.len()).sum();
            let frames: usize = batch.iter().map(|s| estimator.frames(&s.audio)).sum();
            text.max(frames)
        }
    }
}

/// True when `cost < ratio * limit`.
pub fn is_undersized(cost: usize, limit: usize, ratio: f64) -> bool {
    (cost as f64) < limit as f64 * ratio
}

/// Samples held back from emission, retried at the front of the next window.
///
/// Lives as long as the engine that owns it, so a training pass can hand its
/// undersized tail to the next epoch.
#[derive(Debug, Default)]
pub struct LeakStore {
    samples: Vec<RawSample>,
}

impl LeakStore {
    pub fn push_batch(&mut self, batch: Batch) {
        self.samples.extend(batch);
    }

    /// Take every held sample, leaving the store empty.
    pub fn drain(&mut self) -> Vec<RawSample> {
        std::mem::take(&mut self.samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::corpus::AudioDescriptor;

    fn sample(ordinal: usize, duration: f64, text_len: usize) -> RawSample {
        RawSample {
            ordinal,
            audio: AudioDescriptor {
                path: format!("{ordinal}.wav").into(),
                offset: 0.0,
                duration: Some(duration),
            },
            target_ids: vec![7; text_len],
            ctc_ids: vec![7; text_len],
        }
    }

    #[test]
    fn test_batch_cost_per_policy() {
        let est = LengthEstimator::from_config(&DataConfig::default());
        let batch = vec![sample(0, 0.1, 30), sample(1, 0.2, 2)];
        assert_eq!(batch_cost(&batch, CostPolicy::Batch, &est), 2);
        // frames 10 + 20 = 30, text 32
        assert_eq!(batch_cost(&batch, CostPolicy::Token, &est), 32);
    }

    #[test]
    fn test_undersized_threshold() {
        assert!(is_undersized(1, 3, 0.5));
        assert!(!is_undersized(2, 3, 0.5));
        assert!(!is_undersized(0, 3, 0.0));
    }

    #[test]
    fn test_store_drain_empties() {
        let mut store = LeakStore::default();
        store.push_batch(vec![sample(0, 1.0, 1), sample(1, 1.0, 1)]);
        assert_eq!(store.len(), 2);
        let drained = store.drain();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
    }
}
