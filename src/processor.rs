//! Worker-pool boundary: `Batch → Features`.
//!
//! The processor holds no mutable state, so one instance can be shared by
//! any number of worker threads, each handling independent batches.

use candle_core::{Device, Tensor};

use crate::Result;
use crate::assemble::{AssembledBatch, MatrixAssembler, SparseLabels};
use crate::batching::Batch;

/// Named training-step inputs for one batch.
#[derive(Debug, Clone)]
pub struct Features {
    /// `[batch, audio_len]` f32 waveforms.
    pub audio: Tensor,
    /// `[batch, text_len]` u32 target ids.
    pub text: Tensor,
    pub frame_counts: Vec<usize>,
    pub sparse_labels: SparseLabels,
    /// Sample ordinals, one per row.
    pub source_ids: Vec<usize>,
    pub raw_batch: Batch,
}

/// Sparse labels as tensors: `[n, 2]` i64 indices, `[n]` u32 values and the
/// `[2]` i64 dense shape.
pub struct SparseTensors {
    pub indices: Tensor,
    pub values: Tensor,
    pub dense_shape: Tensor,
}

impl SparseLabels {
    pub fn to_tensors(&self, device: &Device) -> Result<SparseTensors> {
        let flat = self.indices.iter().flatten().copied().collect::<Vec<i64>>();
        Ok(SparseTensors {
            indices: Tensor::from_vec(flat, (self.indices.len(), 2), device)?,
            values: Tensor::from_vec(self.values.clone(), self.values.len(), device)?,
            dense_shape: Tensor::new(
                &[self.dense_shape[0] as i64, self.dense_shape[1] as i64],
                device,
            )?,
        })
    }
}

/// Wraps a [`MatrixAssembler`] and places its output on a device.
#[derive(Clone)]
pub struct Processor {
    assembler: MatrixAssembler,
    device: Device,
}

impl Processor {
    pub fn new(assembler: MatrixAssembler, device: Device) -> Self {
        Self { assembler, device }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn process(&self, batch: Batch) -> Result<Features> {
        let assembled = self.assembler.assemble(batch)?;
        self.features(assembled)
    }

    fn features(&self, assembled: AssembledBatch) -> Result<Features> {
        let AssembledBatch {
            source_ids,
            audio,
            text,
            sparse_labels,
            frame_counts,
            raw,
        } = assembled;
        Ok(Features {
            audio: Tensor::from_vec(audio.data, (audio.rows, audio.cols), &self.device)?,
            text: Tensor::from_vec(text.data, (text.rows, text.cols), &self.device)?,
            frame_counts,
            sparse_labels,
            source_ids,
            raw_batch: raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use candle_core::DType;

    use super::*;
    use crate::audio::AudioDecoder;
    use crate::config::DataConfig;
    use crate::corpus::{AudioDescriptor, RawSample};

    struct Ramp;

    impl AudioDecoder for Ramp {
        fn decode(
            &self,
            _path: &Path,
            _offset: f64,
            duration: Option<f64>,
            target_rate: u32,
        ) -> Result<(Vec<f32>, u32)> {
            let n = (duration.unwrap_or(0.0) * target_rate as f64) as usize;
            Ok(((0..n).map(|i| i as f32).collect(), target_rate))
        }
    }

    fn processor() -> Processor {
        let config = DataConfig {
            sample_rate: 100,
            frame_step_ms: 10.0,
            cola_ctc_l: 3,
            ..DataConfig::default()
        };
        let assembler = MatrixAssembler::new(&config, Arc::new(Ramp)).unwrap();
        Processor::new(assembler, Device::Cpu)
    }

    fn sample(ordinal: usize, duration: f64, ids: Vec<u32>) -> RawSample {
        RawSample {
            ordinal,
            audio: AudioDescriptor {
                path: "x.wav".into(),
                offset: 0.0,
                duration: Some(duration),
            },
            target_ids: ids.clone(),
            ctc_ids: ids,
        }
    }

    #[test]
    fn test_process_shapes_and_fields() {
        let features = processor()
            .process(vec![sample(2, 0.05, vec![4, 5]), sample(0, 0.1, vec![6])])
            .unwrap();

        assert_eq!(features.audio.dims(), &[2, 10]);
        assert_eq!(features.audio.dtype(), DType::F32);
        assert_eq!(features.text.dims(), &[2, 2]);
        assert_eq!(features.text.dtype(), DType::U32);
        assert_eq!(
            features.text.to_vec2::<u32>().unwrap(),
            vec![vec![4, 5], vec![6, 0]]
        );
        let audio = features.audio.to_vec2::<f32>().unwrap();
        assert_eq!(audio[0][4], 4.0);
        assert_eq!(audio[0][5], 0.0);
        assert_eq!(features.source_ids, vec![2, 0]);
        assert_eq!(features.frame_counts, vec![5, 10]);
        assert_eq!(features.sparse_labels.values, vec![1, 2, 0]);
        assert_eq!(features.raw_batch.len(), 2);
    }

    #[test]
    fn test_sparse_tensors() {
        let features = processor()
            .process(vec![sample(0, 0.1, vec![7, 8]), sample(1, 0.1, vec![9])])
            .unwrap();
        let sparse = features.sparse_labels.to_tensors(&Device::Cpu).unwrap();
        assert_eq!(sparse.indices.dims(), &[3, 2]);
        assert_eq!(
            sparse.indices.to_vec2::<i64>().unwrap(),
            vec![vec![0, 0], vec![0, 1], vec![1, 0]]
        );
        assert_eq!(sparse.values.to_vec1::<u32>().unwrap(), vec![1, 2, 0]);
        assert_eq!(sparse.dense_shape.to_vec1::<i64>().unwrap(), vec![2, 2]);
    }

    #[test]
    fn test_processor_is_shareable_across_threads() {
        let processor = processor();
        std::thread::scope(|scope| {
            let handles = (0..4)
                .map(|i| {
                    let processor = &processor;
                    scope.spawn(move || processor.process(vec![sample(i, 0.1, vec![1])]))
                })
                .collect::<Vec<_>>();
            for handle in handles {
                let features = handle.join().unwrap().unwrap();
                assert_eq!(features.audio.dims(), &[1, 10]);
            }
        });
    }
}
