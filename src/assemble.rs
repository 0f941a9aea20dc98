//! Batch → padded matrices.
//!
//! [`MatrixAssembler::assemble`] decodes every clip in a batch, pads or
//! truncates the waveforms and target ids into dense row-major matrices, and
//! packs the auxiliary CTC references into a sparse coordinate list.
//!
//! With a label modulus `L` configured each CTC label becomes `id mod L`,
//! folding the token vocabulary onto a small fixed alphabet. The mapping is
//! lossy on purpose.

use std::sync::Arc;

use crate::{Error, Result};
use crate::audio::AudioDecoder;
use crate::batching::Batch;
use crate::config::DataConfig;
use crate::corpus::RawSample;
use crate::length::LengthEstimator;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Copy + Default> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Copy `values` into row `r`, truncated to the row width.
    fn fill_row(&mut self, r: usize, values: &[T]) {
        let n = values.len().min(self.cols);
        self.data[r * self.cols..r * self.cols + n].copy_from_slice(&values[..n]);
    }
}

/// Coordinate-list encoding of variable-length label sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseLabels {
    /// `(batch_index, position)` per value.
    pub indices: Vec<[i64; 2]>,
    pub values: Vec<u32>,
    /// `[batch, max_len]`.
    pub dense_shape: [usize; 2],
}

impl SparseLabels {
    /// Pack `sequences`, each truncated to `min(max_len, longest)`.
    pub fn from_sequences(sequences: &[&[u32]], max_len: usize, modulus: Option<u32>) -> Self {
        let width = sequences
            .iter()
            .map(|s| s.len())
            .max()
            .unwrap_or(0)
            .min(max_len);

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (n, sequence) in sequences.iter().enumerate() {
            for (t, &id) in sequence.iter().take(width).enumerate() {
                indices.push([n as i64, t as i64]);
                values.push(match modulus {
                    Some(l) => id % l,
                    None => id,
                });
            }
        }

        Self {
            indices,
            values,
            dense_shape: [sequences.len(), width],
        }
    }

    /// Number of stored labels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Matrices for one batch, rows in batch order.
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    /// Sample ordinals, one per row.
    pub source_ids: Vec<usize>,
    /// `[batch, min(max_frame_len, longest decoded clip)]`, zero padded.
    pub audio: Matrix<f32>,
    /// `[batch, min(max_text_len, longest target)]`, zero padded.
    pub text: Matrix<u32>,
    pub sparse_labels: SparseLabels,
    /// Estimated frame count per row.
    pub frame_counts: Vec<usize>,
    pub raw: Batch,
}

/// Stateless batch assembler. Safe to share between worker threads.
#[derive(Clone)]
pub struct MatrixAssembler {
    decoder: Arc<dyn AudioDecoder>,
    estimator: LengthEstimator,
    sample_rate: u32,
    max_frame_len: usize,
    max_text_len: usize,
    label_modulus: Option<u32>,
}

impl MatrixAssembler {
    pub fn new(config: &DataConfig, decoder: Arc<dyn AudioDecoder>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder,
            estimator: LengthEstimator::from_config(config),
            sample_rate: config.sample_rate,
            max_frame_len: config.max_frame_len,
            max_text_len: config.max_text_len,
            label_modulus: config.label_modulus(),
        })
    }

    /// Decode and pad one batch. Any decode failure fails the whole batch.
    pub fn assemble(&self, batch: Batch) -> Result<AssembledBatch> {
        let signals = batch
            .iter()
            .map(|sample| self.decode(sample))
            .collect::<Result<Vec<_>>>()?;

        let audio_len = signals
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .min(self.max_frame_len);
        let text_len = batch
            .iter()
            .map(|s| s.target_ids.len())
            .max()
            .unwrap_or(0)
            .min(self.max_text_len);

        let mut audio = Matrix::zeros(batch.len(), audio_len);
        let mut text = Matrix::zeros(batch.len(), text_len);
        for (row, (sample, signal)) in batch.iter().zip(&signals).enumerate() {
            audio.fill_row(row, signal);
            text.fill_row(row, &sample.target_ids);
        }

        let ctc = batch.iter().map(|s| s.ctc_ids.as_slice()).collect::<Vec<_>>();
        let sparse_labels =
            SparseLabels::from_sequences(&ctc, self.max_text_len, self.label_modulus);

        Ok(AssembledBatch {
            source_ids: batch.iter().map(|s| s.ordinal).collect(),
            frame_counts: batch.iter().map(|s| self.estimator.frames(&s.audio)).collect(),
            audio,
            text,
            sparse_labels,
            raw: batch,
        })
    }

    fn decode(&self, sample: &RawSample) -> Result<Vec<f32>> {
        let audio = &sample.audio;
        let (signal, rate) =
            self.decoder
                .decode(&audio.path, audio.offset, audio.duration, self.sample_rate)?;
        if rate != self.sample_rate {
            return Err(Error::decode(
                &audio.path,
                format!("decoded at {rate} Hz, expected {} Hz", self.sample_rate),
            ));
        }
        Ok(signal)
    }
}
