//! Configuration for the batching pipeline.
//!
//! Mirrors the data-related entries of the training hyper-parameter record.
//! Every field has a documented default and the whole record is validated
//! once, when a component that consumes it is constructed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How batch capacity is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostPolicy {
    /// Fixed number of samples per batch.
    Batch,
    /// Cumulative length budget per batch.
    Token,
}

/// Data pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    // --- Batching ---
    /// Cost policy. Default: token.
    pub batch_or_token: CostPolicy,
    /// Samples per batch under [`CostPolicy::Batch`]. Default: 80.
    pub batch_size: usize,
    /// Cost budget per batch under [`CostPolicy::Token`]. Default: 3000.
    pub token_size: usize,
    /// Samples read into one bucketing window. Default: 100.
    pub buffer_size: usize,
    /// Shuffle batch order within each window. Default: true.
    pub shuffle: bool,
    /// Batches below `data_leak_ratio * size` are deferred. Default: 0.5.
    pub data_leak_ratio: f64,
    /// Seed for batch-order shuffling. Default: 1234.
    pub random_seed: u64,

    // --- Shapes ---
    /// Upper bound on the padded audio width. Default: 100.
    pub max_frame_len: usize,
    /// Upper bound on token sequence length. Default: 100.
    pub max_text_len: usize,

    // --- Audio ---
    /// Target sample rate in Hz. Default: 16000.
    pub sample_rate: u32,
    /// Analysis frame step in milliseconds. Default: 10.
    pub frame_step_ms: f64,

    // --- Auxiliary CTC labels ---
    /// Label compression modulus; `<= 0` disables. Default: -1.
    #[serde(alias = "cola_ctc_L")]
    pub cola_ctc_l: i64,

    // --- Reader ---
    /// Fail the pass when aligned streams have unequal lengths. Default: false.
    pub strict_alignment: bool,

    // --- Worker pool ---
    /// Assembly workers used by the CLI. Default: 1.
    pub process_num: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            batch_or_token: CostPolicy::Token,
            batch_size: 80,
            token_size: 3000,
            buffer_size: 100,
            shuffle: true,
            data_leak_ratio: 0.5,
            random_seed: 1234,
            max_frame_len: 100,
            max_text_len: 100,
            sample_rate: 16_000,
            frame_step_ms: 10.0,
            cola_ctc_l: -1,
            strict_alignment: false,
            process_num: 1,
        }
    }
}

impl DataConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Batch limit for the active policy.
    pub fn size(&self) -> usize {
        match self.batch_or_token {
            CostPolicy::Batch => self.batch_size,
            CostPolicy::Token => self.token_size,
        }
    }

    /// Frame step expressed in samples.
    pub fn frame_step_samples(&self) -> usize {
        (self.frame_step_ms * self.sample_rate as f64 / 1e3) as usize
    }

    /// Label compression modulus, if enabled.
    pub fn label_modulus(&self) -> Option<u32> {
        (self.cola_ctc_l > 0).then(|| self.cola_ctc_l as u32)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be positive".into()));
        }
        if self.size() == 0 {
            return Err(Error::Config(format!(
                "{} limit must be positive",
                match self.batch_or_token {
                    CostPolicy::Batch => "batch_size",
                    CostPolicy::Token => "token_size",
                }
            )));
        }
        if !self.data_leak_ratio.is_finite() || self.data_leak_ratio < 0.0 {
            return Err(Error::Config(format!(
                "data_leak_ratio must be a non-negative number, got {}",
                self.data_leak_ratio
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".into()));
        }
        if !(self.frame_step_ms > 0.0) {
            return Err(Error::Config(format!(
                "frame_step_ms must be positive, got {}",
                self.frame_step_ms
            )));
        }
        if self.frame_step_samples() == 0 {
            return Err(Error::Config(format!(
                "frame step of {} ms is shorter than one sample at {} Hz",
                self.frame_step_ms, self.sample_rate
            )));
        }
        if self.max_frame_len == 0 || self.max_text_len == 0 {
            return Err(Error::Config(
                "max_frame_len and max_text_len must be positive".into(),
            ));
        }
        if self.process_num == 0 {
            return Err(Error::Config("process_num must be positive".into()));
        }
        if self.cola_ctc_l > u32::MAX as i64 {
            return Err(Error::Config(format!(
                "cola_ctc_L {} does not fit a label id",
                self.cola_ctc_l
            )));
        }
        Ok(())
    }
}
