//! Audio decoding.
//!
//! The matrix assembler only sees the [`AudioDecoder`] trait; [`WavDecoder`]
//! is the default implementation for PCM/float WAV corpora.

mod wav;

use std::path::Path;

use crate::Result;

pub use wav::{WavDecoder, write_wav};

/// Decodes a clip of an audio file into mono `f32` samples.
///
/// Implementations return the rate the samples are at. Callers treat a rate
/// different from `target_rate` as a decode failure.
pub trait AudioDecoder: Send + Sync {
    fn decode(
        &self,
        path: &Path,
        offset: f64,
        duration: Option<f64>,
        target_rate: u32,
    ) -> Result<(Vec<f32>, u32)>;
}
