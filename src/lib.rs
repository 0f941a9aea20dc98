//! Streaming bucketed batching for speech sequence-to-sequence training.
//!
//! Reads aligned (audio metadata, target tokens, CTC reference tokens)
//! corpora, groups samples of similar length into batches under a sample
//! count or length budget, and assembles each batch into padded matrices.
//! Memory stays bounded by the window size regardless of corpus size.
//!
//! ## Architecture
//!
//! ```text
//! source.txt ─┐
//! target.txt ─┼→ CorpusReader ──→ BucketingEngine ──→ Processor ──→ Features
//! ctcref.txt ─┘   (RawSample)      window, sort,       decode,       candle
//!                                  split, shuffle      pad, pack     tensors
//!                                       ↑↓
//!                                   LeakStore
//! ```
//!
//! ## Modules
//!
//! - [`corpus`]: aligned file groups, metadata parsing, the sample reader
//! - [`vocab`]: token → id lookup
//! - [`length`]: frame-count estimates from clip durations
//! - [`batching`]: windowed bucketing, cost policies, the leak store
//! - [`assemble`]: padded matrices and sparse CTC labels
//! - [`processor`]: batch → tensors, shared by worker threads
//! - [`audio`]: WAV decoding
//! - [`config`]: pipeline configuration

pub mod assemble;
pub mod audio;
pub mod batching;
pub mod config;
pub mod corpus;
pub mod length;
pub mod processor;
pub mod vocab;

mod error;

pub use error::{Error, Result};

pub use assemble::{AssembledBatch, MatrixAssembler, SparseLabels};
pub use batching::{Batch, BucketingEngine};
pub use config::{CostPolicy, DataConfig};
pub use corpus::{CorpusFiles, CorpusReader, RawSample};
pub use processor::{Features, Processor};
pub use vocab::{Vocab, Vocabulary};
