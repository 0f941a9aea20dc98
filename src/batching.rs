//! Streaming bucketed batching.
//!
//! Samples are pulled from a reader into a bounded window. Each full window
//! is sorted by estimated length, split under the configured cost policy and
//! emitted in (optionally shuffled) batch order:
//!
//! ```text
//! leak store ─┐
//!             ├→ window (≤ buffer_size) → sort → split → reorder ─┬→ emitted batches
//! reader ─────┘                                                   └→ undersized → leak store
//! ```
//!
//! Batches whose cost falls below `data_leak_ratio * size` go back to the
//! [`LeakStore`] and are retried at the front of the next window. At the end
//! of a training pass the undersized tail stays in the store and opens the
//! next epoch; an evaluation pass emits everything.

mod indexer;
mod leak;

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::Result;
use crate::config::{CostPolicy, DataConfig};
use crate::corpus::RawSample;
use crate::length::LengthEstimator;

pub use indexer::{batch_indexer, token_indexer};
pub use leak::{LeakStore, batch_cost, is_undersized};

/// Samples that are assembled together, in length-sorted order.
pub type Batch = Vec<RawSample>;

/// Counters for one pass, available from [`Batches::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Samples pulled from the reader.
    pub read: usize,
    /// Windows bucketed.
    pub windows: usize,
    /// Batches emitted.
    pub batches: usize,
    /// Samples emitted.
    pub samples: usize,
    /// Batches sent to the leak store.
    pub leaked_batches: usize,
}

/// Owns the leak store and shuffling state across passes.
///
/// One engine per dataset; [`BucketingEngine::batches`] borrows it mutably
/// so the leak store has a single writer.
#[derive(Debug)]
pub struct BucketingEngine {
    config: DataConfig,
    estimator: LengthEstimator,
    leak: LeakStore,
    rng: StdRng,
}

impl BucketingEngine {
    pub fn new(config: DataConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            estimator: LengthEstimator::from_config(&config),
            rng: StdRng::seed_from_u64(config.random_seed),
            leak: LeakStore::default(),
            config,
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn estimator(&self) -> &LengthEstimator {
        &self.estimator
    }

    /// Samples currently deferred.
    pub fn leaked(&self) -> usize {
        self.leak.len()
    }

    pub fn leak_store(&self) -> &LeakStore {
        &self.leak
    }

    /// Sort key: the larger of estimated frames and target length.
    pub fn sort_key(&self, sample: &RawSample) -> usize {
        self.estimator
            .frames(&sample.audio)
            .max(sample.target_ids.len())
    }

    /// Cost of `batch` under the configured policy.
    pub fn cost(&self, batch: &[RawSample]) -> usize {
        batch_cost(batch, self.config.batch_or_token, &self.estimator)
    }

    /// Sort, split and reorder one window. No leak filtering.
    ///
    /// Sample order inside a batch is ascending by [`Self::sort_key`]; only
    /// the order of whole batches is shuffled.
    pub fn bucket(&mut self, mut window: Vec<RawSample>) -> Vec<Batch> {
        window.sort_by_key(|s| self.sort_key(s));
        let estimator = self.estimator;

        let limit = self.config.size();
        let ranges = match self.config.batch_or_token {
            CostPolicy::Batch => batch_indexer(window.len(), limit),
            CostPolicy::Token => {
                let costs = window
                    .iter()
                    .map(|s| [estimator.frames(&s.audio), s.target_ids.len()])
                    .collect::<Vec<_>>();
                token_indexer(&costs, limit)
            }
        };

        let mut samples = window.into_iter();
        let mut slots = ranges
            .iter()
            .map(|range| Some(samples.by_ref().take(range.len()).collect::<Batch>()))
            .collect::<Vec<_>>();

        let mut order = (0..slots.len()).collect::<Vec<_>>();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }
        order.into_iter().filter_map(|i| slots[i].take()).collect()
    }

    /// Lazily batch one pass of `samples`.
    ///
    /// The leak store is drained into the first window. With `train` the
    /// undersized tail of the pass is kept for the next call; without it
    /// every remaining sample is emitted. A reader error ends the pass after
    /// it is yielded.
    pub fn batches<I>(&mut self, samples: I, train: bool) -> Batches<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Result<RawSample>>,
    {
        let window = self.leak.drain();
        Batches {
            engine: self,
            source: samples.into_iter(),
            train,
            window,
            ready: VecDeque::new(),
            exhausted: false,
            stats: PassStats::default(),
        }
    }

    /// Route bucketed batches: emit or defer to the leak store.
    fn route(
        &mut self,
        window: Vec<RawSample>,
        last: bool,
        train: bool,
        out: &mut VecDeque<Batch>,
    ) -> usize {
        let limit = self.config.size();
        let ratio = self.config.data_leak_ratio;
        let mut leaked = 0;
        for batch in self.bucket(window) {
            let cost = self.cost(&batch);
            let defer = (!last || train) && is_undersized(cost, limit, ratio);
            if defer {
                tracing::debug!(
                    cost,
                    limit,
                    samples = batch.len(),
                    last,
                    "deferring undersized batch"
                );
                self.leak.push_batch(batch);
                leaked += 1;
            } else {
                out.push_back(batch);
            }
        }
        leaked
    }
}

/// One pass of batches. Created by [`BucketingEngine::batches`].
///
/// Dropping it early returns every sample not yet handed out to the leak
/// store, so nothing read is lost.
pub struct Batches<'a, I> {
    engine: &'a mut BucketingEngine,
    source: I,
    train: bool,
    window: Vec<RawSample>,
    ready: VecDeque<Batch>,
    exhausted: bool,
    stats: PassStats,
}

impl<I> Batches<'_, I>
where
    I: Iterator<Item = Result<RawSample>>,
{
    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Samples currently in the engine's leak store.
    pub fn leaked(&self) -> usize {
        self.engine.leaked()
    }

    /// Fill the window and bucket it. `Err` aborts the pass.
    fn cycle(&mut self) -> Result<()> {
        let buffer_size = self.engine.config.buffer_size;
        let mut full = false;
        while !full {
            match self.source.next() {
                Some(Ok(sample)) => {
                    self.window.push(sample);
                    self.stats.read += 1;
                    full = self.window.len() >= buffer_size;
                }
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e);
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        let window = std::mem::take(&mut self.window);
        if window.is_empty() {
            return Ok(());
        }
        let size = window.len();
        let leaked = self
            .engine
            .route(window, self.exhausted, self.train, &mut self.ready);
        self.stats.windows += 1;
        self.stats.leaked_batches += leaked;
        tracing::debug!(
            window = size,
            emitted = self.ready.len(),
            leaked,
            last = self.exhausted,
            "bucketed window"
        );

        if !self.exhausted {
            self.window = self.engine.leak.drain();
        }
        Ok(())
    }
}

impl<I> Iterator for Batches<'_, I>
where
    I: Iterator<Item = Result<RawSample>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = self.ready.pop_front() {
                self.stats.batches += 1;
                self.stats.samples += batch.len();
                return Some(Ok(batch));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.cycle() {
                return Some(Err(e));
            }
        }
    }
}

impl<I> Drop for Batches<'_, I> {
    fn drop(&mut self) {
        let window = std::mem::take(&mut self.window);
        if !window.is_empty() {
            self.engine.leak.push_batch(window);
        }
        for batch in self.ready.drain(..) {
            self.engine.leak.push_batch(batch);
        }
    }
}
