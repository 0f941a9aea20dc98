//! bucket-batcher CLI: run the batching pipeline over an aligned corpus.
//!
//! Streams the corpus through the bucketing engine for a number of epochs
//! and reports how the batches came out. With `--assemble` every batch is
//! also decoded and padded by a pool of worker threads, so audio problems
//! surface the same way they would during training.
//!
//! # Output
//!
//! One JSON summary line per epoch on stdout:
//!
//! ```json
//! {"epoch":1,"batches":12,"samples":940,"leaked":37,"max_cost":2996,"padding_ratio":0.041}
//! ```
//!
//! Exit code 0 on success, non-zero on the first read, parse or decode error.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};

use clap::Parser;
use serde::Serialize;
use speech_bucket_rs::{
    Batch, BucketingEngine, CorpusFiles, CorpusReader, DataConfig, MatrixAssembler, Processor,
    Vocab, Vocabulary, audio::WavDecoder, batching::batch_cost, config::CostPolicy,
    length::LengthEstimator,
};

#[derive(Parser, Debug)]
#[command(
    name = "bucket-batcher",
    about = "Bucketed batching over aligned speech corpora",
    long_about = "Reads aligned metadata / target / CTC reference files, groups samples of\n\
                  similar length into batches and prints a JSON summary line per epoch."
)]
struct Args {
    /// JSON data config. Omitted fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ';'-separated metadata files, one JSON record per line.
    #[arg(long, short = 's')]
    source: String,

    /// ';'-separated target token files, aligned with --source.
    #[arg(long, short = 't')]
    target: String,

    /// ';'-separated CTC reference files. Defaults to the target files.
    #[arg(long, default_value = "")]
    ctcref: String,

    /// Target vocabulary, one token per line.
    #[arg(long)]
    tgt_vocab: PathBuf,

    /// CTC reference vocabulary. Defaults to the target vocabulary.
    #[arg(long)]
    ctc_vocab: Option<PathBuf>,

    /// Append <eos> to every target sequence.
    #[arg(long)]
    append_eos: bool,

    /// Directory that relative audio paths are resolved against.
    #[arg(long)]
    audio_root: Option<PathBuf>,

    /// Number of passes over the corpus.
    #[arg(long, short = 'e', default_value_t = 1)]
    epochs: usize,

    /// Evaluation mode: emit everything at the end of each pass.
    #[arg(long)]
    eval: bool,

    /// Decode and pad every batch through the worker pool.
    #[arg(long)]
    assemble: bool,

    /// Override `process_num` from the config.
    #[arg(long)]
    workers: Option<usize>,

    /// Override `random_seed` from the config.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EpochSummary {
    epoch: usize,
    batches: usize,
    samples: usize,
    /// Samples waiting in the leak store after the pass.
    leaked: usize,
    max_cost: usize,
    /// Share of padded length cells that carry no data.
    padding_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    assembled: Option<usize>,
}

/// Running batch statistics for one epoch.
struct Tally {
    policy: CostPolicy,
    estimator: LengthEstimator,
    batches: usize,
    samples: usize,
    max_cost: usize,
    real_cells: usize,
    padded_cells: usize,
}

impl Tally {
    fn new(config: &DataConfig) -> Self {
        Self {
            policy: config.batch_or_token,
            estimator: LengthEstimator::from_config(config),
            batches: 0,
            samples: 0,
            max_cost: 0,
            real_cells: 0,
            padded_cells: 0,
        }
    }

    fn observe(&mut self, batch: &Batch) {
        let lengths = batch
            .iter()
            .map(|s| self.estimator.frames(&s.audio).max(s.target_ids.len()))
            .collect::<Vec<_>>();
        let longest = lengths.iter().copied().max().unwrap_or(0);

        self.batches += 1;
        self.samples += batch.len();
        self.max_cost = self
            .max_cost
            .max(batch_cost(batch, self.policy, &self.estimator));
        self.real_cells += lengths.iter().sum::<usize>();
        self.padded_cells += longest * batch.len();
    }

    fn padding_ratio(&self) -> f64 {
        if self.padded_cells == 0 {
            return 0.0;
        }
        1.0 - self.real_cells as f64 / self.padded_cells as f64
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    run(Args::parse()).inspect_err(|e| {
        if let Some(err) = e.downcast_ref::<speech_bucket_rs::Error>()
            && err.is_fatal_data_error()
        {
            tracing::error!(error = %err, "Pass aborted on unusable corpus data");
        }
    })
}

fn run(args: Args) -> anyhow::Result<()> {
    // ── Config ──

    let mut config = match &args.config {
        Some(path) => DataConfig::load(path)?,
        None => DataConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.process_num = workers;
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    config.validate()?;

    // ── Corpus ──

    let mut files = CorpusFiles::from_lists(&args.source, &args.target, &args.ctcref)?;
    if let Some(root) = &args.audio_root {
        files = files.with_audio_root(root);
    }
    let tgt_vocab: Arc<dyn Vocabulary> =
        Arc::new(Vocab::load(&args.tgt_vocab)?.with_eos(args.append_eos));
    let ctc_vocab: Arc<dyn Vocabulary> = match &args.ctc_vocab {
        Some(path) => Arc::new(Vocab::load(path)?),
        None => tgt_vocab.clone(),
    };
    tracing::info!(
        groups = files.groups.len(),
        tgt_vocab = tgt_vocab.size(),
        ctc_vocab = ctc_vocab.size(),
        "Loaded corpus description"
    );

    let reader = CorpusReader::new(files, tgt_vocab, ctc_vocab, &config);
    let mut engine = BucketingEngine::new(config.clone())?;

    let processor = if args.assemble {
        let device = candle_core::Device::cuda_if_available(0)?;
        tracing::info!("Using device: {:?}", device);
        let assembler = MatrixAssembler::new(&config, Arc::new(WavDecoder))?;
        Some(Processor::new(assembler, device))
    } else {
        None
    };

    // ── Epochs ──

    let train = !args.eval;
    for epoch in 1..=args.epochs {
        let mut tally = Tally::new(&config);
        let mut batches = engine.batches(reader.samples(train), train);

        let assembled = match &processor {
            Some(processor) => Some(assemble_pass(
                &mut batches,
                &mut tally,
                processor,
                config.process_num,
            )?),
            None => {
                for batch in batches.by_ref() {
                    tally.observe(&batch?);
                }
                None
            }
        };
        let stats = batches.stats();
        drop(batches);

        tracing::info!(
            epoch,
            read = stats.read,
            windows = stats.windows,
            leaked_batches = stats.leaked_batches,
            "Epoch complete"
        );

        let summary = EpochSummary {
            epoch,
            batches: tally.batches,
            samples: tally.samples,
            leaked: engine.leaked(),
            max_cost: tally.max_cost,
            padding_ratio: tally.padding_ratio(),
            assembled,
        };
        println!("{}", serde_json::to_string(&summary)?);
    }

    Ok(())
}

/// Feed one pass of batches to `workers` scoped threads sharing `processor`.
///
/// Returns the number of batches assembled. The first error, from the
/// reader or from any worker, fails the pass.
fn assemble_pass<I>(
    batches: &mut I,
    tally: &mut Tally,
    processor: &Processor,
    workers: usize,
) -> anyhow::Result<usize>
where
    I: Iterator<Item = speech_bucket_rs::Result<Batch>>,
{
    let (batch_tx, batch_rx) = mpsc::sync_channel::<Batch>(workers * 2);
    let (result_tx, result_rx) = mpsc::channel();
    let batch_rx = Mutex::new(batch_rx);

    std::thread::scope(|scope| -> anyhow::Result<usize> {
        for worker in 0..workers {
            let batch_rx = &batch_rx;
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                loop {
                    let next = match batch_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(batch) = next else { break };
                    let size = batch.len();
                    let outcome = processor.process(batch).map(|features| {
                        tracing::debug!(
                            worker,
                            size,
                            dims = ?features.audio.dims(),
                            "Assembled batch"
                        );
                    });
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let fed = feed(batches, tally, &batch_tx);
        drop(batch_tx);

        let mut assembled = 0;
        let mut first_error = None;
        for outcome in result_rx {
            match outcome {
                Ok(()) => assembled += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        fed?;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(assembled),
        }
    })
}

fn feed<I>(batches: &mut I, tally: &mut Tally, tx: &mpsc::SyncSender<Batch>) -> anyhow::Result<()>
where
    I: Iterator<Item = speech_bucket_rs::Result<Batch>>,
{
    for batch in batches {
        let batch = batch?;
        tally.observe(&batch);
        tx.send(batch)
            .map_err(|_| anyhow::anyhow!("assembly workers exited early"))?;
    }
    Ok(())
}
