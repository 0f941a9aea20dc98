//! Aligned corpus reader.
//!
//! A corpus is one or more *groups*, each a triple of line-aligned files:
//!
//! ```text
//! source  : {"wav": "ted_1.wav", "offset": 12.61, "duration": 3.5}
//! target  : whitespace tokenized translation
//! ctcref  : whitespace tokenized transcript (auxiliary CTC labels)
//! ```
//!
//! [`CorpusReader::samples`] walks the groups in order and yields
//! [`RawSample`]s lazily. Each call starts over from the first line of the
//! first group; the reader keeps no state between calls.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::{Error, Result};
use crate::config::DataConfig;
use crate::vocab::Vocabulary;

/// Where and which part of an audio file a sample refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDescriptor {
    pub path: PathBuf,
    /// Start of the clip in seconds.
    pub offset: f64,
    /// Clip length in seconds. `None` reads to the end of the file.
    pub duration: Option<f64>,
}

/// One aligned corpus entry, ready for bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Position in the reader output of the pass that produced it.
    pub ordinal: usize,
    pub audio: AudioDescriptor,
    pub target_ids: Vec<u32>,
    pub ctc_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct MetadataRecord {
    #[serde(alias = "path")]
    wav: String,
    #[serde(default)]
    offset: f64,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataLine {
    List(Vec<MetadataRecord>),
    Single(MetadataRecord),
}

/// Parse one metadata line into an [`AudioDescriptor`].
///
/// Accepts a JSON object or a list whose first element is the object.
/// `duration` must be present and positive.
pub fn parse_metadata(
    line: &str,
    audio_root: Option<&Path>,
) -> std::result::Result<AudioDescriptor, String> {
    let record = match serde_json::from_str::<MetadataLine>(line).map_err(|e| e.to_string())? {
        MetadataLine::Single(record) => record,
        MetadataLine::List(records) => records
            .into_iter()
            .next()
            .ok_or_else(|| "empty metadata list".to_string())?,
    };

    if !record.offset.is_finite() || record.offset < 0.0 {
        return Err(format!("offset must be >= 0, got {}", record.offset));
    }
    match record.duration {
        Some(d) if d.is_finite() && d > 0.0 => {}
        Some(d) => return Err(format!("duration must be > 0, got {d}")),
        None => return Err("missing duration".to_string()),
    }

    let path = match audio_root {
        Some(root) => root.join(&record.wav),
        None => PathBuf::from(&record.wav),
    };
    Ok(AudioDescriptor {
        path,
        offset: record.offset,
        duration: record.duration,
    })
}

/// One file triple.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusGroup {
    pub source: PathBuf,
    pub target: PathBuf,
    pub ctcref: PathBuf,
}

/// The file groups of a corpus plus the directory audio paths are relative to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusFiles {
    pub groups: Vec<CorpusGroup>,
    pub audio_root: Option<PathBuf>,
}

impl CorpusFiles {
    /// Build from `;`-separated path lists.
    ///
    /// An empty `ctcrefs` reuses the targets as the secondary reference.
    pub fn from_lists(sources: &str, targets: &str, ctcrefs: &str) -> Result<Self> {
        let split = |list: &str| -> Vec<PathBuf> {
            list.trim()
                .split(';')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        };
        let sources = split(sources);
        let targets = split(targets);
        let ctcrefs = if ctcrefs.trim().is_empty() {
            targets.clone()
        } else {
            split(ctcrefs)
        };

        if sources.len() != targets.len() || sources.len() != ctcrefs.len() {
            return Err(Error::Config(format!(
                "corpus group counts differ: {} source, {} target, {} ctc files",
                sources.len(),
                targets.len(),
                ctcrefs.len()
            )));
        }

        let groups = sources
            .into_iter()
            .zip(targets)
            .zip(ctcrefs)
            .map(|((source, target), ctcref)| CorpusGroup {
                source,
                target,
                ctcref,
            })
            .collect();
        Ok(Self {
            groups,
            audio_root: None,
        })
    }

    /// Resolve audio paths relative to `root`.
    pub fn with_audio_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.audio_root = Some(root.into());
        self
    }
}

/// Restartable reader over a [`CorpusFiles`] set.
#[derive(Clone)]
pub struct CorpusReader {
    files: CorpusFiles,
    tgt_vocab: Arc<dyn Vocabulary>,
    ctc_vocab: Arc<dyn Vocabulary>,
    max_text_len: usize,
    strict_alignment: bool,
}

impl CorpusReader {
    pub fn new(
        files: CorpusFiles,
        tgt_vocab: Arc<dyn Vocabulary>,
        ctc_vocab: Arc<dyn Vocabulary>,
        config: &DataConfig,
    ) -> Self {
        Self {
            files,
            tgt_vocab,
            ctc_vocab,
            max_text_len: config.max_text_len,
            strict_alignment: config.strict_alignment,
        }
    }

    pub fn files(&self) -> &CorpusFiles {
        &self.files
    }

    /// Start a fresh pass over the corpus.
    ///
    /// In training mode positions with an empty line in any stream are
    /// skipped; otherwise they are kept and an empty token line becomes an
    /// empty id sequence.
    pub fn samples(&self, train: bool) -> Samples<'_> {
        Samples {
            reader: self,
            train,
            group_idx: 0,
            open: None,
            ordinal: 0,
            done: false,
        }
    }
}

struct OpenGroup {
    streams: [BufReader<File>; 3],
    paths: [PathBuf; 3],
    line: usize,
}

impl OpenGroup {
    fn open(group: &CorpusGroup) -> Result<Self> {
        let paths = [
            group.source.clone(),
            group.target.clone(),
            group.ctcref.clone(),
        ];
        let streams = [
            BufReader::new(File::open(&paths[0])?),
            BufReader::new(File::open(&paths[1])?),
            BufReader::new(File::open(&paths[2])?),
        ];
        Ok(Self {
            streams,
            paths,
            line: 0,
        })
    }

    /// Next aligned line triple, or `None` once any stream is exhausted.
    /// The flags report which streams hit end-of-file.
    fn next_lines(&mut self) -> Result<std::result::Result<[String; 3], [bool; 3]>> {
        let mut lines: [String; 3] = Default::default();
        let mut eof = [false; 3];
        for (i, stream) in self.streams.iter_mut().enumerate() {
            eof[i] = stream.read_line(&mut lines[i])? == 0;
        }
        self.line += 1;
        if eof.iter().any(|&e| e) {
            return Ok(Err(eof));
        }
        Ok(Ok(lines))
    }
}

/// Lazy sample sequence for one pass. Created by [`CorpusReader::samples`].
///
/// After an error is yielded the sequence ends.
pub struct Samples<'a> {
    reader: &'a CorpusReader,
    train: bool,
    group_idx: usize,
    open: Option<OpenGroup>,
    ordinal: usize,
    done: bool,
}

impl Samples<'_> {
    fn advance(&mut self) -> Result<Option<RawSample>> {
        loop {
            if self.open.is_none() {
                let Some(group) = self.reader.files.groups.get(self.group_idx) else {
                    return Ok(None);
                };
                self.open = Some(OpenGroup::open(group)?);
            }
            let Some(open) = self.open.as_mut() else {
                continue;
            };

            let lines = match open.next_lines()? {
                Ok(lines) => lines,
                Err(eof) => {
                    if !eof.iter().all(|&e| e) {
                        self.report_truncation(eof)?;
                    }
                    self.open = None;
                    self.group_idx += 1;
                    continue;
                }
            };

            let [src, tgt, ctc] = lines.map(|l| l.trim().to_string());
            if self.train && (src.is_empty() || tgt.is_empty() || ctc.is_empty()) {
                continue;
            }

            let line = open.line;
            let audio = parse_metadata(&src, self.reader.files.audio_root.as_deref()).map_err(
                |message| Error::Parse {
                    path: open.paths[0].clone(),
                    line,
                    message,
                },
            )?;
            let tgt_tokens = tgt.split_whitespace().collect::<Vec<_>>();
            let ctc_tokens = ctc.split_whitespace().collect::<Vec<_>>();
            let sample = RawSample {
                ordinal: self.ordinal,
                audio,
                target_ids: self.reader.tgt_vocab.to_id(&tgt_tokens, self.reader.max_text_len)?,
                ctc_ids: self.reader.ctc_vocab.to_id(&ctc_tokens, self.reader.max_text_len)?,
            };
            self.ordinal += 1;
            return Ok(Some(sample));
        }
    }

    fn report_truncation(&self, eof: [bool; 3]) -> Result<()> {
        let line = self.open.as_ref().map_or(0, |g| g.line);
        let ended = ["source", "target", "ctcref"]
            .iter()
            .zip(eof)
            .filter(|(_, e)| *e)
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!("{ended} ended at line {line} while other streams continue");
        if self.reader.strict_alignment {
            return Err(Error::Misaligned {
                group: self.group_idx,
                message,
            });
        }
        tracing::warn!(
            group = self.group_idx,
            %message,
            "truncating corpus group at shortest stream"
        );
        Ok(())
    }
}

impl Iterator for Samples<'_> {
    type Item = Result<RawSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
