//! Token vocabulary.
//!
//! [`Vocabulary`] is the seam the corpus reader maps tokens through. [`Vocab`]
//! is the plain one-token-per-line implementation with `<pad>`, `<eos>` and
//! `<unk>` reserved at ids 0, 1 and 2.

use std::collections::HashMap;
use std::path::Path;

use crate::{Error, Result};

pub const PAD_SYMBOL: &str = "<pad>";
pub const EOS_SYMBOL: &str = "<eos>";
pub const UNK_SYMBOL: &str = "<unk>";

/// Token-to-id mapping consumed by the corpus reader.
pub trait Vocabulary: Send + Sync {
    /// Map at most `limit` tokens to ids.
    fn to_id(&self, tokens: &[&str], limit: usize) -> Result<Vec<u32>>;

    /// Number of entries.
    fn size(&self) -> usize;

    /// Id used for padding.
    fn pad_id(&self) -> u32;
}

/// In-memory vocabulary.
#[derive(Debug, Clone)]
pub struct Vocab {
    word2id: HashMap<String, u32>,
    id2word: Vec<String>,
    unk: Option<u32>,
    pad: u32,
    eos: Option<u32>,
    append_eos: bool,
}

impl Vocab {
    /// Vocabulary with the reserved symbols followed by `tokens`.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::empty();
        for special in [PAD_SYMBOL, EOS_SYMBOL, UNK_SYMBOL] {
            vocab.insert(special);
        }
        vocab.pad = 0;
        vocab.eos = Some(1);
        vocab.unk = Some(2);
        for token in tokens {
            vocab.insert(token);
        }
        vocab
    }

    /// Vocabulary of exactly `tokens`, without reserved symbols.
    ///
    /// Unknown tokens are a lookup failure; id 0 doubles as padding.
    pub fn without_specials<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::empty();
        for token in tokens {
            vocab.insert(token);
        }
        vocab
    }

    /// Load a vocabulary file: the first whitespace field of every
    /// non-blank line is a token. Duplicates keep their first id.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let tokens = data
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let vocab = Self::from_tokens(tokens);
        tracing::debug!(path = %path.as_ref().display(), size = vocab.size(), "loaded vocabulary");
        Ok(vocab)
    }

    /// Append `<eos>` to every mapped sequence, inside the length limit.
    pub fn with_eos(mut self, append_eos: bool) -> Self {
        self.append_eos = append_eos;
        self
    }

    /// Id of a token, if present.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.word2id.get(token).copied()
    }

    /// Token of an id, if present.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.id2word.get(id as usize).map(String::as_str)
    }

    fn empty() -> Self {
        Self {
            word2id: HashMap::new(),
            id2word: Vec::new(),
            unk: None,
            pad: 0,
            eos: None,
            append_eos: false,
        }
    }

    fn insert(&mut self, token: impl Into<String>) {
        let token = token.into();
        if self.word2id.contains_key(&token) {
            return;
        }
        let id = self.id2word.len() as u32;
        self.word2id.insert(token.clone(), id);
        self.id2word.push(token);
    }

    fn lookup(&self, token: &str) -> Result<u32> {
        self.get(token).or(self.unk).ok_or_else(|| Error::Lookup {
            token: token.to_string(),
        })
    }
}

impl Vocabulary for Vocab {
    fn to_id(&self, tokens: &[&str], limit: usize) -> Result<Vec<u32>> {
        let eos = if self.append_eos { self.eos } else { None };
        let budget = if eos.is_some() {
            limit.saturating_sub(1)
        } else {
            limit
        };
        let mut ids = tokens
            .iter()
            .take(budget)
            .map(|token| self.lookup(token))
            .collect::<Result<Vec<_>>>()?;
        if let Some(eos) = eos.filter(|_| limit > 0) {
            ids.push(eos);
        }
        Ok(ids)
    }

    fn size(&self) -> usize {
        self.id2word.len()
    }

    fn pad_id(&self) -> u32 {
        self.pad
    }
}
