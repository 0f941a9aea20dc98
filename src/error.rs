//! Error types for speech-bucket-rs.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// `Parse`, `Lookup` and `Decode` are the fatal kinds surfaced by the corpus
/// reader and the matrix assembler. Stream truncation on unequal file lengths
/// is a policy, not an error, unless strict alignment is requested.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed metadata record in a corpus file.
    #[error("parse: {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Vocabulary lookup failure.
    #[error("lookup: unknown token {token:?}")]
    Lookup { token: String },

    /// Audio decode failure for a referenced file.
    #[error("decode: {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Aligned streams ended at different lines (strict alignment only).
    #[error("misaligned corpus group {group}: {message}")]
    Misaligned { group: usize, message: String },

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    pub(crate) fn decode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Error::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for the kinds that abort a corpus pass or a batch.
    pub fn is_fatal_data_error(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::Lookup { .. } | Error::Decode { .. }
        )
    }
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Decode {
            path: PathBuf::new(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = Error::Parse {
            path: PathBuf::from("train.yaml"),
            line: 3,
            message: "missing field `wav`".into(),
        };
        assert_eq!(err.to_string(), "parse: train.yaml:3: missing field `wav`");
        assert!(err.is_fatal_data_error());
    }

    #[test]
    fn test_config_error_is_not_data_error() {
        let err = Error::Config("buffer_size must be positive".into());
        assert!(!err.is_fatal_data_error());
    }

    #[test]
    fn test_fatal_kind_survives_anyhow() {
        let err = anyhow::Error::from(Error::decode("clip.wav", "bad header"));
        let inner = err.downcast_ref::<Error>().unwrap();
        assert!(inner.is_fatal_data_error());

        let misaligned = Error::Misaligned {
            group: 0,
            message: "target ended at line 3".into(),
        };
        assert!(!misaligned.is_fatal_data_error());
    }
}
