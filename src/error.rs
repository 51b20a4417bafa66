use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error reading training data file {path:?}")]
    CorpusUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("vocabulary is empty: no word occurs at least {min_count} times")]
    EmptyVocabulary { min_count: u64 },

    #[error("error reading vocabulary file {path:?}: {reason}")]
    VocabularyUnreadable { path: PathBuf, reason: String },

    #[error("error writing {path:?}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid model file {path:?}: {reason}")]
    ModelUnreadable { path: PathBuf, reason: String },

    #[error("out of dictionary word: {0:?}")]
    UnknownWord(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("memory allocation failed for {elements} vector elements")]
    Allocation { elements: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn write_failure(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::WriteFailure { path, source }
    }

    pub(crate) fn corpus_unreadable(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::CorpusUnreadable { path, source }
    }
}
