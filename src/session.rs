//! Preparing a training run and carrying it out.

use std::path::{Path, PathBuf};

use log::info;

use crate::config::TrainingConfig;
use crate::corpus;
use crate::error::{Error, Result};
use crate::huffman::HuffmanTree;
use crate::query;
use crate::trainer::{ProgressObserver, TrainedModel, Trainer};
use crate::vocab::Vocabulary;

/// Everything `prepare` needs to know.
#[derive(Clone, Debug)]
pub struct PrepareOptions {
    /// Text to train the model on.
    pub train_file: PathBuf,
    /// Where the word vectors (or word classes) are written.
    pub output_file: PathBuf,
    /// If set, the vocabulary is saved here.
    pub save_vocab_file: Option<PathBuf>,
    /// If set, the vocabulary is read from here rather than counted from
    /// `train_file`.
    pub read_vocab_file: Option<PathBuf>,
    pub config: TrainingConfig,
}

impl PrepareOptions {
    /// Options with the default training configuration.
    pub fn new(train_file: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        PrepareOptions {
            train_file: train_file.into(),
            output_file: output_file.into(),
            save_vocab_file: None,
            read_vocab_file: None,
            config: TrainingConfig::default(),
        }
    }
}

/// A validated configuration together with its vocabulary, ready to train.
#[derive(Debug)]
pub struct Session {
    train_file: PathBuf,
    output_file: PathBuf,
    file_size: u64,
    config: TrainingConfig,
    vocab: Vocabulary,
}

/// Validates `options.config` and builds (or loads) the vocabulary, plus
/// Huffman codes when hierarchical softmax is selected. Does not train.
pub fn prepare(options: PrepareOptions) -> Result<Session> {
    let PrepareOptions {
        train_file,
        output_file,
        save_vocab_file,
        read_vocab_file,
        config,
    } = options;
    config.validate()?;

    info!("Starting training using file {}", train_file.display());
    let mut vocab = match &read_vocab_file {
        Some(f) => Vocabulary::load(f, config.min_count)?,
        None => Vocabulary::learn_from_file(&train_file, config.min_count)?,
    };
    if config.debug_mode > 0 {
        info!("Vocab size: {}", vocab.len());
        info!("Words in train file: {}", vocab.train_words());
    }
    if let Some(f) = &save_vocab_file {
        vocab.save(f)?;
    }
    if config.uses_hierarchical_softmax() {
        vocab.set_huffman_codes(HuffmanTree::build(&vocab.counts()));
    }

    let file_size = corpus::file_size(&train_file).map_err(Error::corpus_unreadable(&train_file))?;

    Ok(Session {
        train_file,
        output_file,
        file_size,
        config,
        vocab,
    })
}

/// Trains the model prepared in `session` and writes it to the session's
/// output file.
pub fn train_model(session: &Session) -> Result<TrainedModel> {
    train_model_with_progress(session, None)
}

/// Like `train_model`, calling `observer` as training progresses.
pub fn train_model_with_progress(
    session: &Session,
    observer: Option<ProgressObserver<'_>>,
) -> Result<TrainedModel> {
    let model = session.train_with_progress(observer)?;
    let output = session.output_file();
    match session.config.classes {
        Some(k) => model.save_classes(output, k)?,
        None => model.save(output, session.config.format)?,
    }
    query::default_engine().evict(output);
    if session.config.debug_mode > 0 {
        info!("Saved model to {}", output.display());
    }
    Ok(model)
}

impl Session {
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn train_file(&self) -> &Path {
        &self.train_file
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Runs training without writing anything.
    pub fn train(&self) -> Result<TrainedModel> {
        self.train_with_progress(None)
    }

    pub fn train_with_progress(
        &self,
        observer: Option<ProgressObserver<'_>>,
    ) -> Result<TrainedModel> {
        Trainer::new(&self.config, &self.vocab, &self.train_file, self.file_size)?.train(observer)
    }
}
