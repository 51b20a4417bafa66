use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Direction of prediction during training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextModel {
    /// Continuous bag of words: predict a word from the average of its context.
    Cbow,
    /// Predict each context word separately.
    SkipGram,
}

/// Output layer used during training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    HierarchicalSoftmax,
    NegativeSampling { negative: usize },
}

impl Objective {
    /// Interprets the toolkit's `-hs` / `-negative` flag pair. Exactly one of
    /// the two must be turned on.
    pub fn from_flags(hs: bool, negative: usize) -> Result<Self> {
        match (hs, negative) {
            (true, 0) => Ok(Objective::HierarchicalSoftmax),
            (false, 0) => Err(Error::InvalidConfig(
                "either hierarchical softmax or negative sampling must be used".into(),
            )),
            (true, _) => Err(Error::InvalidConfig(
                "hierarchical softmax and negative sampling are mutually exclusive".into(),
            )),
            (false, negative) => Ok(Objective::NegativeSampling { negative }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFormat {
    /// The word2vec binary format: a `"<words> <size>"` header line, then each
    /// word followed by a space and `size` little-endian `f32`s.
    #[default]
    Binary,
    /// The word2vec text format: one word and its vector per line.
    Text,
    /// The complete trained model (vocabulary, input and output weights,
    /// configuration) in bincode.
    Bincode,
}

/// Training parameters. Fixed for the lifetime of a `Session`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Size of word vectors; default is 100.
    pub size: usize,

    /// Max skip length between words; default is 5.
    pub window: usize,

    /// Threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; default
    /// is 1e-3, useful range is (0, 1e-5). Zero disables subsampling.
    pub sample: f32,

    /// Default is CBOW.
    pub context: ContextModel,

    /// Default is negative sampling with 5 negative examples.
    pub objective: Objective,

    /// Starting learning rate; default is 0.025 for skip-gram and 0.05 for CBOW.
    pub alpha: Option<f32>,

    /// Number of training threads; default is 12.
    pub threads: usize,

    /// Number of passes over the corpus; default is 5.
    pub iter: usize,

    /// Discard words that appear less than this many times; default is 5.
    pub min_count: u64,

    /// Output this many word classes rather than word vectors.
    pub classes: Option<usize>,

    pub format: ModelFormat,

    /// 0 = quiet, 1 = summary, 2 = progress during training (default).
    pub debug_mode: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            size: 100,
            window: 5,
            sample: 1e-3,
            context: ContextModel::Cbow,
            objective: Objective::NegativeSampling { negative: 5 },
            alpha: None,
            threads: 12,
            iter: 5,
            min_count: 5,
            classes: None,
            format: ModelFormat::Binary,
            debug_mode: 2,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.size == 0 {
            return invalid("vector size must be at least 1");
        }
        if self.window == 0 {
            return invalid("window must be at least 1");
        }
        if self.threads == 0 {
            return invalid("at least one thread is required");
        }
        if self.iter == 0 {
            return invalid("at least one training iteration is required");
        }
        if !(self.sample.is_finite() && self.sample >= 0.0) {
            return invalid("sample threshold must be a non-negative number");
        }
        if let Some(alpha) = self.alpha {
            if !(alpha.is_finite() && alpha > 0.0) {
                return invalid("learning rate must be positive");
            }
        }
        if self.objective == (Objective::NegativeSampling { negative: 0 }) {
            return invalid("negative sampling needs at least one negative example");
        }
        if self.classes == Some(0) {
            return invalid("number of classes must be at least 1");
        }
        Ok(())
    }

    pub fn starting_alpha(&self) -> f32 {
        self.alpha.unwrap_or(match self.context {
            ContextModel::Cbow => 0.05,
            ContextModel::SkipGram => 0.025,
        })
    }

    pub fn uses_hierarchical_softmax(&self) -> bool {
        self.objective == Objective::HierarchicalSoftmax
    }
}
