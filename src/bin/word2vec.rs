use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use word2vec::{
    prepare, train_model_with_progress, ContextModel, ModelFormat, Objective, PrepareOptions,
    Progress, ProgressObserver, TrainingConfig,
};

#[derive(Parser)]
#[command(about = "WORD VECTOR estimation toolkit", long_about = None, version)]
struct Options {
    /// Use text data from FILE to train the model
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors / word clusters
    #[arg(long = "output", value_name = "FILE")]
    output_file: PathBuf,

    /// Set size of word vectors
    #[arg(long = "size", default_value_t = 100)]
    layer1_size: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; useful
    /// range is (0, 1e-5); 0 disables down-sampling
    #[arg(long, default_value_t = 1e-3)]
    sample: f32,

    /// Use Hierarchical Softmax instead of negative sampling
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; default is 5 without --hs, common values
    /// are 3 - 10 (0 = not used)
    #[arg(long)]
    negative: Option<usize>,

    /// Use N threads
    #[arg(long = "threads", value_name = "N", default_value_t = 12)]
    num_threads: usize,

    /// Run more training iterations
    #[arg(long, default_value_t = 5)]
    iter: usize,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Set the starting learning rate; default is 0.025 for skip-gram and 0.05 for CBOW
    #[arg(long)]
    alpha: Option<f32>,

    /// Output word classes rather than word vectors; if unspecified, vectors are written instead
    #[arg(long)]
    classes: Option<usize>,

    /// Set the debug mode (2 = more info during training)
    #[arg(long = "debug", default_value_t = 2)]
    debug_mode: usize,

    /// Save the resulting vectors in binary mode (the default)
    #[arg(long, group = "format")]
    binary: bool,

    /// Save the resulting vectors as text
    #[arg(long, group = "format")]
    text: bool,

    /// Save a bincode snapshot of the whole model, including output weights
    #[arg(long, group = "format")]
    bincode: bool,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,

    /// Use the continuous bag of words model (the default)
    #[arg(long, group = "model")]
    cbow: bool,

    /// Use the skip-gram model
    #[arg(long = "skip-gram", group = "model")]
    skip_gram: bool,
}

impl Options {
    fn config(&self) -> Result<TrainingConfig> {
        let format = if self.text {
            ModelFormat::Text
        } else if self.bincode {
            ModelFormat::Bincode
        } else {
            ModelFormat::Binary
        };
        let context = if self.skip_gram {
            ContextModel::SkipGram
        } else {
            ContextModel::Cbow
        };
        let negative = self.negative.unwrap_or(if self.hs { 0 } else { 5 });
        Ok(TrainingConfig {
            size: self.layer1_size,
            window: self.window,
            sample: self.sample,
            context,
            objective: Objective::from_flags(self.hs, negative)?,
            alpha: self.alpha,
            threads: self.num_threads,
            iter: self.iter,
            min_count: self.min_count,
            classes: self.classes,
            format,
            debug_mode: self.debug_mode,
        })
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {per_sec} {msg}",
    ) {
        bar.set_style(style);
    }
    bar
}

fn run(options: Options) -> Result<()> {
    let config = options.config()?;
    let debug_mode = config.debug_mode;
    let session = prepare(PrepareOptions {
        train_file: options.train_file,
        output_file: options.output_file,
        save_vocab_file: options.save_vocab_file,
        read_vocab_file: options.read_vocab_file,
        config,
    })
    .context("error preparing training")?;

    let bar = if debug_mode > 1 {
        progress_bar()
    } else {
        ProgressBar::hidden()
    };
    let observer: ProgressObserver = &|p: Progress| {
        bar.set_length(p.words_total);
        bar.set_position(p.words_done.min(p.words_total));
        bar.set_message(format!("alpha {:.6}", p.alpha));
    };
    let model = train_model_with_progress(&session, Some(observer))
        .context("error training model")?;
    bar.finish_and_clear();

    log::info!(
        "wrote {} words of size {} to {}",
        model.num_words(),
        model.size,
        session.output_file().display()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Options::parse()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
