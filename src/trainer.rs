//! Multi-threaded SGD over the corpus.
//!
//! Each worker thread reads its own byte range of the training file and
//! updates the shared weight matrices without locking. The matrices are made
//! of `Real` cells: every load and store is atomic, but `Real::add` is a
//! separate load and store, so two threads updating the same weight at the
//! same moment can lose one of the updates. Training tolerates this noise.

use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use aligned_box::AlignedBox;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{ContextModel, Objective, TrainingConfig};
use crate::corpus::WordReader;
use crate::error::{Error, Result};
use crate::vocab::Vocabulary;

const EXP_TABLE_SIZE: usize = 1000;
const MAX_EXP: real = 6.0;
const MAX_SENTENCE_LENGTH: usize = 1000;
const MAX_UNIGRAM_TABLE_SIZE: usize = 100_000_000;
/// Words between updates of the shared progress counter.
const REPORT_INTERVAL: u64 = 10_000;

#[allow(non_camel_case_types)]
type real = f32; // Precision of float numbers

#[derive(Default)]
#[repr(transparent)]
struct Real {
    bits: AtomicU32,
}

impl Real {
    fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

/// A `rows × cols` matrix of weights shared between training threads.
struct Matrix {
    cols: usize,
    cells: AlignedBox<[Real]>,
}

impl Matrix {
    fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let elements = rows
            .checked_mul(cols)
            .ok_or(Error::Allocation { elements: usize::MAX })?;
        let cells = AlignedBox::slice_from_default(128, elements)
            .map_err(|_| Error::Allocation { elements })?;
        Ok(Matrix { cols, cells })
    }

    fn row(&self, i: usize) -> &[Real] {
        &self.cells[i * self.cols..][..self.cols]
    }

    fn to_vec(&self) -> Vec<real> {
        self.cells.iter().map(Real::get).collect()
    }
}

fn dot(a: &[real], b: &[Real]) -> real {
    a.iter().zip(b).map(|(&a, b)| a * b.get()).sum()
}

/// The linear congruential generator of the C word2vec tool, so that
/// runs are reproducible from the thread id alone.
pub(crate) struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}

/// Precomputed logistic function over `-MAX_EXP..MAX_EXP`.
struct ExpTable(Vec<real>);

impl ExpTable {
    fn new() -> Self {
        ExpTable(
            (0..EXP_TABLE_SIZE)
                .map(|i| {
                    let e = ((i as real / EXP_TABLE_SIZE as real * 2.0 - 1.0) * MAX_EXP).exp();
                    e / (e + 1.0)
                })
                .collect(),
        )
    }

    /// Only meaningful for `-MAX_EXP < x < MAX_EXP`.
    fn lookup(&self, x: real) -> real {
        let i = ((x + MAX_EXP) * (EXP_TABLE_SIZE as real / MAX_EXP / 2.0)) as usize;
        self.0[i.min(EXP_TABLE_SIZE - 1)]
    }

    /// Approximate the logistic function, 1 / (1 + e^-x), saturating outside
    /// the table.
    fn sigmoid(&self, x: real) -> real {
        if x > MAX_EXP {
            1.0
        } else if x < -MAX_EXP {
            0.0
        } else {
            self.lookup(x)
        }
    }
}

/// Table for drawing negative examples with probability proportional to
/// `count^0.75`. About a thousand slots per word, up to 1e8 in total.
fn unigram_table(vocab: &Vocabulary) -> Vec<u32> {
    let power: f64 = 0.75;
    let table_size = (vocab.len() * 1000).clamp(1000, MAX_UNIGRAM_TABLE_SIZE);
    let train_words_pow = vocab
        .entries()
        .iter()
        .map(|vw| (vw.count as f64).powf(power))
        .sum::<f64>();

    let mut table = Vec::with_capacity(table_size);
    let mut i = 0;
    let mut d1 = (vocab.get(i).count as f64).powf(power) / train_words_pow;
    for a in 0..table_size {
        table.push(i as u32);
        if (a as f64 / table_size as f64) > d1 && i + 1 < vocab.len() {
            i += 1;
            d1 += (vocab.get(i).count as f64).powf(power) / train_words_pow;
        }
    }
    table
}

/// A snapshot of training progress, passed to a progress observer.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// Words processed so far, over all threads and iterations.
    pub words_done: u64,
    /// Words to be processed over the whole run.
    pub words_total: u64,
    /// Current learning rate.
    pub alpha: f32,
}

pub type ProgressObserver<'a> = &'a (dyn Fn(Progress) + Sync);

/// The result of a training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub config: TrainingConfig,
    pub vocab: Vocabulary,
    /// Vector length.
    pub size: usize,
    /// `embeddings[k * size..(k+1) * size]` is the vector embedding for word `k`.
    pub embeddings: Vec<f32>,
    /// Output layer: one row per internal Huffman node for hierarchical
    /// softmax, one row per word for negative sampling.
    pub weights: Vec<f32>,
}

impl TrainedModel {
    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    /// Panics if `word` is out of range.
    pub fn vector(&self, word: usize) -> &[f32] {
        &self.embeddings[word * self.size..][..self.size]
    }
}

pub(crate) struct Trainer<'a> {
    config: &'a TrainingConfig,
    vocab: &'a Vocabulary,
    train_file: &'a Path,
    file_size: u64,
    starting_alpha: real,
    word_count_actual: AtomicU64,
    /// The learned word-vectors.
    syn0: Matrix,
    /// Output weights, for whichever objective is in use.
    syn1: Matrix,
    exp_table: ExpTable,
    table: Vec<u32>,
    sentence_boundary: Option<usize>,
    start: Instant,
}

/// Per-thread scratch state.
struct Worker {
    rng: Rng,
    alpha: real,
    word_count: u64,
    last_word_count: u64,
    neu1: Vec<real>,
    neu1e: Vec<real>,
    sen: Vec<usize>,
}

impl<'a> Trainer<'a> {
    pub fn new(
        config: &'a TrainingConfig,
        vocab: &'a Vocabulary,
        train_file: &'a Path,
        file_size: u64,
    ) -> Result<Self> {
        let vocab_size = vocab.len();
        let layer1_size = config.size;

        let syn0 = Matrix::zeros(vocab_size, layer1_size)?;
        let mut rng = Rng(1);
        for cell in syn0.cells.iter() {
            cell.set((rng.rand_real() - 0.5) / layer1_size as real);
        }
        let syn1 = Matrix::zeros(vocab_size, layer1_size)?;

        let table = match config.objective {
            Objective::NegativeSampling { .. } => unigram_table(vocab),
            Objective::HierarchicalSoftmax => Vec::new(),
        };

        Ok(Trainer {
            config,
            vocab,
            train_file,
            file_size,
            starting_alpha: config.starting_alpha(),
            word_count_actual: AtomicU64::new(0),
            syn0,
            syn1,
            exp_table: ExpTable::new(),
            table,
            sentence_boundary: vocab.sentence_boundary(),
            start: Instant::now(),
        })
    }

    /// Runs all iterations on `config.threads` threads and returns the
    /// learned weights.
    pub fn train(mut self, observer: Option<ProgressObserver<'_>>) -> Result<TrainedModel> {
        let num_threads = self.config.threads;
        if self.vocab.train_words() < num_threads as u64 {
            warn!(
                "more threads ({num_threads}) than words in the training data ({})",
                self.vocab.train_words()
            );
        }

        self.start = Instant::now();
        thread::scope(|s| {
            let this: &Trainer = &self;
            let threads = (0..num_threads)
                .map(|id| s.spawn(move || this.train_model_thread(id, observer)))
                .collect::<Vec<_>>();
            let mut result = Ok(());
            for thread in threads {
                let thread_result = match thread.join() {
                    Ok(r) => r,
                    Err(payload) => std::panic::resume_unwind(payload),
                };
                if result.is_ok() {
                    result = thread_result;
                }
            }
            result
        })?;

        debug!(
            "training finished in {:.1}s",
            self.start.elapsed().as_secs_f64()
        );
        Ok(TrainedModel {
            config: self.config.clone(),
            vocab: self.vocab.clone(),
            size: self.config.size,
            embeddings: self.syn0.to_vec(),
            weights: self.syn1.to_vec(),
        })
    }

    fn shard_start(&self, id: usize) -> u64 {
        self.file_size / self.config.threads as u64 * id as u64
    }

    fn train_model_thread(&self, id: usize, observer: Option<ProgressObserver<'_>>) -> Result<()> {
        let layer1_size = self.config.size;
        let mut fi = WordReader::open_at(self.train_file, self.shard_start(id))
            .map_err(Error::corpus_unreadable(self.train_file))?;
        let words_per_thread = self.vocab.train_words() / self.config.threads as u64;

        let mut w = Worker {
            rng: Rng(id as u64),
            alpha: self.starting_alpha,
            word_count: 0,
            last_word_count: 0,
            neu1: vec![0.0; layer1_size],
            neu1e: vec![0.0; layer1_size],
            sen: Vec::with_capacity(MAX_SENTENCE_LENGTH),
        };

        for local_iter in 0..self.config.iter {
            if local_iter > 0 {
                fi.seek_to(self.shard_start(id))
                    .map_err(Error::corpus_unreadable(self.train_file))?;
            }
            w.word_count = 0;
            w.last_word_count = 0;
            loop {
                if w.word_count - w.last_word_count > REPORT_INTERVAL {
                    self.report_progress(&mut w, observer);
                }

                let at_end_of_file = self
                    .read_sentence(&mut fi, &mut w)
                    .map_err(Error::corpus_unreadable(self.train_file))?;

                for sentence_position in 0..w.sen.len() {
                    match self.config.context {
                        ContextModel::Cbow => self.train_cbow(&mut w, sentence_position),
                        ContextModel::SkipGram => self.train_skip_gram(&mut w, sentence_position),
                    }
                }

                if at_end_of_file || w.word_count > words_per_thread {
                    break;
                }
            }
            self.word_count_actual
                .fetch_add(w.word_count - w.last_word_count, Ordering::Relaxed);
        }
        Ok(())
    }

    fn report_progress(&self, w: &mut Worker, observer: Option<ProgressObserver<'_>>) {
        let n = w.word_count - w.last_word_count;
        let word_count_actual = self.word_count_actual.fetch_add(n, Ordering::Relaxed) + n;
        w.last_word_count = w.word_count;

        let words_total = self.config.iter as u64 * self.vocab.train_words() + 1;
        if self.config.debug_mode > 1 {
            debug!(
                "Alpha: {}  Progress: {:.2}%  Words/thread/sec: {:.2}k",
                w.alpha,
                word_count_actual as real / words_total as real * 100.0,
                word_count_actual as real
                    / ((self.start.elapsed().as_secs_f64() + 1.0) as real * 1000.0),
            );
        }
        if let Some(observer) = observer {
            observer(Progress {
                words_done: word_count_actual,
                words_total,
                alpha: w.alpha,
            });
        }
        w.alpha = self.starting_alpha
            * (1.0 - word_count_actual as real / words_total as real).max(0.0001);
    }

    /// Fills `w.sen` with the next sentence, ending at a newline or after
    /// `MAX_SENTENCE_LENGTH` words. Words not in the vocabulary are skipped.
    /// Returns `true` at end of file.
    fn read_sentence(
        &self,
        fi: &mut WordReader<BufReader<File>>,
        w: &mut Worker,
    ) -> std::io::Result<bool> {
        w.sen.clear();
        loop {
            let word = match fi.read_word()? {
                None => return Ok(true),
                Some(word) => word,
            };
            let word = match self.vocab.lookup(&word) {
                None => continue,
                Some(i) => i,
            };
            w.word_count += 1;
            if Some(word) == self.sentence_boundary {
                return Ok(false);
            }

            // The subsampling randomly discards frequent words while keeping the ranking same
            let sample = self.config.sample;
            if sample > 0.0 {
                let f = self.vocab.get(word).count as real;
                let k = sample * self.vocab.train_words() as real;
                let ran = ((f / k).sqrt() + 1.0) * k / f;
                if ran < w.rng.rand_real() {
                    continue;
                }
            }
            w.sen.push(word);
            if w.sen.len() >= MAX_SENTENCE_LENGTH {
                return Ok(false);
            }
        }
    }

    /// Positions of the context words around `sentence_position`, with the
    /// window shrunk by a random amount. Includes `sentence_position` itself.
    fn context_window(&self, w: &mut Worker, sentence_position: usize) -> Range<usize> {
        let window = self.config.window;
        let radius = window - w.rng.rand_u64() as usize % window;
        let start = sentence_position.saturating_sub(radius);
        let stop = (sentence_position + radius + 1).min(w.sen.len());
        start..stop
    }

    fn train_cbow(&self, w: &mut Worker, sentence_position: usize) {
        let word = w.sen[sentence_position];
        w.neu1.fill(0.0);
        w.neu1e.fill(0.0);
        let context = self.context_window(w, sentence_position);

        // in -> hidden
        let mut cw = 0;
        for c in context.clone() {
            if c == sentence_position {
                continue;
            }
            for (h, x) in w.neu1.iter_mut().zip(self.syn0.row(w.sen[c])) {
                *h += x.get();
            }
            cw += 1;
        }
        if cw == 0 {
            return;
        }
        for h in &mut w.neu1 {
            *h /= cw as real;
        }

        self.learn(word, &w.neu1, &mut w.neu1e, w.alpha, &mut w.rng);

        // hidden -> in
        for c in context {
            if c == sentence_position {
                continue;
            }
            for (x, e) in self.syn0.row(w.sen[c]).iter().zip(&w.neu1e) {
                x.add(*e);
            }
        }
    }

    /// Skip-gram over the pairs (centre word, context word). Each pair is
    /// trained with the context word's input vector predicting the centre
    /// word's output. Over a symmetric window this visits the same pairs as
    /// predicting each context word from the centre word.
    fn train_skip_gram(&self, w: &mut Worker, sentence_position: usize) {
        let word = w.sen[sentence_position];
        let context = self.context_window(w, sentence_position);
        for c in context {
            if c == sentence_position {
                continue;
            }
            let l1 = self.syn0.row(w.sen[c]);
            for (h, x) in w.neu1.iter_mut().zip(l1) {
                *h = x.get();
            }
            w.neu1e.fill(0.0);

            self.learn(word, &w.neu1, &mut w.neu1e, w.alpha, &mut w.rng);

            // Learn weights input -> hidden
            for (x, e) in l1.iter().zip(&w.neu1e) {
                x.add(*e);
            }
        }
    }

    /// Trains the output layer to predict `word` from `hidden`, accumulating
    /// the error to propagate back to the input vectors in `neu1e`.
    fn learn(&self, word: usize, hidden: &[real], neu1e: &mut [real], alpha: real, rng: &mut Rng) {
        match self.config.objective {
            Objective::HierarchicalSoftmax => {
                let vw = self.vocab.get(word);
                for (&node, &code) in vw.point.iter().zip(&vw.code) {
                    let l2 = self.syn1.row(node as usize);
                    // Propagate hidden -> output
                    let f = dot(hidden, l2);
                    if f <= -MAX_EXP || f >= MAX_EXP {
                        continue;
                    }
                    let f = self.exp_table.lookup(f);
                    // 'g' is the gradient multiplied by the learning rate
                    let g = (1.0 - code as real - f) * alpha;
                    self.update(l2, hidden, neu1e, g);
                }
            }
            Objective::NegativeSampling { negative } => {
                for d in 0..negative + 1 {
                    let (target, label) = if d == 0 {
                        (word, 1.0)
                    } else {
                        let target = self.draw_negative(rng);
                        if target == word {
                            continue;
                        }
                        (target, 0.0)
                    };
                    let l2 = self.syn1.row(target);
                    let f = self.exp_table.sigmoid(dot(hidden, l2));
                    let g = (label - f) * alpha;
                    self.update(l2, hidden, neu1e, g);
                }
            }
        }
    }

    fn update(&self, l2: &[Real], hidden: &[real], neu1e: &mut [real], g: real) {
        // Propagate errors output -> hidden
        for (e, x) in neu1e.iter_mut().zip(l2) {
            *e += g * x.get();
        }
        // Learn weights hidden -> output
        for (x, h) in l2.iter().zip(hidden) {
            x.add(g * h);
        }
    }

    /// Draws a word from the unigram table. The sentence boundary marker is
    /// replaced by a uniformly chosen word; duplicates are fine.
    fn draw_negative(&self, rng: &mut Rng) -> usize {
        let next_random = rng.rand_u64();
        let target = self.table[(next_random >> 16) as usize % self.table.len()] as usize;
        match self.sentence_boundary {
            Some(boundary) if target == boundary && self.vocab.len() > 1 => {
                let other = next_random as usize % (self.vocab.len() - 1);
                if other >= boundary {
                    other + 1
                } else {
                    other
                }
            }
            _ => target,
        }
    }
}
