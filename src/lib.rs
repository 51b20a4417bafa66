//! Word vector estimation: count a corpus, train CBOW or skip-gram word
//! embeddings, and query the trained vectors for nearest neighbours and
//! analogies.
//!
//! ```no_run
//! use word2vec::{prepare, train_model, PrepareOptions};
//!
//! let session = prepare(PrepareOptions::new("corpus.txt", "vectors.bin"))?;
//! train_model(&session)?;
//! for neighbor in word2vec::distance("vectors.bin".as_ref(), "king", Some(10))? {
//!     println!("{}\t{}", neighbor.word, neighbor.similarity);
//! }
//! # Ok::<(), word2vec::Error>(())
//! ```

pub mod config;
pub mod corpus;
mod error;
pub mod huffman;
pub mod kmeans;
pub mod query;
mod session;
mod trainer;
mod vectors;
pub mod vocab;
pub mod writer;

pub use config::{ContextModel, ModelFormat, Objective, TrainingConfig};
pub use error::{Error, Result};
pub use huffman::HuffmanTree;
pub use query::{analogy, distance, QueryEngine, DEFAULT_NUMBER_OF_CLOSEST};
pub use session::{prepare, train_model, train_model_with_progress, PrepareOptions, Session};
pub use trainer::{Progress, ProgressObserver, TrainedModel};
pub use vectors::{dot, norm, normalize, Neighbor, Vectors};
pub use vocab::{VocabEntry, Vocabulary};
pub use writer::{write_model, write_word_vectors};
