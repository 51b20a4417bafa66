//! Distance and analogy queries against model files, loading each file once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::info;

use crate::config::ModelFormat;
use crate::error::{Error, Result};
use crate::vectors::{Neighbor, Vectors};

/// Number of closest words returned when the caller doesn't say.
pub const DEFAULT_NUMBER_OF_CLOSEST: usize = 40;

/// A cache of loaded models, keyed by path. Safe to share between threads;
/// queries on the same model run concurrently.
pub struct QueryEngine {
    format: ModelFormat,
    models: Mutex<HashMap<PathBuf, Arc<Vectors>>>,
}

impl Default for QueryEngine {
    fn default() -> Self {
        QueryEngine::new(ModelFormat::Binary)
    }
}

impl QueryEngine {
    /// An engine that reads model files in `format`.
    pub fn new(format: ModelFormat) -> Self {
        QueryEngine {
            format,
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the model stored at `path`, loading it if it isn't loaded yet.
    pub fn model(&self, path: &Path) -> Result<Arc<Vectors>> {
        if let Some(model) = self.lock().get(path) {
            return Ok(Arc::clone(model));
        }

        // Loading happens outside the lock; if two callers race, the first
        // one to finish wins and the other copy is dropped.
        let loaded = Arc::new(Vectors::load(path, self.format)?);
        info!(
            "loaded {} words of size {} from {}",
            loaded.num_words(),
            loaded.size(),
            path.display()
        );
        Ok(Arc::clone(
            self.lock().entry(path.to_owned()).or_insert(loaded),
        ))
    }

    /// Forgets the model at `path`, so that the next query reloads it.
    pub fn evict(&self, path: &Path) {
        self.lock().remove(path);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<Vectors>>> {
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Words closest to `word`. If `word` contains several whitespace
    /// separated words, their vectors are added together first.
    pub fn distance(
        &self,
        path: &Path,
        word: &str,
        number_of_closest: Option<usize>,
    ) -> Result<Vec<Neighbor>> {
        let words = word.split_whitespace().collect::<Vec<&str>>();
        let n = number_of_closest.unwrap_or(DEFAULT_NUMBER_OF_CLOSEST);
        self.model(path)?.phrase_distance(&words, n)
    }

    /// `three_words` is `"a b c"`; answers "a is to b as c is to ?".
    pub fn analogy(
        &self,
        path: &Path,
        three_words: &str,
        number_of_closest: Option<usize>,
    ) -> Result<Vec<Neighbor>> {
        let words = three_words.split_whitespace().collect::<Vec<&str>>();
        let [a, b, c] = words[..] else {
            return Err(Error::InvalidQuery(format!(
                "{} words were entered; three words are needed to perform the calculation",
                words.len()
            )));
        };
        let n = number_of_closest.unwrap_or(DEFAULT_NUMBER_OF_CLOSEST);
        self.model(path)?.analogy(a, b, c, n)
    }
}

/// The engine behind the free functions `distance` and `analogy`.
pub fn default_engine() -> &'static QueryEngine {
    static ENGINE: OnceLock<QueryEngine> = OnceLock::new();
    ENGINE.get_or_init(QueryEngine::default)
}

/// Words closest to `word` in the binary model at `path`.
pub fn distance(path: &Path, word: &str, number_of_closest: Option<usize>) -> Result<Vec<Neighbor>> {
    default_engine().distance(path, word, number_of_closest)
}

/// Analogy completion over the binary model at `path`.
pub fn analogy(
    path: &Path,
    three_words: &str,
    number_of_closest: Option<usize>,
) -> Result<Vec<Neighbor>> {
    default_engine().analogy(path, three_words, number_of_closest)
}
