use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::corpus::{WordReader, SENTENCE_BOUNDARY};
use crate::error::{Error, Result};
use crate::huffman::HuffmanTree;

/// Maximum 30 * 0.7 = 21M words in the vocabulary while counting.
const VOCAB_HASH_SIZE: usize = 30_000_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub word: String,
    pub count: u64,
    /// Huffman code, root first. Empty unless hierarchical softmax is used.
    pub code: Vec<u8>,
    /// Internal tree nodes on the path to this word; `point[d]` is the node
    /// where branch `code[d]` is taken.
    pub point: Vec<u32>,
}

impl VocabEntry {
    fn new(word: String, count: u64) -> Self {
        VocabEntry {
            word,
            count,
            code: Vec::new(),
            point: Vec::new(),
        }
    }
}

/// The words of a corpus, most frequent first. A word's ID is its position.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "Vec<VocabEntry>", into = "Vec<VocabEntry>")]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
    index: HashMap<String, usize>,
    train_words: u64,
}

impl From<Vec<VocabEntry>> for Vocabulary {
    fn from(entries: Vec<VocabEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, vw)| (vw.word.clone(), i))
            .collect();
        let train_words = entries.iter().map(|vw| vw.count).sum();
        Vocabulary {
            entries,
            index,
            train_words,
        }
    }
}

impl From<Vocabulary> for Vec<VocabEntry> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.entries
    }
}

/// Word counts in first-seen order.
struct Counter {
    entries: Vec<VocabEntry>,
    index: HashMap<String, usize>,
    min_reduce: u64,
    max_size: usize,
}

impl Counter {
    fn new(max_size: usize) -> Self {
        Counter {
            entries: Vec::with_capacity(1000),
            index: HashMap::new(),
            min_reduce: 1,
            max_size,
        }
    }

    fn add(&mut self, word: String) {
        if let Some(&a) = self.index.get(&word) {
            self.entries[a].count += 1;
        } else {
            self.index.insert(word.clone(), self.entries.len());
            self.entries.push(VocabEntry::new(word, 1));
        }
        if self.entries.len() > self.max_size {
            self.reduce();
        }
    }

    /// Reduces the vocabulary by removing infrequent tokens.
    fn reduce(&mut self) {
        let min_reduce = self.min_reduce;
        self.entries
            .retain(|vw| vw.count > min_reduce || vw.word == SENTENCE_BOUNDARY);
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, vw)| (vw.word.clone(), i))
            .collect();
        self.min_reduce += 1;
    }
}

impl Vocabulary {
    /// Builds a vocabulary from `(word, count)` pairs listed in first-seen order.
    ///
    /// Words occurring less than `min_count` times are discarded, except the
    /// sentence boundary marker. The rest are sorted by descending count; ties
    /// keep their original order.
    pub fn from_counts<I>(counts: I, min_count: u64) -> Result<Self>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut entries: Vec<VocabEntry> = counts
            .into_iter()
            .filter(|(word, count)| {
                *count >= min_count.max(1) || (word == SENTENCE_BOUNDARY && *count > 0)
            })
            .map(|(word, count)| VocabEntry::new(word, count))
            .collect();
        if entries.iter().all(|vw| vw.word == SENTENCE_BOUNDARY) {
            return Err(Error::EmptyVocabulary { min_count });
        }
        entries.sort_by_key(|vw| Reverse(vw.count));
        Ok(Vocabulary::from(entries))
    }

    /// Counts the words of a corpus in a single streaming pass.
    pub fn learn_from_file(path: &Path, min_count: u64) -> Result<Self> {
        let file = File::open(path).map_err(Error::corpus_unreadable(path))?;
        Self::learn_from_reader(BufReader::new(file), min_count, VOCAB_HASH_SIZE * 7 / 10)
            .map_err(|err| match err {
                LearnError::Io(source) => Error::CorpusUnreadable {
                    path: path.to_owned(),
                    source,
                },
                LearnError::Vocab(err) => err,
            })
    }

    fn learn_from_reader<R: BufRead>(
        reader: R,
        min_count: u64,
        max_size: usize,
    ) -> std::result::Result<Self, LearnError> {
        let mut counter = Counter::new(max_size);
        let mut train_words: u64 = 0;
        for word in WordReader::new(reader) {
            counter.add(word.map_err(LearnError::Io)?);
            train_words += 1;
            if train_words % 100_000 == 0 {
                trace!("{}K words read", train_words / 1000);
            }
        }
        let counts = counter.entries.into_iter().map(|vw| (vw.word, vw.count));
        Self::from_counts(counts, min_count).map_err(LearnError::Vocab)
    }

    /// Writes one `word count` line per entry, in ID order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(Error::write_failure(path))?;
        let mut fo = BufWriter::new(file);
        for vw in &self.entries {
            writeln!(fo, "{} {}", vw.word, vw.count).map_err(Error::write_failure(path))?;
        }
        fo.flush().map_err(Error::write_failure(path))
    }

    /// Reads a vocabulary written by `save`, instead of counting a corpus.
    pub fn load(path: &Path, min_count: u64) -> Result<Self> {
        let unreadable = |reason: String| Error::VocabularyUnreadable {
            path: path.to_owned(),
            reason,
        };
        let fin = BufReader::new(File::open(path).map_err(|err| unreadable(err.to_string()))?);

        let mut seen = HashMap::new();
        let mut counts = vec![];
        for (line_num, line) in fin.lines().enumerate() {
            let line = line.map_err(|err| unreadable(err.to_string()))?;
            let fields = line.split_whitespace().collect::<Vec<&str>>();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 2 {
                return Err(unreadable(format!("syntax error on line {}", line_num + 1)));
            }
            let count = fields[1].parse::<u64>().map_err(|_| {
                unreadable(format!(
                    "unrecognized frequency number format on line {}",
                    line_num + 1
                ))
            })?;
            if seen.insert(fields[0].to_string(), line_num).is_some() {
                return Err(unreadable(format!(
                    "duplicate word {:?} on line {}",
                    fields[0],
                    line_num + 1
                )));
            }
            counts.push((fields[0].to_string(), count));
        }
        Self::from_counts(counts, min_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    /// Panics if `id` is out of range.
    pub fn get(&self, id: usize) -> &VocabEntry {
        &self.entries[id]
    }

    /// Returns position of a word in the vocabulary; if the word is not found, returns None.
    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    /// Sum of the counts of all words in the vocabulary.
    pub fn train_words(&self) -> u64 {
        self.train_words
    }

    /// ID of the `</s>` marker, if the corpus had any newlines.
    pub fn sentence_boundary(&self) -> Option<usize> {
        self.lookup(SENTENCE_BOUNDARY)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|vw| vw.word.as_str())
    }

    pub fn counts(&self) -> Vec<u64> {
        self.entries.iter().map(|vw| vw.count).collect()
    }

    pub fn set_huffman_codes(&mut self, tree: HuffmanTree) {
        assert_eq!(tree.len(), self.entries.len());
        for (vw, (code, point)) in self.entries.iter_mut().zip(tree.into_paths()) {
            vw.code = code;
            vw.point = point;
        }
    }
}

#[derive(Debug)]
enum LearnError {
    Io(io::Error),
    Vocab(Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learn(text: &str, min_count: u64) -> Result<Vocabulary> {
        Vocabulary::learn_from_reader(text.as_bytes(), min_count, usize::MAX).map_err(
            |err| match err {
                LearnError::Io(err) => panic!("{err}"),
                LearnError::Vocab(err) => err,
            },
        )
    }

    #[test]
    fn counts_and_order() {
        let vocab = learn("the quick fox the lazy fox\nthe fox sleeps", 1).unwrap();
        let words = vocab.words().collect::<Vec<_>>();
        assert_eq!(words, ["the", "fox", "quick", "lazy", "</s>", "sleeps"]);
        assert_eq!(vocab.counts(), [3, 3, 1, 1, 1, 1]);
        assert_eq!(vocab.train_words(), 10);
        assert_eq!(vocab.sentence_boundary(), Some(4));
        for (i, word) in words.iter().enumerate() {
            assert_eq!(vocab.lookup(word), Some(i));
        }
        assert_eq!(vocab.lookup("cat"), None);
    }

    #[test]
    fn min_count_prunes() {
        let vocab = learn("a a a b b c\nd", 2).unwrap();
        assert_eq!(vocab.words().collect::<Vec<_>>(), ["a", "b", "</s>"]);
        assert_eq!(vocab.train_words(), 6);
    }

    #[test]
    fn empty_vocabulary() {
        assert!(matches!(
            learn("a b c\n", 2),
            Err(Error::EmptyVocabulary { min_count: 2 })
        ));
        assert!(matches!(learn("", 1), Err(Error::EmptyVocabulary { .. })));
        assert!(matches!(learn("\n\n\n", 1), Err(Error::EmptyVocabulary { .. })));
    }

    #[test]
    fn reduce_keeps_frequent_words() {
        let text = "a a a a b c d e f a b";
        let vocab = Vocabulary::learn_from_reader(text.as_bytes(), 1, 3).unwrap();
        let words = vocab.words().collect::<Vec<_>>();
        assert_eq!(words[0], "a");
        assert!(vocab.len() <= 4);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        let vocab = learn("b a b c c c\n", 1).unwrap();
        vocab.save(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "c 3\nb 2\na 1\n</s> 1\n"
        );

        let loaded = Vocabulary::load(&path, 1).unwrap();
        assert_eq!(loaded.entries(), vocab.entries());

        let pruned = Vocabulary::load(&path, 2).unwrap();
        assert_eq!(pruned.words().collect::<Vec<_>>(), ["c", "b", "</s>"]);
    }

    #[test]
    fn load_rejects_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        std::fs::write(&path, "a 1\nb two\n").unwrap();
        let err = Vocabulary::load(&path, 1).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");

        std::fs::write(&path, "a 1 2\n").unwrap();
        assert!(matches!(
            Vocabulary::load(&path, 1),
            Err(Error::VocabularyUnreadable { .. })
        ));

        std::fs::write(&path, "a 1\na 3\n").unwrap();
        assert!(Vocabulary::load(&path, 1).is_err());

        assert!(matches!(
            Vocabulary::load(&dir.path().join("missing"), 1),
            Err(Error::VocabularyUnreadable { .. })
        ));
    }

    #[test]
    fn missing_corpus() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Vocabulary::learn_from_file(&dir.path().join("nope.txt"), 1),
            Err(Error::CorpusUnreadable { .. })
        ));
    }

    #[test]
    fn serde_rebuilds_index() {
        let vocab = learn("x y y z z z", 1).unwrap();
        let bytes = bincode::serialize(&vocab).unwrap();
        let back: Vocabulary = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.entries(), vocab.entries());
        assert_eq!(back.lookup("y"), Some(1));
        assert_eq!(back.train_words(), 6);
    }
}
