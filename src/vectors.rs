use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::ops::Index;
use std::path::Path;

use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::config::ModelFormat;
use crate::error::{Error, Result};
use crate::trainer::TrainedModel;

/// Word vectors loaded for querying. Every vector is normalized to unit
/// length, so a dot product is a cosine similarity.
pub struct Vectors {
    /// Embedding vector length (number of dimensions).
    size: usize,

    /// The vocabulary.
    vocab: Vec<String>,

    index: HashMap<String, usize>,

    /// `embeddings[k * size..(k+1) * size]` is the vector embedding for word `k`.
    embeddings: Vec<f32>,
}

/// One entry of a query result.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub word: String,
    pub similarity: f32,
}

pub fn norm(v: &[f32]) -> f32 {
    v.iter().copied().map(|e| e * e).sum::<f32>().sqrt()
}

/// Scales `v` to unit length. A zero vector is left alone.
pub fn normalize(v: &mut [f32]) {
    let len = norm(v);
    if len > 0.0 {
        for e in v {
            *e /= len;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

impl Index<usize> for Vectors {
    type Output = [f32];

    fn index(&self, i: usize) -> &[f32] {
        &self.embeddings[i * self.size..][..self.size]
    }
}

type Parsed = std::result::Result<(usize, Vec<String>, Vec<f32>), String>;

fn read_header<R: BufRead>(f: &mut R) -> std::result::Result<(usize, usize), String> {
    let mut line = String::new();
    f.read_line(&mut line).map_err(|err| err.to_string())?;
    let mut fields = line.split_whitespace();
    let mut number = |what: &str| -> std::result::Result<usize, String> {
        fields
            .next()
            .ok_or_else(|| format!("missing {what} in header"))?
            .parse()
            .map_err(|_| format!("invalid {what} in header"))
    };
    let num_words = number("number of words")?;
    let size = number("vector size")?;
    if size == 0 {
        return Err("vector size is zero".to_string());
    }
    // Only checked for overflow; readers grow their buffers row by row.
    num_words
        .checked_mul(size)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| format!("header claims too many elements: {num_words} x {size}"))?;
    Ok((num_words, size))
}

fn read_binary<R: BufRead>(mut f: R) -> Parsed {
    let (num_words, size) = read_header(&mut f)?;
    let row_bytes = size * std::mem::size_of::<f32>();
    let mut vocab: Vec<String> = vec![];
    let mut m: Vec<f32> = vec![];
    let mut buf = Vec::<u8>::new();
    for b in 0..num_words {
        let mut vocab_word = Vec::<u8>::new();
        let count = f
            .read_until(b' ', &mut vocab_word)
            .map_err(|err| err.to_string())?;
        if count == 0 || vocab_word.last() != Some(&b' ') {
            return Err(format!("expected {num_words} words, found {b}"));
        }
        vocab_word.pop();
        vocab_word.retain(|c| *c != b'\n');
        vocab.push(
            String::from_utf8(vocab_word).map_err(|_| format!("invalid word at position {b}"))?,
        );

        buf.clear();
        (&mut f)
            .take(row_bytes as u64)
            .read_to_end(&mut buf)
            .map_err(|err| err.to_string())?;
        if buf.len() != row_bytes {
            return Err(format!("truncated vector for word {:?}", vocab[b]));
        }
        m.extend(
            buf.chunks_exact(4)
                .map(|x| f32::from_le_bytes([x[0], x[1], x[2], x[3]])),
        );
    }
    Ok((size, vocab, m))
}

fn read_text<R: BufRead>(mut f: R) -> Parsed {
    let (num_words, size) = read_header(&mut f)?;
    let mut vocab: Vec<String> = vec![];
    let mut m: Vec<f32> = vec![];
    let mut line = String::new();
    while vocab.len() < num_words {
        line.clear();
        if f.read_line(&mut line).map_err(|err| err.to_string())? == 0 {
            return Err(format!("expected {num_words} words, found {}", vocab.len()));
        }
        let mut fields = line.split_whitespace();
        let word = match fields.next() {
            None => continue,
            Some(word) => word,
        };
        let start = m.len();
        for field in fields {
            m.push(
                field
                    .parse::<f32>()
                    .map_err(|_| format!("invalid number in vector for word {word:?}"))?,
            );
        }
        if m.len() - start != size {
            return Err(format!(
                "vector for word {word:?} has {} elements, expected {size}",
                m.len() - start
            ));
        }
        vocab.push(word.to_string());
    }
    Ok((size, vocab, m))
}

fn read_bincode<R: Read>(f: R) -> Parsed {
    let model: TrainedModel = bincode::deserialize_from(f).map_err(|err| err.to_string())?;
    if model.size == 0 || model.embeddings.len() != model.vocab.len() * model.size {
        return Err("embedding matrix does not match vocabulary".to_string());
    }
    let vocab = model.vocab.words().map(str::to_string).collect();
    Ok((model.size, vocab, model.embeddings))
}

impl Vectors {
    pub fn load(file_name: &Path, format: ModelFormat) -> Result<Self> {
        let unreadable = |reason: String| Error::ModelUnreadable {
            path: file_name.to_owned(),
            reason,
        };
        let f = BufReader::new(File::open(file_name).map_err(|err| unreadable(err.to_string()))?);
        let (size, vocab, embeddings) = match format {
            ModelFormat::Binary => read_binary(f),
            ModelFormat::Text => read_text(f),
            ModelFormat::Bincode => read_bincode(f),
        }
        .map_err(unreadable)?;
        Ok(Vectors::new(vocab, size, embeddings))
    }

    /// Builds a query model from raw vectors, normalizing each one.
    ///
    /// Panics if `embeddings.len() != vocab.len() * size`.
    pub fn new(vocab: Vec<String>, size: usize, mut embeddings: Vec<f32>) -> Self {
        assert_eq!(embeddings.len(), vocab.len() * size);
        for row in embeddings.chunks_exact_mut(size) {
            normalize(row);
        }
        let index = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Vectors {
            size,
            vocab,
            index,
            embeddings,
        }
    }

    pub fn from_model(model: &TrainedModel) -> Self {
        let vocab = model.vocab.words().map(str::to_string).collect();
        Vectors::new(vocab, model.size, model.embeddings.clone())
    }

    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    /// Returns the vector size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the index for a word as string. Exact match only, case-sensitive.
    pub fn lookup_word(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    fn require(&self, word: &str) -> Result<usize> {
        self.lookup_word(word)
            .ok_or_else(|| Error::UnknownWord(word.to_string()))
    }

    /// Get the word for a word-index. Panics if `word` is out of range.
    pub fn word(&self, word: usize) -> &str {
        &self.vocab[word]
    }

    /// Cosine similarity of two words.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        Ok(dot(&self[self.require(a)?], &self[self.require(b)?]))
    }

    /// The `n` words closest to `query` (which must be normalized), skipping
    /// the words in `exclude`. Best first.
    pub fn nearest(&self, query: &[f32], exclude: &[usize], n: usize) -> Vec<Neighbor> {
        let mut best: Vec<(usize, f32)> = (0..self.num_words())
            .into_par_iter()
            .filter(|c| !exclude.contains(c))
            .map(|c| (c, dot(query, &self[c])))
            .collect();
        best.sort_by_key(|&(_c, dist)| Reverse(OrderedFloat(dist)));
        best.truncate(n);
        best.into_iter()
            .map(|(c, similarity)| Neighbor {
                word: self.vocab[c].clone(),
                similarity,
            })
            .collect()
    }

    /// The `n` words closest to `word`.
    pub fn distance(&self, word: &str, n: usize) -> Result<Vec<Neighbor>> {
        self.phrase_distance(&[word], n)
    }

    /// The `n` words closest to the sum of the vectors of `words`.
    pub fn phrase_distance(&self, words: &[&str], n: usize) -> Result<Vec<Neighbor>> {
        if words.is_empty() {
            return Err(Error::InvalidQuery("no words given".to_string()));
        }
        let bi = words
            .iter()
            .map(|w| self.require(w))
            .collect::<Result<Vec<usize>>>()?;

        let mut vec = vec![0.0f32; self.size];
        for &i in &bi {
            for (v, r) in vec.iter_mut().zip(&self[i]) {
                *v += r;
            }
        }
        normalize(&mut vec);
        Ok(self.nearest(&vec, &bi, n))
    }

    /// Completes the analogy "`a` is to `b` as `c` is to ?", by finding the
    /// `n` words closest to `b - a + c`.
    pub fn analogy(&self, a: &str, b: &str, c: &str, n: usize) -> Result<Vec<Neighbor>> {
        let bi = [self.require(a)?, self.require(b)?, self.require(c)?];

        let mut vec = vec![0.0f32; self.size];
        let (va, vb, vc) = (&self[bi[0]], &self[bi[1]], &self[bi[2]]);
        for i in 0..self.size {
            vec[i] = vb[i] - va[i] + vc[i];
        }
        normalize(&mut vec);
        Ok(self.nearest(&vec, &bi, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_zero_vector() {
        let mut v = [0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, [0.0, 0.0]);
        let mut v = [3.0, 4.0];
        normalize(&mut v);
        assert_eq!(v, [0.6, 0.8]);
    }

    #[test]
    fn self_similarity_and_exclusion() {
        #[rustfmt::skip]
        let vectors = Vectors::new(words(&["cat", "dog", "car"]), 2, vec![
            1.0, 0.2,
            0.9, 0.3,
            -0.2, 1.0,
        ]);
        assert!((vectors.similarity("cat", "cat").unwrap() - 1.0).abs() < 1e-6);

        let best = vectors.distance("cat", 40).unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].word, "dog");
        assert_eq!(best[1].word, "car");
        assert!(best[0].similarity > best[1].similarity);
        assert!(best.iter().all(|n| n.word != "cat"));

        assert_eq!(vectors.distance("cat", 1).unwrap().len(), 1);
    }

    #[test]
    fn unknown_words() {
        let vectors = Vectors::new(words(&["a", "b", "c"]), 1, vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            vectors.distance("zebra", 5),
            Err(Error::UnknownWord(w)) if w == "zebra"
        ));
        assert!(matches!(
            vectors.analogy("a", "zebra", "c", 5),
            Err(Error::UnknownWord(_))
        ));
        assert!(matches!(
            vectors.phrase_distance(&[], 5),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn phrase_sums_vectors() {
        #[rustfmt::skip]
        let vectors = Vectors::new(words(&["x", "y", "xy", "z"]), 3, vec![
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            1.0, 1.0, 0.1,
            0.0, 0.0, 1.0,
        ]);
        let best = vectors.phrase_distance(&["x", "y"], 10).unwrap();
        assert_eq!(best[0].word, "xy");
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn analogy_by_construction() {
        // Dimensions: royalty, gender, something unrelated.
        #[rustfmt::skip]
        let vectors = Vectors::new(words(&["man", "woman", "king", "queen", "apple", "prince"]), 3, vec![
            0.0, 1.0, 0.1,
            0.0, -1.0, 0.1,
            1.0, 1.0, 0.1,
            1.0, -1.0, 0.1,
            0.1, 0.0, 1.0,
            0.8, 0.9, 0.1,
        ]);
        let best = vectors.analogy("man", "king", "woman", 3).unwrap();
        assert_eq!(best[0].word, "queen");
        assert!(best
            .iter()
            .all(|n| !["man", "king", "woman"].contains(&n.word.as_str())));
    }

    #[test]
    fn corrupt_headers_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors");
        let cases: [(&[u8], ModelFormat); 5] = [
            (b"100000000000 100\nx ", ModelFormat::Binary),
            (b"100000000000 100\nx 1 2\n", ModelFormat::Text),
            (b"18446744073709551615 2\n", ModelFormat::Binary),
            (b"2 18446744073709551615\n", ModelFormat::Text),
            (b"two 3\n", ModelFormat::Binary),
        ];
        for (contents, format) in cases {
            std::fs::write(&path, contents).unwrap();
            assert!(
                matches!(
                    Vectors::load(&path, format),
                    Err(Error::ModelUnreadable { .. })
                ),
                "{:?}",
                String::from_utf8_lossy(contents)
            );
        }
    }

    #[test]
    fn truncated_binary_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let mut contents = b"1 2\nx ".to_vec();
        contents.extend_from_slice(&1.0f32.to_le_bytes());
        std::fs::write(&path, &contents).unwrap();
        assert!(matches!(
            Vectors::load(&path, ModelFormat::Binary),
            Err(Error::ModelUnreadable { .. })
        ));

        contents.extend_from_slice(&(-1.0f32).to_le_bytes());
        std::fs::write(&path, &contents).unwrap();
        let vectors = Vectors::load(&path, ModelFormat::Binary).unwrap();
        assert_eq!(vectors.word(0), "x");
        assert!((vectors[0][0] - 0.5f32.sqrt()).abs() < 1e-6);
    }
}
