//! Saving trained models.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::ModelFormat;
use crate::error::{Error, Result};
use crate::kmeans;
use crate::trainer::TrainedModel;

/// Writes word vectors in one of the word2vec formats: a `"<words> <size>"`
/// header, then each word and its vector.
pub fn write_word_vectors<'w, W, I>(
    fo: &mut W,
    words: I,
    embeddings: &[f32],
    size: usize,
    binary: bool,
) -> io::Result<()>
where
    W: Write,
    I: ExactSizeIterator<Item = &'w str>,
{
    writeln!(fo, "{} {}", words.len(), size)?;
    let mut le = vec![0.0f32; size];
    for (word, word_vec) in words.zip(embeddings.chunks_exact(size)) {
        write!(fo, "{word} ")?;
        if binary {
            for (out, x) in le.iter_mut().zip(word_vec) {
                *out = f32::from_bits(x.to_bits().to_le());
            }
            fo.write_all(bytemuck::cast_slice::<f32, u8>(&le))?;
        } else {
            for x in word_vec {
                write!(fo, "{x} ")?;
            }
        }
        writeln!(fo)?;
    }
    Ok(())
}

/// Writes one `word class` line per word.
pub fn write_classes<'w, W, I>(fo: &mut W, words: I, classes: &[usize]) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = &'w str>,
{
    for (word, class) in words.zip(classes) {
        writeln!(fo, "{word} {class}")?;
    }
    Ok(())
}

fn bincode_to_io(err: bincode::Error) -> io::Error {
    match *err {
        bincode::ErrorKind::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Saves `model` to `path` in `format`.
pub fn write_model(model: &TrainedModel, path: &Path, format: ModelFormat) -> Result<()> {
    model.save(path, format)
}

impl TrainedModel {
    /// Saves the model to `path`. The file is closed before returning, on
    /// success or failure.
    pub fn save(&self, path: &Path, format: ModelFormat) -> Result<()> {
        let mut fo =
            BufWriter::new(File::create(path).map_err(Error::write_failure(path))?);
        let words = self.vocab.entries().iter().map(|vw| vw.word.as_str());
        let written = match format {
            ModelFormat::Binary => {
                write_word_vectors(&mut fo, words, &self.embeddings, self.size, true)
            }
            ModelFormat::Text => {
                write_word_vectors(&mut fo, words, &self.embeddings, self.size, false)
            }
            ModelFormat::Bincode => bincode::serialize_into(&mut fo, self).map_err(bincode_to_io),
        };
        written
            .and_then(|()| fo.flush())
            .map_err(Error::write_failure(path))
    }

    /// Runs K-means on the word vectors and saves the class of each word
    /// instead of the vectors.
    pub fn save_classes(&self, path: &Path, classes: usize) -> Result<()> {
        let cl = kmeans::word_classes(&self.embeddings, self.size, classes);
        let mut fo =
            BufWriter::new(File::create(path).map_err(Error::write_failure(path))?);
        write_classes(&mut fo, self.vocab.words(), &cl)
            .and_then(|()| fo.flush())
            .map_err(Error::write_failure(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_format() {
        let mut out = vec![];
        let words = ["a", "bb"];
        write_word_vectors(&mut out, words.into_iter(), &[1.0, -0.5, 0.25, 2.0], 2, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2 2\na 1 -0.5 \nbb 0.25 2 \n");
    }

    #[test]
    fn binary_format() {
        let mut out = vec![];
        write_word_vectors(&mut out, ["x"].into_iter(), &[1.0, -2.0], 2, true).unwrap();
        let mut expected = b"1 2\nx ".to_vec();
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&(-2.0f32).to_le_bytes());
        expected.push(b'\n');
        assert_eq!(out, expected);
    }

    #[test]
    fn classes_format() {
        let mut out = vec![];
        write_classes(&mut out, ["a", "b", "c"].into_iter(), &[1, 0, 1]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a 1\nb 0\nc 1\n");
    }

    #[test]
    fn unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = crate::Vocabulary::from_counts([("w".to_string(), 1)], 1).unwrap();
        let model = TrainedModel {
            config: Default::default(),
            vocab,
            size: 1,
            embeddings: vec![0.5],
            weights: vec![0.0],
        };
        let path = dir.path().join("no-such-dir").join("out.bin");
        assert!(matches!(
            model.save(&path, ModelFormat::Binary),
            Err(Error::WriteFailure { .. })
        ));
        assert!(matches!(
            model.save_classes(&path, 1),
            Err(Error::WriteFailure { .. })
        ));
    }
}
