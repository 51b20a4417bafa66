//! Reading words from a training corpus.

use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;

/// Words longer than `MAX_STRING - 1` bytes are truncated.
pub const MAX_STRING: usize = 100;

/// The word produced for every newline in the corpus.
pub const SENTENCE_BOUNDARY: &str = "</s>";

/// Splits a byte stream into words, assuming space + tab + EOL to be word
/// boundaries. Each newline is itself returned as the word `</s>`.
pub struct WordReader<R> {
    inner: R,
    word: Vec<u8>,
}

enum Scan {
    Word,
    Newline,
    More,
}

impl<R: BufRead> WordReader<R> {
    pub fn new(inner: R) -> Self {
        WordReader {
            inner,
            word: Vec::with_capacity(MAX_STRING),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads a single word. Returns `Ok(None)` at end of file.
    pub fn read_word(&mut self) -> io::Result<Option<String>> {
        self.word.clear();
        loop {
            let buf = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if buf.is_empty() {
                break;
            }

            let mut used = 0;
            let mut scan = Scan::More;
            for &b in buf {
                match b {
                    b' ' | b'\t' | b'\n' if !self.word.is_empty() => {
                        // A newline right after a word is left for the next call.
                        if b != b'\n' {
                            used += 1;
                        }
                        scan = Scan::Word;
                        break;
                    }
                    b'\n' => {
                        used += 1;
                        scan = Scan::Newline;
                        break;
                    }
                    b' ' | b'\t' | b'\r' => {}
                    _ => {
                        if self.word.len() < MAX_STRING - 1 {
                            self.word.push(b); // Truncate too long words
                        }
                    }
                }
                used += 1;
            }
            self.inner.consume(used);

            match scan {
                Scan::Word => break,
                Scan::Newline => return Ok(Some(SENTENCE_BOUNDARY.to_string())),
                Scan::More => {}
            }
        }

        Ok(if self.word.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.word).into_owned())
        })
    }
}

impl<R: BufRead> Iterator for WordReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        self.read_word().transpose()
    }
}

impl WordReader<BufReader<File>> {
    /// Opens `path` and positions the reader at byte `offset`.
    ///
    /// The offset need not fall on a word boundary; the first word read may be
    /// the tail end of a longer one.
    pub fn open_at(path: &Path, offset: u64) -> io::Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(offset))?;
        Ok(WordReader::new(file))
    }

    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

pub fn file_size(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}
