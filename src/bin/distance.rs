use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use word2vec::{ModelFormat, Vectors, DEFAULT_NUMBER_OF_CLOSEST};

#[derive(Parser)]
#[command(about = "Interactively lists the words closest to a word or phrase")]
struct Options {
    /// Contains word projections, in binary format unless --text or --bincode is given.
    #[arg(value_name = "FILE")]
    file_name: PathBuf,

    /// FILE is in the text format
    #[arg(long, group = "format")]
    text: bool,

    /// FILE is a bincode model snapshot
    #[arg(long, group = "format")]
    bincode: bool,

    /// Number of closest words that will be shown
    #[arg(short = 'n', long = "closest", default_value_t = DEFAULT_NUMBER_OF_CLOSEST)]
    number_of_closest: usize,
}

impl Options {
    fn format(&self) -> ModelFormat {
        if self.text {
            ModelFormat::Text
        } else if self.bincode {
            ModelFormat::Bincode
        } else {
            ModelFormat::Binary
        }
    }
}

fn run(options: Options) -> Result<()> {
    let vectors = Vectors::load(&options.file_name, options.format())
        .context("error loading word vectors")?;

    let mut line = String::new();
    'outer: loop {
        print!("Enter word or sentence (EXIT to break): ");
        let _ = std::io::stdout().flush();

        line.clear();
        if std::io::stdin()
            .read_line(&mut line)
            .context("error reading stdin")?
            == 0
        {
            break;
        }
        if line.trim() == "EXIT" {
            break;
        }

        let words = line.split_whitespace().collect::<Vec<&str>>();
        if words.is_empty() {
            continue;
        }
        for &word in &words {
            println!();
            print!("Word: {word}  Position in vocabulary: ");
            match vectors.lookup_word(word) {
                None => {
                    println!("None");
                    println!("Out of dictionary word!");
                    continue 'outer;
                }
                Some(i) => println!("{i}"),
            }
        }

        println!();
        println!("                                              Word       Cosine distance");
        println!("------------------------------------------------------------------------");
        for neighbor in vectors.phrase_distance(&words, options.number_of_closest)? {
            println!("{:>50}\t\t{:8.6}", neighbor.word, neighbor.similarity);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Options::parse()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
