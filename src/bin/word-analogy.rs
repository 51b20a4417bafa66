use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use word2vec::{ModelFormat, Vectors, DEFAULT_NUMBER_OF_CLOSEST};

#[derive(Parser)]
#[command(about = "Interactively completes analogies: a is to b as c is to ?")]
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

fn run(options: Options) -> Result<()> {
    let format = if options.text {
        ModelFormat::Text
    } else if options.bincode {
        ModelFormat::Bincode
    } else {
        ModelFormat::Binary
    };
    let vectors =
        Vectors::load(&options.file_name, format).context("error loading word vectors")?;

    let mut line = String::new();
    'outer: loop {
        print!("Enter three words (EXIT to break): ");
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
        let [a, b, c] = words[..] else {
            println!(
                "{} words were entered.. three words are needed at the input to perform the calculation",
                words.len()
            );
            continue;
        };
        for word in [a, b, c] {
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
        for neighbor in vectors.analogy(a, b, c, options.number_of_closest)? {
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
