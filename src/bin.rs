use clap::{Parser, ValueEnum};
use gridgen::search::{Generator, GeneratorError};
use gridgen::word_list::parse_word_file;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DEFAULT_WORDS_RAW: &str = include_str!("../resources/wordlist.txt");

/// gridgen: command-line crossword-style grid generation tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Grid side length
    #[arg(long, default_value_t = 4)]
    size: usize,

    /// Path to the preferred word list, one word per line [default: embedded
    /// common-word list]
    #[arg(long)]
    preferred: Option<String>,

    /// Path to the obscure word list
    #[arg(long)]
    obscure: Option<String>,

    /// Path to a list of words to exclude
    #[arg(long)]
    exclude: Option<String>,

    /// Seed for the search order [default: derived from the clock]
    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this many seconds (0 disables the limit)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// How many grids to produce before stopping
    #[arg(long, value_enum, default_value_t = Mode::Interactive)]
    mode: Mode,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Print the first grid and exit
    First,
    /// Print every grid the search reaches
    All,
    /// Prompt after each grid
    Interactive,
}

fn load_word_file(path: &str) -> Result<Vec<String>, String> {
    let contents =
        fs::read_to_string(path).map_err(|_| format!("Couldn't read file '{path}'"))?;
    Ok(parse_word_file(&contents))
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

fn run(args: &Args) -> Result<ExitCode, String> {
    let preferred = match &args.preferred {
        Some(path) => load_word_file(path)?,
        None => parse_word_file(DEFAULT_WORDS_RAW),
    };
    let obscure = match &args.obscure {
        Some(path) => load_word_file(path)?,
        None => vec![],
    };
    let excluded = match &args.exclude {
        Some(path) => load_word_file(path)?,
        None => vec![],
    };

    if preferred.is_empty() && obscure.is_empty() {
        return Err(GeneratorError::EmptyDictionary.to_string());
    }

    let seed = args.seed.unwrap_or_else(clock_seed);
    let generator = Generator::new(args.size, &preferred, &obscure, &excluded, seed)
        .map_err(|err| err.to_string())?;

    if generator.word_list().is_empty() {
        return Err(GeneratorError::EmptyDictionary.to_string());
    }

    eprintln!("Preferred words: {}", preferred.len());
    eprintln!("Obscure words: {}", obscure.len());
    eprintln!("Excluded words: {}", excluded.len());

    let cancel = Arc::new(AtomicBool::new(false));
    if args.timeout > 0 {
        let cancel = Arc::clone(&cancel);
        let timeout = args.timeout;
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(timeout));
            cancel.store(true, Ordering::Relaxed);
        });
    }

    let mut produced = 0usize;
    for grid in generator.possible_grids(Some(Arc::clone(&cancel))) {
        produced += 1;
        println!("--------------------------------");
        println!("{}", grid.repr());

        match args.mode {
            Mode::First => break,
            Mode::All => {}
            Mode::Interactive => {
                print!("Continue? [Y/n]: ");
                let _ = io::stdout().flush();

                let mut input = String::new();
                if io::stdin().lock().read_line(&mut input).is_err() {
                    break;
                }
                let input = input.trim();
                if input.eq_ignore_ascii_case("s") {
                    println!("{}", grid.debug_string());
                }
                if input.eq_ignore_ascii_case("n") {
                    break;
                }
            }
        }
    }

    println!("--------------------------------");
    println!("Done");

    if produced == 0 && cancel.load(Ordering::Relaxed) {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::init();

    // Argument errors exit with 1; code 2 is reserved for a timeout with no
    // grid produced.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = u8::from(err.use_stderr());
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    match run(&args) {
        Ok(exit) => exit,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}
