use clap::{ArgAction, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use regular_grammar::{GenerationConfig, Grammar, GrammarBuilder, load_grammar};
use std::path::PathBuf;
use tracing::Level;

/// Right-linear grammar toolkit: generate sentences and test membership
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in reference grammar
    Demo {
        /// Seed for the random generator
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate random strings from a grammar file
    Generate {
        /// Path to the grammar file (.json or text notation)
        grammar_file: PathBuf,

        /// Number of strings to generate
        #[arg(short, long, default_value_t = 5)]
        count: usize,

        /// Rewrites allowed per attempt
        #[arg(long)]
        max_steps: Option<usize>,

        /// Attempts before giving up
        #[arg(long)]
        attempts: Option<usize>,

        /// Seed for the random generator
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check whether words belong to the grammar's language
    Check {
        /// Path to the grammar file (.json or text notation)
        grammar_file: PathBuf,

        /// Words to test
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Print the grammar and its automaton transition table
    Table {
        /// Path to the grammar file (.json or text notation)
        grammar_file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Demo { seed } => demo(seed)?,
        Commands::Generate {
            grammar_file,
            count,
            max_steps,
            attempts,
            seed,
        } => {
            let grammar = load_grammar(&grammar_file)?;
            let defaults = grammar.config().clone();
            let grammar = grammar.with_config(GenerationConfig {
                max_steps: max_steps.unwrap_or(defaults.max_steps),
                max_attempts: attempts.unwrap_or(defaults.max_attempts),
            });
            let automaton = grammar.to_automaton();
            let mut rng = make_rng(seed);

            for i in 0..count {
                let word = grammar.generate_string_with_rng(&mut rng, grammar.config().max_steps)?;
                println!("{}. {}  -> {}", i + 1, word, automaton.accepts(&word));
            }
        }
        Commands::Check {
            grammar_file,
            words,
        } => {
            let automaton = load_grammar(&grammar_file)?.to_automaton();
            for word in &words {
                println!("{:<10} -> {}", word, automaton.accepts(word));
            }
        }
        Commands::Table { grammar_file } => {
            let grammar = load_grammar(&grammar_file)?;
            let automaton = grammar.to_automaton();
            println!("{}", grammar);
            println!("{}", automaton);
            println!("{}", automaton.transition_table());
            println!("deterministic: {}", automaton.is_deterministic());
        }
    }

    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn reference_grammar() -> regular_grammar::Result<Grammar> {
    GrammarBuilder::new("S")
        .nonterminal("S")
        .nonterminal("B")
        .nonterminal("C")
        .terminals("abc")
        .production("S", "aB")
        .productions("B", &["aC", "bB"])
        .productions("C", &["bB", "c", "aS"])
        .weight("C", "c", 3)
        .build()
}

fn demo(seed: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let grammar = reference_grammar()?;
    let automaton = grammar.to_automaton();
    let mut rng = make_rng(seed);

    println!("{}", grammar);
    println!("Generated strings and automaton check:");
    for i in 0..5 {
        let word = grammar.generate_string_with_rng(&mut rng, grammar.config().max_steps)?;
        println!("{}. {}  -> {}", i + 1, word, automaton.accepts(&word));
    }

    println!("\nMembership tests:");
    for word in ["c", "aac", "abac", "aa", "aba", "ababc"] {
        println!("  {:<8} -> {}", word, automaton.accepts(word));
    }

    Ok(())
}
