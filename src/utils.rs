use std::io;
use thiserror::Error;

/// Errors raised while building, loading or using grammars and automata
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("Invalid automaton: {0}")]
    InvalidAutomaton(String),

    #[error(
        "Failed to generate a string in {attempts} attempts of at most {max_steps} steps; \
         increase max_steps or max_attempts"
    )]
    GenerationExhausted { attempts: usize, max_steps: usize },
}

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Trait extension for Option<T> to convert to GrammarError
pub trait OptionExt<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn ok_or_parse_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| GrammarError::InvalidGrammar(f()))
    }

    fn ok_or_parse_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| GrammarError::Parse(f()))
    }
}
