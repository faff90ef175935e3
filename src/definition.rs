use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grammar::{GenerationConfig, Grammar, ProductionWeights};
use crate::utils::{GrammarError, OptionExt, Result};

static NONTERMINALS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^nonterminals\s*:\s*(.*)$").expect("valid regex"));
static TERMINALS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^terminals\s*:\s*(.*)$").expect("valid regex"));
static START_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^start\s*:\s*(\S+)$").expect("valid regex"));
static WEIGHT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^weight\s+(\S+)\s*(?:->|→)\s*(\S+)\s*=\s*(\d+)$").expect("valid regex")
});
static PRODUCTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s*(?:->|→)\s*(.*)$").expect("valid regex"));

/// Serializable description of a grammar, as stored in grammar files.
///
/// ```json
/// {
///   "nonterminals": ["S", "B", "C"],
///   "terminals": ["a", "b", "c"],
///   "productions": { "S": ["aB"], "B": ["aC", "bB"], "C": ["bB", "c", "aS"] },
///   "start_symbol": "S",
///   "weights": { "C": { "c": 3 } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarDefinition {
    pub nonterminals: Vec<String>,
    pub terminals: Vec<char>,
    pub productions: IndexMap<String, Vec<String>>,
    pub start_symbol: String,
    #[serde(default, skip_serializing_if = "ProductionWeights::is_empty")]
    pub weights: ProductionWeights,
    #[serde(default)]
    pub config: GenerationConfig,
}

impl GrammarDefinition {
    /// Validate the definition and build the grammar it describes
    pub fn into_grammar(self) -> Result<Grammar> {
        Grammar::new(
            self.nonterminals,
            self.terminals,
            self.productions,
            &self.start_symbol,
        )?
        .with_config(self.config)
        .with_weights(self.weights)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the line-based grammar notation:
    ///
    /// ```text
    /// # comment
    /// nonterminals: S B C
    /// terminals: a b c
    /// start: S
    /// S -> aB
    /// B -> aC | bB
    /// C -> bB | c | aS
    /// weight C -> c = 3
    /// ```
    ///
    /// `nonterminals:` may be left out, in which case the start symbol and
    /// the left-hand sides are used in order of appearance.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut nonterminals: Option<Vec<String>> = None;
        let mut terminals: Option<Vec<char>> = None;
        let mut start_symbol = None;
        let mut productions: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut weights = ProductionWeights::new();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            let number = number + 1;

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(captures) = NONTERMINALS_LINE.captures(line) {
                nonterminals = Some(captures[1].split_whitespace().map(String::from).collect());
            } else if let Some(captures) = TERMINALS_LINE.captures(line) {
                terminals = Some(
                    captures[1]
                        .split_whitespace()
                        .map(|token| single_char(token, number))
                        .collect::<Result<_>>()?,
                );
            } else if let Some(captures) = START_LINE.captures(line) {
                start_symbol = Some(captures[1].to_string());
            } else if let Some(captures) = WEIGHT_LINE.captures(line) {
                let weight = captures[3].parse::<u32>().map_err(|e| {
                    GrammarError::Parse(format!("line {}: bad weight: {}", number, e))
                })?;
                weights.set(&captures[1], &captures[2], weight);
            } else if let Some(captures) = PRODUCTION_LINE.captures(line) {
                productions
                    .entry(captures[1].to_string())
                    .or_default()
                    .extend(captures[2].split('|').map(|rhs| rhs.trim().to_string()));
            } else {
                return Err(GrammarError::Parse(format!(
                    "line {}: unrecognized line: {}",
                    number, line
                )));
            }
        }

        let start_symbol =
            start_symbol.ok_or_parse_err(|| "missing `start:` line".to_string())?;
        let terminals = terminals.ok_or_parse_err(|| "missing `terminals:` line".to_string())?;
        let nonterminals = nonterminals.unwrap_or_else(|| {
            std::iter::once(start_symbol.clone())
                .chain(productions.keys().cloned())
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect()
        });

        debug!(
            nonterminals = nonterminals.len(),
            productions = productions.len(),
            "parsed grammar text"
        );

        Ok(GrammarDefinition {
            nonterminals,
            terminals,
            productions,
            start_symbol,
            weights,
            config: GenerationConfig::default(),
        })
    }

    pub fn from_text_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_text(&content)
    }
}

fn single_char(token: &str, line: usize) -> Result<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(GrammarError::Parse(format!(
            "line {}: terminal must be a single character: {}",
            line, token
        ))),
    }
}

impl From<&Grammar> for GrammarDefinition {
    fn from(grammar: &Grammar) -> Self {
        GrammarDefinition {
            nonterminals: grammar.nonterminals().iter().cloned().collect(),
            terminals: grammar.terminals().iter().copied().collect(),
            productions: grammar.productions().clone(),
            start_symbol: grammar.start_symbol().to_string(),
            weights: grammar.weights().clone(),
            config: grammar.config().clone(),
        }
    }
}

/// Load a grammar file, reading `.json` files as JSON and anything else as
/// the text notation
pub fn load_grammar<P: AsRef<Path>>(path: P) -> Result<Grammar> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    debug!(path = %path.display(), is_json, "loading grammar");

    let definition = if is_json {
        GrammarDefinition::from_json_file(path)?
    } else {
        GrammarDefinition::from_text_file(path)?
    };

    definition.into_grammar()
}
