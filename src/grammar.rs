use std::fmt;

use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::automaton::{Delta, FiniteAutomaton};
use crate::utils::{GrammarError, OptionExt, Result};

/// Name of the accepting state `to_automaton` adds, before it is made fresh
pub const FINAL_STATE: &str = "FINAL";

/// An element of a sentential form, either a terminal or a non-terminal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// A terminal symbol of the alphabet
    Terminal(char),
    /// A non-terminal still waiting to be rewritten
    NonTerminal(String),
}

impl Element {
    fn as_terminal(&self) -> Option<char> {
        match self {
            Element::Terminal(c) => Some(*c),
            Element::NonTerminal(_) => None,
        }
    }
}

/// A right-linear right-hand side: one terminal, optionally followed by one non-terminal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Production {
    pub terminal: char,
    pub next: Option<String>,
}

impl Production {
    /// The elements this right-hand side splices into a sentential form
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        std::iter::once(Element::Terminal(self.terminal))
            .chain(self.next.iter().cloned().map(Element::NonTerminal))
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.terminal)?;
        if let Some(next) = &self.next {
            write!(f, "{}", next)?;
        }
        Ok(())
    }
}

/// Limits for random string generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Rewrites allowed in one attempt before it is abandoned
    pub max_steps: usize,
    /// Attempts made before giving up with `GenerationExhausted`
    pub max_attempts: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            max_steps: 30,
            max_attempts: 50,
        }
    }
}

/// Per-nonterminal selection weights for right-hand sides.
///
/// Alternatives without an entry weigh 1. Non-terminals without any entry
/// pick their alternatives uniformly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionWeights(IndexMap<String, IndexMap<String, u32>>);

impl ProductionWeights {
    /// Create an empty weight table
    pub fn new() -> Self {
        ProductionWeights(IndexMap::new())
    }

    /// Builder-style variant of [`ProductionWeights::set`]
    pub fn with(mut self, non_terminal: &str, rhs: &str, weight: u32) -> Self {
        self.set(non_terminal, rhs, weight);
        self
    }

    /// Set the weight of `rhs` among the alternatives of `non_terminal`
    pub fn set(&mut self, non_terminal: &str, rhs: &str, weight: u32) {
        self.0
            .entry(non_terminal.to_string())
            .or_default()
            .insert(rhs.to_string(), weight);
    }

    /// Weight of `rhs` when rewriting `non_terminal`
    pub fn weight_of(&self, non_terminal: &str, rhs: &str) -> u32 {
        self.0
            .get(non_terminal)
            .and_then(|weights| weights.get(rhs))
            .copied()
            .unwrap_or(1)
    }

    /// Whether `non_terminal` picks its alternatives by weight
    pub fn is_weighted(&self, non_terminal: &str) -> bool {
        self.0.contains_key(non_terminal)
    }

    /// Whether no weights were given at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(non_terminal, rhs, weight)` entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.0.iter().flat_map(|(non_terminal, weights)| {
            weights
                .iter()
                .map(move |(rhs, weight)| (non_terminal.as_str(), rhs.as_str(), *weight))
        })
    }
}

/// A right-linear grammar `G = (V_N, V_T, P, S)`.
///
/// Every right-hand side is a terminal, or a terminal followed by a
/// single-character non-terminal. The grammar is checked when it is built
/// and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Grammar {
    nonterminals: IndexSet<String>,
    terminals: IndexSet<char>,
    productions: IndexMap<String, Vec<String>>,
    start_symbol: String,
    weights: ProductionWeights,
    config: GenerationConfig,
    // Parsed form of `productions`, same order
    alternatives: IndexMap<String, Vec<Production>>,
    // Weighted samplers for the non-terminals that have an entry in `weights`
    samplers: IndexMap<String, WeightedIndex<u32>>,
}

impl Grammar {
    /// Build and validate a grammar.
    ///
    /// Productions with the same left-hand side are merged in order.
    pub fn new<N, T, P, L, R>(
        nonterminals: N,
        terminals: T,
        productions: P,
        start_symbol: &str,
    ) -> Result<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        T: IntoIterator<Item = char>,
        P: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let mut merged: IndexMap<String, Vec<String>> = IndexMap::new();
        for (lhs, rhs) in productions {
            merged
                .entry(lhs.into())
                .or_default()
                .extend(rhs.into_iter().map(Into::into));
        }

        let nonterminals: IndexSet<String> = nonterminals.into_iter().map(Into::into).collect();
        let terminals: IndexSet<char> = terminals.into_iter().collect();

        let alternatives = Self::validate(&nonterminals, &terminals, &merged, start_symbol)?;

        debug!(
            nonterminals = nonterminals.len(),
            terminals = terminals.len(),
            productions = alternatives.values().map(Vec::len).sum::<usize>(),
            start = start_symbol,
            "built grammar"
        );

        Ok(Grammar {
            nonterminals,
            terminals,
            productions: merged,
            start_symbol: start_symbol.to_string(),
            weights: ProductionWeights::new(),
            config: GenerationConfig::default(),
            alternatives,
            samplers: IndexMap::new(),
        })
    }

    /// Replace the generation limits
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach selection weights, checking that each one names an existing
    /// alternative and is non-zero
    pub fn with_weights(mut self, weights: ProductionWeights) -> Result<Self> {
        let mut samplers = IndexMap::new();

        for (non_terminal, rhs, weight) in weights.iter() {
            let productions = self.productions.get(non_terminal).ok_or_grammar_err(|| {
                format!("Weight given for {} which has no productions", non_terminal)
            })?;

            if !productions.iter().any(|candidate| candidate == rhs) {
                return Err(GrammarError::InvalidGrammar(format!(
                    "Weight given for {} -> {} which is not a production",
                    non_terminal, rhs
                )));
            }

            if weight == 0 {
                return Err(GrammarError::InvalidGrammar(format!(
                    "Weight of {} -> {} must be positive",
                    non_terminal, rhs
                )));
            }
        }

        for (non_terminal, productions) in &self.productions {
            if !weights.is_weighted(non_terminal) {
                continue;
            }

            let row: Vec<u32> = productions
                .iter()
                .map(|rhs| weights.weight_of(non_terminal, rhs))
                .collect();

            // WeightedIndex panics if the total overflows
            row.iter()
                .try_fold(0u32, |total, weight| total.checked_add(*weight))
                .ok_or_grammar_err(|| {
                    format!(
                        "Weights for {} overflow: their sum exceeds {}",
                        non_terminal,
                        u32::MAX
                    )
                })?;

            let sampler = WeightedIndex::new(row)
            .map_err(|e| {
                GrammarError::InvalidGrammar(format!("Weights for {}: {}", non_terminal, e))
            })?;

            samplers.insert(non_terminal.clone(), sampler);
        }

        self.weights = weights;
        self.samplers = samplers;
        Ok(self)
    }

    fn validate(
        nonterminals: &IndexSet<String>,
        terminals: &IndexSet<char>,
        productions: &IndexMap<String, Vec<String>>,
        start_symbol: &str,
    ) -> Result<IndexMap<String, Vec<Production>>> {
        if !nonterminals.contains(start_symbol) {
            return Err(GrammarError::InvalidGrammar(format!(
                "Start symbol {} must be a nonterminal",
                start_symbol
            )));
        }

        if let Some(overlap) = terminals
            .iter()
            .find(|t| nonterminals.contains(t.to_string().as_str()))
        {
            return Err(GrammarError::InvalidGrammar(format!(
                "{} is declared both as a terminal and as a nonterminal",
                overlap
            )));
        }

        let mut alternatives = IndexMap::with_capacity(productions.len());

        for (lhs, rhs_list) in productions {
            if !nonterminals.contains(lhs) {
                return Err(GrammarError::InvalidGrammar(format!(
                    "LHS must be a nonterminal: {}",
                    lhs
                )));
            }

            let parsed = rhs_list
                .iter()
                .map(|rhs| Self::parse_rhs(nonterminals, terminals, rhs))
                .collect::<Result<Vec<_>>>()?;

            alternatives.insert(lhs.clone(), parsed);
        }

        Ok(alternatives)
    }

    fn parse_rhs(
        nonterminals: &IndexSet<String>,
        terminals: &IndexSet<char>,
        rhs: &str,
    ) -> Result<Production> {
        let mut chars = rhs.chars();

        let terminal = chars
            .next()
            .ok_or_grammar_err(|| "Empty production is not allowed".to_string())?;
        if !terminals.contains(&terminal) {
            return Err(GrammarError::InvalidGrammar(format!(
                "RHS must start with a terminal: {}",
                rhs
            )));
        }

        let next = match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(nt), None) => {
                let nt = nt.to_string();
                if !nonterminals.contains(&nt) {
                    return Err(GrammarError::InvalidGrammar(format!(
                        "RHS nonterminal not declared: {}",
                        rhs
                    )));
                }
                Some(nt)
            }
            (Some(_), Some(_)) => {
                return Err(GrammarError::InvalidGrammar(format!(
                    "Only RHS of length 1 or 2 is supported: {}",
                    rhs
                )));
            }
        };

        Ok(Production { terminal, next })
    }

    /// Generate a random string with the configured step limit
    pub fn generate_string(&self) -> Result<String> {
        self.generate_string_with_max_steps(self.config.max_steps)
    }

    /// Generate a random string, abandoning attempts that need more than
    /// `max_steps` rewrites
    pub fn generate_string_with_max_steps(&self, max_steps: usize) -> Result<String> {
        let mut rng = rand::thread_rng();
        self.generate_string_with_rng(&mut rng, max_steps)
    }

    /// Generate a random string drawing every choice from `rng`.
    ///
    /// Starting from the start symbol, the leftmost non-terminal of the
    /// sentential form is repeatedly replaced by one of its alternatives. An
    /// attempt is abandoned once more than `max_steps` rewrites were needed or
    /// when it reaches a non-terminal without productions; after
    /// `max_attempts` abandoned attempts generation fails.
    pub fn generate_string_with_rng<R: Rng>(&self, rng: &mut R, max_steps: usize) -> Result<String> {
        let attempts = self.config.max_attempts;

        for attempt in 0..attempts {
            match self.derive(rng, max_steps) {
                Some(word) => {
                    debug!(attempt, word = %word, "generated string");
                    return Ok(word);
                }
                None => debug!(attempt, max_steps, "abandoned derivation"),
            }
        }

        Err(GrammarError::GenerationExhausted {
            attempts,
            max_steps,
        })
    }

    /// One bounded derivation; `None` when it has to be abandoned
    fn derive<R: Rng>(&self, rng: &mut R, max_steps: usize) -> Option<String> {
        let mut form = vec![Element::NonTerminal(self.start_symbol.clone())];
        let mut steps = 0;

        while let Some((idx, non_terminal)) =
            form.iter().enumerate().find_map(|(idx, element)| match element {
                Element::NonTerminal(nt) => Some((idx, nt.clone())),
                Element::Terminal(_) => None,
            })
        {
            if steps > max_steps {
                return None;
            }
            steps += 1;

            let alternatives = self
                .alternatives
                .get(&non_terminal)
                .filter(|alternatives| !alternatives.is_empty())?;
            let chosen = self.choose(&non_terminal, alternatives, rng);

            trace!(step = steps, %non_terminal, %chosen, "rewrite");
            form.splice(idx..=idx, chosen.elements());
        }

        Some(form.iter().filter_map(Element::as_terminal).collect())
    }

    fn choose<'g, R: Rng>(
        &self,
        non_terminal: &str,
        alternatives: &'g [Production],
        rng: &mut R,
    ) -> &'g Production {
        match self.samplers.get(non_terminal) {
            Some(sampler) => &alternatives[sampler.sample(rng)],
            None => &alternatives[rng.gen_range(0..alternatives.len())],
        }
    }

    /// Convert the grammar into an equivalent NFA.
    ///
    /// Each non-terminal becomes a state and one fresh accepting state is
    /// added. `A -> t` becomes `A --t--> final` and `A -> tB` becomes
    /// `A --t--> B`.
    pub fn to_automaton(&self) -> FiniteAutomaton {
        let final_state = self.final_state_name();

        let mut states = self.nonterminals.clone();
        states.insert(final_state.clone());

        let mut delta = Delta::new();
        for (from, alternatives) in &self.alternatives {
            for production in alternatives {
                let to = production.next.as_ref().unwrap_or(&final_state);

                delta
                    .entry(from.clone())
                    .or_insert_with(IndexMap::new)
                    .entry(production.terminal)
                    .or_insert_with(IndexSet::new)
                    .insert(to.clone());
            }
        }

        debug!(
            states = states.len(),
            final_state = %final_state,
            "converted grammar to finite automaton"
        );

        FiniteAutomaton::from_validated_parts(
            states,
            self.terminals.clone(),
            delta,
            self.start_symbol.clone(),
            IndexSet::from([final_state]),
        )
    }

    fn final_state_name(&self) -> String {
        let mut name = FINAL_STATE.to_string();
        while self.nonterminals.contains(&name) {
            name.insert(0, '_');
        }
        name
    }

    /// Get the declared non-terminals, in declaration order
    pub fn nonterminals(&self) -> &IndexSet<String> {
        &self.nonterminals
    }

    /// Get the terminal alphabet
    pub fn terminals(&self) -> &IndexSet<char> {
        &self.terminals
    }

    /// Right-hand sides as written, keyed by left-hand side
    pub fn productions(&self) -> &IndexMap<String, Vec<String>> {
        &self.productions
    }

    /// Parsed alternatives of one non-terminal; empty if it has none
    pub fn productions_of(&self, non_terminal: &str) -> &[Production] {
        self.alternatives
            .get(non_terminal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get the start symbol
    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    /// Get the selection weights
    pub fn weights(&self) -> &ProductionWeights {
        &self.weights
    }

    /// Get a reference to the generation configuration
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

// Samplers and parsed alternatives are derived from the other fields
impl PartialEq for Grammar {
    fn eq(&self, other: &Self) -> bool {
        self.nonterminals == other.nonterminals
            && self.terminals == other.terminals
            && self.productions == other.productions
            && self.start_symbol == other.start_symbol
            && self.weights == other.weights
            && self.config == other.config
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonterminals = self
            .nonterminals
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let terminals = self
            .terminals
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        writeln!(
            f,
            "G = ({{{}}}, {{{}}}, P, {})",
            nonterminals, terminals, self.start_symbol
        )?;
        writeln!(f, "P = {{")?;
        for (lhs, rhs) in &self.productions {
            writeln!(f, "  {} → {}", lhs, rhs.join(" | "))?;
        }
        writeln!(f, "}}")
    }
}

/// Builder for constructing Grammar instances
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    nonterminals: Vec<String>,
    terminals: Vec<char>,
    productions: IndexMap<String, Vec<String>>,
    start_symbol: String,
    weights: ProductionWeights,
    config: GenerationConfig,
}

impl GrammarBuilder {
    /// Create a new grammar builder with default config
    pub fn new(start_symbol: &str) -> Self {
        GrammarBuilder {
            nonterminals: Vec::new(),
            terminals: Vec::new(),
            productions: IndexMap::new(),
            start_symbol: start_symbol.to_string(),
            weights: ProductionWeights::new(),
            config: GenerationConfig::default(),
        }
    }

    /// Declare a non-terminal
    pub fn nonterminal(mut self, name: &str) -> Self {
        self.nonterminals.push(name.to_string());
        self
    }

    /// Declare every non-whitespace character of `symbols` as a terminal
    pub fn terminals(mut self, symbols: &str) -> Self {
        self.terminals
            .extend(symbols.chars().filter(|c| !c.is_whitespace()));
        self
    }

    /// Declare a single terminal, whitespace included
    pub fn terminal(mut self, symbol: char) -> Self {
        self.terminals.push(symbol);
        self
    }

    /// Add one alternative for `lhs`
    pub fn production(mut self, lhs: &str, rhs: &str) -> Self {
        self.productions
            .entry(lhs.to_string())
            .or_default()
            .push(rhs.to_string());
        self
    }

    /// Add several alternatives for `lhs`
    pub fn productions(self, lhs: &str, rhs: &[&str]) -> Self {
        rhs.iter()
            .fold(self, |builder, rhs| builder.production(lhs, rhs))
    }

    /// Give `lhs -> rhs` a selection weight
    pub fn weight(mut self, lhs: &str, rhs: &str, weight: u32) -> Self {
        self.weights.set(lhs, rhs, weight);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the grammar
    pub fn build(self) -> Result<Grammar> {
        Grammar::new(
            self.nonterminals,
            self.terminals,
            self.productions,
            &self.start_symbol,
        )?
        .with_config(self.config)
        .with_weights(self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn reference_builder() -> GrammarBuilder {
        GrammarBuilder::new("S")
            .nonterminal("S")
            .nonterminal("B")
            .nonterminal("C")
            .terminals("abc")
            .production("S", "aB")
            .productions("B", &["aC", "bB"])
            .productions("C", &["bB", "c", "aS"])
    }

    fn targets(automaton: &FiniteAutomaton, state: &str, symbol: char) -> Vec<String> {
        automaton
            .transitions_from(state, symbol)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_builder_matches_new() {
        let built = reference_builder().build().unwrap();
        let direct = Grammar::new(
            ["S", "B", "C"],
            ['a', 'b', 'c'],
            [
                ("S", vec!["aB"]),
                ("B", vec!["aC", "bB"]),
                ("C", vec!["bB", "c", "aS"]),
            ],
            "S",
        )
        .unwrap();

        assert_eq!(built, direct);
        assert_eq!(built.productions_of("C").len(), 3);
        assert_eq!(
            built.productions_of("B")[0],
            Production {
                terminal: 'a',
                next: Some("C".to_string())
            }
        );
        assert!(built.productions_of("X").is_empty());
    }

    #[test]
    fn test_productions_with_same_lhs_are_merged() {
        let grammar = Grammar::new(
            ["S"],
            ['a', 'b'],
            [("S", vec!["aS"]), ("S", vec!["b"])],
            "S",
        )
        .unwrap();
        assert_eq!(grammar.productions()["S"], vec!["aS", "b"]);
    }

    #[test]
    fn test_invalid_start_symbol() {
        let result = GrammarBuilder::new("X")
            .nonterminal("S")
            .terminals("a")
            .production("S", "a")
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("Start symbol")));
    }

    #[test]
    fn test_invalid_lhs() {
        let result = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("a")
            .production("S", "a")
            .production("Q", "a")
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("LHS")));
    }

    #[test]
    fn test_invalid_rhs() {
        let cases = [
            ("", "Empty production"),
            ("S", "start with a terminal"),
            ("x", "start with a terminal"),
            ("aQ", "not declared"),
            ("aSa", "length 1 or 2"),
            ("aa", "not declared"),
        ];

        for (rhs, expected) in cases {
            let result = GrammarBuilder::new("S")
                .nonterminal("S")
                .terminals("a")
                .production("S", rhs)
                .build();
            match result {
                Err(GrammarError::InvalidGrammar(msg)) => {
                    assert!(msg.contains(expected), "{:?}: {}", rhs, msg)
                }
                other => panic!("{:?} should be rejected, got {:?}", rhs, other),
            }
        }
    }

    #[test]
    fn test_terminal_and_nonterminal_must_not_overlap() {
        let result = GrammarBuilder::new("S")
            .nonterminal("S")
            .nonterminal("a")
            .terminals("a")
            .production("S", "a")
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("both")));
    }

    #[test]
    fn test_invalid_weights() {
        let unknown_lhs = reference_builder().weight("X", "c", 3).build();
        assert!(matches!(unknown_lhs, Err(GrammarError::InvalidGrammar(_))));

        let unknown_rhs = reference_builder().weight("C", "cc", 3).build();
        assert!(matches!(unknown_rhs, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("cc")));

        let zero = reference_builder().weight("C", "c", 0).build();
        assert!(matches!(zero, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("positive")));
    }

    #[test]
    fn test_weights_that_overflow_are_rejected() {
        let result = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("ab")
            .productions("S", &["a", "b"])
            .weight("S", "a", u32::MAX)
            .weight("S", "b", 1)
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidGrammar(msg)) if msg.contains("overflow")));

        // Unweighted alternatives count 1 towards the sum too
        let result = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("ab")
            .productions("S", &["a", "b"])
            .weight("S", "a", u32::MAX)
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidGrammar(_))));

        let at_limit = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("ab")
            .productions("S", &["a", "b"])
            .weight("S", "a", u32::MAX - 1)
            .build();
        assert!(at_limit.is_ok());
    }

    #[test]
    fn test_builder_terminals() {
        let spaced = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("a b\tc")
            .production("S", "a")
            .build()
            .unwrap();
        assert_eq!(
            spaced.terminals().iter().copied().collect::<Vec<_>>(),
            vec!['a', 'b', 'c']
        );

        let with_space = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminal('a')
            .terminal(' ')
            .productions("S", &[" S", "a"])
            .build()
            .unwrap();
        assert!(with_space.terminals().contains(&' '));
        assert!(with_space.to_automaton().accepts("  a"));
    }

    #[test]
    fn test_to_automaton_reference_grammar() {
        let automaton = reference_builder().build().unwrap().to_automaton();

        assert_eq!(
            automaton.states().iter().collect::<Vec<_>>(),
            vec!["S", "B", "C", "FINAL"]
        );
        assert_eq!(
            automaton.alphabet().iter().copied().collect::<Vec<_>>(),
            vec!['a', 'b', 'c']
        );
        assert_eq!(automaton.start_state(), "S");
        assert_eq!(
            automaton.accepting_states().iter().collect::<Vec<_>>(),
            vec!["FINAL"]
        );

        assert_eq!(targets(&automaton, "S", 'a'), vec!["B"]);
        assert_eq!(targets(&automaton, "B", 'a'), vec!["C"]);
        assert_eq!(targets(&automaton, "B", 'b'), vec!["B"]);
        assert_eq!(targets(&automaton, "C", 'b'), vec!["B"]);
        assert_eq!(targets(&automaton, "C", 'c'), vec!["FINAL"]);
        assert_eq!(targets(&automaton, "C", 'a'), vec!["S"]);
        assert!(targets(&automaton, "S", 'b').is_empty());
        assert!(targets(&automaton, "FINAL", 'a').is_empty());
    }

    #[test]
    fn test_to_automaton_keeps_nondeterminism() {
        let grammar = GrammarBuilder::new("S")
            .nonterminal("S")
            .nonterminal("A")
            .terminals("ab")
            .productions("S", &["aS", "aA", "a"])
            .production("A", "b")
            .build()
            .unwrap();
        let automaton = grammar.to_automaton();

        assert_eq!(targets(&automaton, "S", 'a'), vec!["S", "A", "FINAL"]);
        assert!(!automaton.is_deterministic());
        assert!(automaton.accepts("aaab"));
        assert!(automaton.accepts("aaa"));
        assert!(!automaton.accepts("ab b"));
    }

    #[test]
    fn test_final_state_name_is_fresh() {
        let grammar = GrammarBuilder::new("FINAL")
            .nonterminal("FINAL")
            .nonterminal("_FINAL")
            .terminals("x")
            .production("FINAL", "x")
            .build()
            .unwrap();
        let automaton = grammar.to_automaton();

        assert_eq!(
            automaton.accepting_states().iter().collect::<Vec<_>>(),
            vec!["__FINAL"]
        );
        assert!(automaton.accepts("x"));
        assert!(!automaton.accepts(""));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let grammar = reference_builder().weight("C", "c", 3).build().unwrap();

        let first: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(23);
            (0..20)
                .map(|_| grammar.generate_string_with_rng(&mut rng, 30).unwrap())
                .collect()
        };
        let second: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(23);
            (0..20)
                .map(|_| grammar.generate_string_with_rng(&mut rng, 30).unwrap())
                .collect()
        };

        assert_eq!(first, second);
    }

    #[test]
    fn test_generated_strings_are_terminal() {
        let grammar = reference_builder().build().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let word = grammar.generate_string_with_rng(&mut rng, 30).unwrap();
            assert!(word.starts_with('a'));
            assert!(word.ends_with('c'));
            assert!(word.chars().all(|c| grammar.terminals().contains(&c)));
        }
    }

    #[test]
    fn test_generation_exhausted() {
        // S -> aS never terminates
        let grammar = GrammarBuilder::new("S")
            .nonterminal("S")
            .terminals("a")
            .production("S", "aS")
            .config(GenerationConfig {
                max_steps: 5,
                max_attempts: 3,
            })
            .build()
            .unwrap();

        match grammar.generate_string() {
            Err(GrammarError::GenerationExhausted {
                attempts,
                max_steps,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(max_steps, 5);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_nonterminal_without_productions_exhausts() {
        let grammar = GrammarBuilder::new("S")
            .nonterminal("S")
            .nonterminal("D")
            .terminals("a")
            .production("S", "aD")
            .build()
            .unwrap();

        assert!(matches!(
            grammar.generate_string(),
            Err(GrammarError::GenerationExhausted { attempts: 50, .. })
        ));
    }

    #[test]
    fn test_step_limit_counts_rewrites() {
        // Exactly three rewrites: S -> aA -> abB -> abc
        let grammar = GrammarBuilder::new("S")
            .nonterminal("S")
            .nonterminal("A")
            .nonterminal("B")
            .terminals("abc")
            .production("S", "aA")
            .production("A", "bB")
            .production("B", "c")
            .build()
            .unwrap();

        assert_eq!(grammar.generate_string_with_max_steps(2).unwrap(), "abc");
        assert!(matches!(
            grammar.generate_string_with_max_steps(1),
            Err(GrammarError::GenerationExhausted { .. })
        ));
    }

    #[test]
    fn test_weighted_choice_frequencies() {
        let grammar = reference_builder().weight("C", "c", 3).build().unwrap();
        let alternatives = grammar.productions_of("C");
        let mut rng = StdRng::seed_from_u64(2024);
        let mut counts: IndexMap<String, u32> = IndexMap::new();

        for _ in 0..50_000 {
            let chosen = grammar.choose("C", alternatives, &mut rng);
            *counts.entry(chosen.to_string()).or_default() += 1;
        }

        let weighted = f64::from(counts["c"]);
        for other in ["bB", "aS"] {
            let ratio = weighted / f64::from(counts[other]);
            assert!((2.7..3.3).contains(&ratio), "c/{} ratio was {}", other, ratio);
        }
    }

    #[test]
    fn test_unweighted_choice_is_uniform() {
        let grammar = reference_builder().build().unwrap();
        let alternatives = grammar.productions_of("C");
        let mut rng = StdRng::seed_from_u64(99);
        let mut counts: IndexMap<String, u32> = IndexMap::new();

        for _ in 0..30_000 {
            let chosen = grammar.choose("C", alternatives, &mut rng);
            *counts.entry(chosen.to_string()).or_default() += 1;
        }

        for count in counts.values() {
            assert!((9_000..11_000).contains(count), "{:?}", counts);
        }
    }

    #[test]
    fn test_weights_accessors() {
        let weights = ProductionWeights::new().with("C", "c", 3);
        assert_eq!(weights.weight_of("C", "c"), 3);
        assert_eq!(weights.weight_of("C", "bB"), 1);
        assert_eq!(weights.weight_of("B", "aC"), 1);
        assert!(weights.is_weighted("C"));
        assert!(!weights.is_weighted("B"));
        assert_eq!(weights.iter().collect::<Vec<_>>(), vec![("C", "c", 3)]);
    }

    #[test]
    fn test_display() {
        let text = reference_builder().build().unwrap().to_string();
        let expected = "\
G = ({S, B, C}, {a, b, c}, P, S)
P = {
  S → aB
  B → aC | bB
  C → bB | c | aS
}
";
        assert_eq!(text, expected);
    }
}
