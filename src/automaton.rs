use std::fmt;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::utils::{GrammarError, Result};

/// Transition relation of a finite automaton: state -> symbol -> target states
pub type Delta = IndexMap<String, IndexMap<char, IndexSet<String>>>;

/// A nondeterministic finite automaton over single-character symbols.
///
/// All five components are fixed at construction time and only exposed
/// through shared references, so an automaton can be handed out freely and
/// queried from several threads at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiniteAutomaton {
    /// Q, in insertion order
    states: IndexSet<String>,
    /// Σ
    alphabet: IndexSet<char>,
    /// δ
    delta: Delta,
    /// q0
    start_state: String,
    /// F
    accepting_states: IndexSet<String>,
}

impl FiniteAutomaton {
    /// Build an automaton from its five components.
    ///
    /// Fails with [`GrammarError::InvalidAutomaton`] if the start state, an
    /// accepting state, or a transition source or target is not a declared
    /// state, or if a transition uses a symbol outside the alphabet.
    pub fn new<Q, S, F>(
        states: Q,
        alphabet: S,
        delta: Delta,
        start_state: impl Into<String>,
        accepting_states: F,
    ) -> Result<Self>
    where
        Q: IntoIterator,
        Q::Item: Into<String>,
        S: IntoIterator<Item = char>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let automaton = FiniteAutomaton {
            states: states.into_iter().map(Into::into).collect(),
            alphabet: alphabet.into_iter().collect(),
            delta,
            start_state: start_state.into(),
            accepting_states: accepting_states.into_iter().map(Into::into).collect(),
        };

        automaton.validate()?;

        debug!(
            states = automaton.states.len(),
            symbols = automaton.alphabet.len(),
            start = %automaton.start_state,
            "built finite automaton"
        );

        Ok(automaton)
    }

    /// Assemble an automaton whose components are already known to be consistent
    pub(crate) fn from_validated_parts(
        states: IndexSet<String>,
        alphabet: IndexSet<char>,
        delta: Delta,
        start_state: String,
        accepting_states: IndexSet<String>,
    ) -> Self {
        let automaton = FiniteAutomaton {
            states,
            alphabet,
            delta,
            start_state,
            accepting_states,
        };
        debug_assert!(automaton.validate().is_ok());
        automaton
    }

    /// Build an automaton from a list of transitions.
    ///
    /// States are collected in the order they are first mentioned (start
    /// state, accepting states, then transition sources and targets) and the
    /// alphabet is made of the symbols the transitions use.
    pub fn from_definition(
        start_state: &str,
        accepting_states: &[&str],
        transitions: &[(&str, char, &[&str])],
    ) -> Result<Self> {
        let mut states = IndexSet::new();
        let mut alphabet = IndexSet::new();
        let mut delta = Delta::new();

        states.insert(start_state.to_string());
        states.extend(accepting_states.iter().map(|s| s.to_string()));

        for &(from, symbol, targets) in transitions {
            states.insert(from.to_string());
            alphabet.insert(symbol);

            let entry = delta
                .entry(from.to_string())
                .or_insert_with(IndexMap::new)
                .entry(symbol)
                .or_insert_with(IndexSet::new);

            for &to in targets {
                states.insert(to.to_string());
                entry.insert(to.to_string());
            }
        }

        Self::new(
            states,
            alphabet,
            delta,
            start_state,
            accepting_states.iter().copied(),
        )
    }

    fn validate(&self) -> Result<()> {
        if !self.states.contains(&self.start_state) {
            return Err(GrammarError::InvalidAutomaton(format!(
                "start state {} is not a declared state",
                self.start_state
            )));
        }

        if let Some(state) = self
            .accepting_states
            .iter()
            .find(|state| !self.states.contains(*state))
        {
            return Err(GrammarError::InvalidAutomaton(format!(
                "accepting state {} is not a declared state",
                state
            )));
        }

        for (from, transitions) in &self.delta {
            if !self.states.contains(from) {
                return Err(GrammarError::InvalidAutomaton(format!(
                    "transition from unknown state {}",
                    from
                )));
            }

            for (symbol, targets) in transitions {
                if !self.alphabet.contains(symbol) {
                    return Err(GrammarError::InvalidAutomaton(format!(
                        "transition {} --{}--> uses a symbol outside the alphabet",
                        from, symbol
                    )));
                }

                if let Some(to) = targets.iter().find(|to| !self.states.contains(*to)) {
                    return Err(GrammarError::InvalidAutomaton(format!(
                        "transition {} --{}--> leads to unknown state {}",
                        from, symbol, to
                    )));
                }
            }
        }

        Ok(())
    }

    /// Decide whether the automaton accepts `input`.
    ///
    /// Runs a subset simulation: the set of active states starts as
    /// `{q0}` and is replaced, symbol by symbol, by the union of the
    /// successors of every active state. A symbol outside the alphabet or an
    /// empty active set rejects on the spot.
    pub fn accepts(&self, input: &str) -> bool {
        let mut active: IndexSet<&str> = IndexSet::from([self.start_state.as_str()]);

        for (position, symbol) in input.chars().enumerate() {
            if !self.alphabet.contains(&symbol) {
                trace!(position, %symbol, "symbol outside the alphabet");
                return false;
            }

            active = active
                .iter()
                .filter_map(|state| self.transitions_from(state, symbol))
                .flatten()
                .map(String::as_str)
                .collect();

            trace!(position, %symbol, ?active, "advanced active states");

            if active.is_empty() {
                return false;
            }
        }

        active
            .iter()
            .any(|state| self.accepting_states.contains(*state))
    }

    /// Like [`FiniteAutomaton::accepts`], rejecting absent input
    pub fn accepts_opt(&self, input: Option<&str>) -> bool {
        input.is_some_and(|input| self.accepts(input))
    }

    /// Targets of `state` on `symbol`, if the automaton has any
    pub fn transitions_from(&self, state: &str, symbol: char) -> Option<&IndexSet<String>> {
        self.delta
            .get(state)
            .and_then(|transitions| transitions.get(&symbol))
    }

    /// Whether every (state, symbol) pair has at most one target
    pub fn is_deterministic(&self) -> bool {
        self.delta
            .values()
            .flat_map(|transitions| transitions.values())
            .all(|targets| targets.len() <= 1)
    }

    /// Get Q, in insertion order
    pub fn states(&self) -> &IndexSet<String> {
        &self.states
    }

    /// Get Σ
    pub fn alphabet(&self) -> &IndexSet<char> {
        &self.alphabet
    }

    /// Get the transition relation δ
    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// Get the start state q0
    pub fn start_state(&self) -> &str {
        &self.start_state
    }

    /// Get the accepting states F
    pub fn accepting_states(&self) -> &IndexSet<String> {
        &self.accepting_states
    }

    /// Render δ as a Markdown table, one row per state and one column per symbol.
    ///
    /// The start state is prefixed with `→` and accepting states are suffixed
    /// with `*`. Empty cells mean there is no transition.
    pub fn transition_table(&self) -> String {
        let mut table = "|δ|".to_string();
        for symbol in &self.alphabet {
            table.push_str(&format!("{}|", symbol));
        }
        table.push('\n');

        table.push_str("|:---:|");
        for _ in &self.alphabet {
            table.push_str(":---:|");
        }
        table.push('\n');

        for state in &self.states {
            let prefix = if *state == self.start_state { "→" } else { "" };
            let suffix = if self.accepting_states.contains(state) {
                "*"
            } else {
                ""
            };
            table.push_str(&format!("|{}{}{}|", prefix, state, suffix));

            for &symbol in &self.alphabet {
                if let Some(targets) = self.transitions_from(state, symbol) {
                    table.push_str(&format!("{}|", format_set(targets)));
                } else {
                    table.push('|');
                }
            }
            table.push('\n');
        }

        table
    }
}

fn format_set<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    format!(
        "{{{}}}",
        items
            .into_iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

impl fmt::Display for FiniteAutomaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "M = (Q, Σ, δ, q0, F)")?;
        writeln!(f, "Q = {}", format_set(&self.states))?;
        writeln!(f, "Σ = {}", format_set(&self.alphabet))?;
        writeln!(f, "q0 = {}", self.start_state)?;
        writeln!(f, "F = {}", format_set(&self.accepting_states))?;
        for (from, transitions) in &self.delta {
            for (symbol, targets) in transitions {
                writeln!(f, "δ({}, {}) = {}", from, symbol, format_set(targets))?;
            }
        }
        Ok(())
    }
}
