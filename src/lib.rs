//! Right-linear grammars and the finite automata they describe.
//!
//! A [`Grammar`] holds productions of the form `A -> a` or `A -> aB`. It can
//! generate random sentences of its language and convert itself into a
//! nondeterministic [`FiniteAutomaton`], which decides membership by
//! tracking every state it could be in at once.
//!
//! # Example
//!
//! ```rust
//! use regular_grammar::GrammarBuilder;
//!
//! let grammar = GrammarBuilder::new("S")
//!     .nonterminal("S")
//!     .nonterminal("B")
//!     .nonterminal("C")
//!     .terminals("abc")
//!     .production("S", "aB")
//!     .productions("B", &["aC", "bB"])
//!     .productions("C", &["bB", "c", "aS"])
//!     .weight("C", "c", 3)
//!     .build()
//!     .unwrap();
//!
//! let automaton = grammar.to_automaton();
//! assert!(automaton.accepts("abac"));
//! assert!(!automaton.accepts("aba"));
//!
//! let word = grammar.generate_string().unwrap();
//! assert!(automaton.accepts(&word));
//! ```

pub mod automaton;
pub mod definition;
pub mod grammar;
pub mod utils;

pub use automaton::{Delta, FiniteAutomaton};
pub use definition::{GrammarDefinition, load_grammar};
pub use grammar::{
    Element, FINAL_STATE, GenerationConfig, Grammar, GrammarBuilder, Production,
    ProductionWeights,
};
pub use utils::{GrammarError, Result};
