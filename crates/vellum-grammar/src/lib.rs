//! Grammar interface and scope machinery.
//!
//! A grammar tokenizes one line at a time, threading an opaque [`RuleStack`]
//! across line boundaries and emitting an interleaved tag stream: positive
//! tags are span lengths in characters, negative odd tags open a scope,
//! negative even tags close one (see [`tags`]). Scope names are interned
//! per grammar into [`ScopeId`]s.
//!
//! Two grammar variants ship here: [`NullGrammar`], the degenerate
//! whole-line-is-root grammar, and [`DelimiterGrammar`], a small stateful
//! grammar built from delimiter pairs and keyword sets that is rich enough
//! to drive multi-line scope propagation.

mod classes;
mod delimiter;
mod grammar;
mod null;
mod rule_stack;
mod scope;
mod selector;
pub mod tags;

pub use classes::class_name_for_scope;
pub use delimiter::{DelimiterGrammar, DelimiterGrammarBuilder};
pub use grammar::{Grammar, LineTokens};
pub use null::{NULL_GRAMMAR_SCOPE, NullGrammar};
pub use rule_stack::{RuleFrame, RuleStack};
pub use scope::{ScopeId, ScopeRegistry};
pub use selector::ScopeSelector;
