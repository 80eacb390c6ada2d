use std::sync::Arc;

use vellum_primitives::Subscription;

use crate::RuleStack;

/// Result of tokenizing one line: the tag stream and the rule stack the
/// grammar carries into the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
	pub tags: Vec<i32>,
	pub rule_stack: RuleStack,
}

/// A line-at-a-time tokenizer with opaque cross-line state.
///
/// Implementations must treat `tokenize_line` as a pure function of
/// `(line, rule_stack, first_line)`: the incremental engine re-tokenizes
/// rows in arbitrary order and relies on identical inputs producing
/// identical outputs.
pub trait Grammar {
	/// Human-readable grammar name.
	fn name(&self) -> &str;

	/// Root scope name, e.g. `source.rs`.
	fn scope_name(&self) -> &str;

	/// Tokenizes one line. `rule_stack` is `None` only when the previous
	/// row has no cached stack; `first_line` is true for row zero, where
	/// grammars conventionally open their root scope.
	fn tokenize_line(
		&self,
		line: &str,
		rule_stack: Option<&RuleStack>,
		first_line: bool,
	) -> LineTokens;

	/// Interns `scope` and returns its scope-open tag.
	fn start_id_for_scope(&self, scope: &str) -> i32;

	/// Interns `scope` and returns its scope-close tag.
	fn end_id_for_scope(&self, scope: &str) -> i32;

	/// Resolves an open or close tag to its scope name.
	fn scope_for_id(&self, id: i32) -> Option<Arc<str>>;

	/// Registers a callback invoked when the grammar's rules change.
	/// Grammars with immutable rules return an empty subscription.
	fn on_did_update(&self, _callback: Box<dyn FnMut()>) -> Subscription {
		Subscription::empty()
	}

	/// True for the degenerate grammar that assigns every line a single
	/// root-scope span. The tokenization engine short-circuits under it.
	fn is_null(&self) -> bool {
		false
	}

	/// Whether `scope` marks comment text. The default treats any dotted
	/// component equal to `comment` as a comment scope.
	fn is_comment_scope(&self, scope: &str) -> bool {
		scope.split('.').any(|component| component == "comment")
	}
}
