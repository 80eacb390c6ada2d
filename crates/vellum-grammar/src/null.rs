use std::cell::RefCell;
use std::sync::Arc;

use crate::{Grammar, LineTokens, RuleFrame, RuleStack, ScopeRegistry};

/// Root scope assigned by the null grammar.
pub const NULL_GRAMMAR_SCOPE: &str = "text.plain.null-grammar";

/// The degenerate grammar: every line is one root-scope span and the rule
/// stack never changes. Buffers without a real grammar run under this, and
/// the engine marks them fully tokenized without doing background work.
pub struct NullGrammar {
	registry: RefCell<ScopeRegistry>,
}

impl NullGrammar {
	pub fn new() -> Self {
		let grammar = Self {
			registry: RefCell::new(ScopeRegistry::new()),
		};
		grammar.registry.borrow_mut().intern(NULL_GRAMMAR_SCOPE);
		grammar
	}
}

impl Default for NullGrammar {
	fn default() -> Self {
		Self::new()
	}
}

impl Grammar for NullGrammar {
	fn name(&self) -> &str {
		"Null Grammar"
	}

	fn scope_name(&self) -> &str {
		NULL_GRAMMAR_SCOPE
	}

	fn tokenize_line(
		&self,
		line: &str,
		_rule_stack: Option<&RuleStack>,
		_first_line: bool,
	) -> LineTokens {
		let mut registry = self.registry.borrow_mut();
		let open = registry.start_tag(NULL_GRAMMAR_SCOPE);
		let close = registry.end_tag(NULL_GRAMMAR_SCOPE);
		let root = registry.intern(NULL_GRAMMAR_SCOPE);

		let length = line.chars().count() as i32;
		let mut tags = Vec::with_capacity(3);
		tags.push(open);
		if length > 0 {
			tags.push(length);
		}
		tags.push(close);

		LineTokens {
			tags,
			rule_stack: RuleStack::root(RuleFrame::new(0, Some(root))),
		}
	}

	fn start_id_for_scope(&self, scope: &str) -> i32 {
		self.registry.borrow_mut().start_tag(scope)
	}

	fn end_id_for_scope(&self, scope: &str) -> i32 {
		self.registry.borrow_mut().end_tag(scope)
	}

	fn scope_for_id(&self, id: i32) -> Option<Arc<str>> {
		self.registry.borrow().name_for_tag(id)
	}

	fn is_null(&self) -> bool {
		true
	}
}
