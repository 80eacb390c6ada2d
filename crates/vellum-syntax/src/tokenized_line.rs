use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use vellum_grammar::{Grammar, RuleStack, tags};

/// One tokenized span: a column range and the open-tag stack scoping it,
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub start: u32,
	pub end: u32,
	pub scopes: Vec<i32>,
}

impl Token {
	pub fn len(&self) -> u32 {
		self.end - self.start
	}

	pub fn is_empty(&self) -> bool {
		self.start >= self.end
	}
}

/// Immutable per-row tokenization record.
///
/// Bundles the row's text with the grammar's tag stream, the rule stack
/// reached at end of line, and the scopes already open when the line
/// starts. Replaced wholesale on re-tokenization; placeholder lines (built
/// before background tokenization reaches a row) carry no rule stack.
pub struct TokenizedLine {
	text: String,
	line_ending: &'static str,
	tags: Vec<i32>,
	rule_stack: Option<RuleStack>,
	open_scopes: Vec<i32>,
	grammar: Rc<dyn Grammar>,
}

impl TokenizedLine {
	pub fn new(
		text: String,
		line_ending: &'static str,
		tags: Vec<i32>,
		rule_stack: Option<RuleStack>,
		open_scopes: Vec<i32>,
		grammar: Rc<dyn Grammar>,
	) -> Self {
		Self {
			text,
			line_ending,
			tags,
			rule_stack,
			open_scopes,
			grammar,
		}
	}

	/// Degenerate line: the whole text as one span bracketed by the
	/// grammar's root scope. Stands in for rows background tokenization
	/// has not reached, so queries always have something to read.
	pub fn placeholder(text: String, line_ending: &'static str, grammar: Rc<dyn Grammar>) -> Self {
		let root = grammar.scope_name().to_string();
		let open = grammar.start_id_for_scope(&root);
		let close = grammar.end_id_for_scope(&root);
		let length = text.chars().count() as i32;

		let mut line_tags = Vec::with_capacity(3);
		line_tags.push(open);
		if length > 0 {
			line_tags.push(length);
		}
		line_tags.push(close);

		Self::new(text, line_ending, line_tags, None, Vec::new(), grammar)
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn line_ending(&self) -> &'static str {
		self.line_ending
	}

	pub fn tags(&self) -> &[i32] {
		&self.tags
	}

	/// The grammar continuation at end of line; `None` for placeholders.
	pub fn rule_stack(&self) -> Option<&RuleStack> {
		self.rule_stack.as_ref()
	}

	/// Open tags active at the start of this line, outermost first.
	pub fn open_scopes(&self) -> &[i32] {
		&self.open_scopes
	}

	pub fn grammar(&self) -> &Rc<dyn Grammar> {
		&self.grammar
	}

	/// Iterates the line's spans in column order.
	pub fn tokens(&self) -> Tokens<'_> {
		Tokens {
			tags: &self.tags,
			index: 0,
			column: 0,
			scopes: self.open_scopes.clone(),
		}
	}

	/// The token covering `column`, if any span reaches past it.
	pub fn token_at_buffer_column(&self, column: u32) -> Option<Token> {
		self.tokens().find(|token| token.end > column)
	}

	/// Start column of the token covering `column`.
	pub fn token_start_column_for_buffer_column(&self, column: u32) -> Option<u32> {
		self.token_at_buffer_column(column).map(|token| token.start)
	}

	/// True when the first non-whitespace token is scoped as a comment by
	/// this line's grammar.
	pub fn is_comment(&self) -> bool {
		for token in self.tokens() {
			let blank = self
				.text
				.chars()
				.skip(token.start as usize)
				.take(token.len() as usize)
				.all(char::is_whitespace);
			if blank {
				continue;
			}
			return token.scopes.iter().any(|&tag| {
				self.grammar
					.scope_for_id(tag)
					.is_some_and(|scope| self.grammar.is_comment_scope(&scope))
			});
		}
		false
	}

	/// Resolves open tags to scope names through this line's grammar,
	/// dropping tags the grammar no longer knows.
	pub fn scope_names(&self, scopes: &[i32]) -> Vec<Arc<str>> {
		scopes
			.iter()
			.filter_map(|&tag| self.grammar.scope_for_id(tag))
			.collect()
	}
}

impl fmt::Debug for TokenizedLine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenizedLine")
			.field("text", &self.text)
			.field("tags", &self.tags)
			.field("open_scopes", &self.open_scopes)
			.field("placeholder", &self.rule_stack.is_none())
			.finish()
	}
}

/// Iterator over a line's spans. Scope-close tags that underflow the stack
/// are ignored here; the folder reports them when the line is built.
pub struct Tokens<'a> {
	tags: &'a [i32],
	index: usize,
	column: u32,
	scopes: Vec<i32>,
}

impl Iterator for Tokens<'_> {
	type Item = Token;

	fn next(&mut self) -> Option<Token> {
		while self.index < self.tags.len() {
			let tag = self.tags[self.index];
			self.index += 1;
			if tags::is_open(tag) {
				self.scopes.push(tag);
			} else if tags::is_close(tag) {
				let open = tags::open_for_close(tag);
				while let Some(top) = self.scopes.pop() {
					if top == open {
						break;
					}
				}
			} else if tag > 0 {
				let token = Token {
					start: self.column,
					end: self.column + tag as u32,
					scopes: self.scopes.clone(),
				};
				self.column = token.end;
				return Some(token);
			}
		}
		None
	}
}
