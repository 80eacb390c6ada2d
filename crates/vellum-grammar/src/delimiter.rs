use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use vellum_primitives::{Emitter, Subscription};

use crate::{Grammar, LineTokens, RuleFrame, RuleStack, ScopeRegistry};

#[derive(Debug, Clone)]
enum RuleKind {
	/// Scope runs from `begin` to `end`, possibly across lines.
	Block { end: String },
	/// Scope runs from `begin` to the end of the line.
	Line,
}

#[derive(Debug, Clone)]
struct DelimiterRule {
	begin: String,
	kind: RuleKind,
	scope: String,
}

/// A small stateful grammar built from delimiter pairs and keyword sets.
///
/// Block rules push a frame onto the rule stack when their `begin` text is
/// seen and pop it at `end`, so an unterminated block carries its scope into
/// following lines through the returned [`RuleStack`]. Line rules scope the
/// rest of the line. Rules do not nest; the first `begin` match wins.
///
/// This is not a TextMate engine; it exists to exercise multi-line scope
/// propagation with realistic shapes (block comments, strings, keywords).
pub struct DelimiterGrammar {
	name: String,
	scope_name: String,
	rules: Vec<DelimiterRule>,
	keywords: RefCell<HashMap<String, String>>,
	registry: RefCell<ScopeRegistry>,
	updates: Emitter<()>,
}

/// Builder for [`DelimiterGrammar`].
pub struct DelimiterGrammarBuilder {
	name: String,
	scope_name: String,
	rules: Vec<DelimiterRule>,
	keywords: HashMap<String, String>,
}

impl DelimiterGrammarBuilder {
	/// Adds a block rule: `begin .. end` under `scope`, spanning lines when
	/// unterminated.
	pub fn block(mut self, begin: &str, end: &str, scope: &str) -> Self {
		self.rules.push(DelimiterRule {
			begin: begin.to_string(),
			kind: RuleKind::Block {
				end: end.to_string(),
			},
			scope: scope.to_string(),
		});
		self
	}

	/// Adds a to-end-of-line rule under `scope`.
	pub fn line(mut self, begin: &str, scope: &str) -> Self {
		self.rules.push(DelimiterRule {
			begin: begin.to_string(),
			kind: RuleKind::Line,
			scope: scope.to_string(),
		});
		self
	}

	/// Scopes the exact word `word` with `scope`.
	pub fn keyword(mut self, word: &str, scope: &str) -> Self {
		self.keywords.insert(word.to_string(), scope.to_string());
		self
	}

	pub fn build(self) -> DelimiterGrammar {
		let grammar = DelimiterGrammar {
			name: self.name,
			scope_name: self.scope_name,
			rules: self.rules,
			keywords: RefCell::new(self.keywords),
			registry: RefCell::new(ScopeRegistry::new()),
			updates: Emitter::new(),
		};
		grammar.registry.borrow_mut().intern(&grammar.scope_name);
		grammar
	}
}

impl DelimiterGrammar {
	pub fn builder(name: &str, scope_name: &str) -> DelimiterGrammarBuilder {
		DelimiterGrammarBuilder {
			name: name.to_string(),
			scope_name: scope_name.to_string(),
			rules: Vec::new(),
			keywords: HashMap::new(),
		}
	}

	/// Adds a keyword after construction and notifies update subscribers.
	pub fn add_keyword(&self, word: &str, scope: &str) {
		self.keywords
			.borrow_mut()
			.insert(word.to_string(), scope.to_string());
		tracing::debug!(grammar = %self.name, word, "grammar keywords updated");
		self.updates.emit(&());
	}

	fn active_block(&self, stack: &RuleStack) -> Option<&DelimiterRule> {
		let frame = stack.top()?;
		if frame.rule == 0 {
			return None;
		}
		let rule = self.rules.get((frame.rule - 1) as usize)?;
		matches!(rule.kind, RuleKind::Block { .. }).then_some(rule)
	}

	/// Earliest `begin` match in `text`; ties go to the first rule.
	fn first_begin(&self, text: &str) -> Option<(usize, usize)> {
		self.rules
			.iter()
			.enumerate()
			.filter_map(|(index, rule)| text.find(&rule.begin).map(|offset| (offset, index)))
			.min_by_key(|&(offset, _)| offset)
	}

	fn emit_words(
		&self,
		registry: &mut ScopeRegistry,
		segment: &str,
		tags: &mut Vec<i32>,
		pending: &mut i32,
	) {
		let keywords = self.keywords.borrow();
		let mut rest = segment;
		while !rest.is_empty() {
			let is_word = |c: char| c.is_alphanumeric() || c == '_';
			let first_word = rest.chars().next().map(is_word).unwrap_or(false);
			let run_len = rest
				.char_indices()
				.find(|&(_, c)| is_word(c) != first_word)
				.map(|(i, _)| i)
				.unwrap_or(rest.len());
			let (run, tail) = rest.split_at(run_len);
			if first_word && let Some(scope) = keywords.get(run) {
				flush(tags, pending);
				tags.push(registry.start_tag(scope));
				tags.push(run.chars().count() as i32);
				tags.push(registry.end_tag(scope));
			} else {
				*pending += run.chars().count() as i32;
			}
			rest = tail;
		}
	}
}

fn flush(tags: &mut Vec<i32>, pending: &mut i32) {
	if *pending > 0 {
		tags.push(*pending);
		*pending = 0;
	}
}

fn char_len(text: &str) -> i32 {
	text.chars().count() as i32
}

impl Grammar for DelimiterGrammar {
	fn name(&self) -> &str {
		&self.name
	}

	fn scope_name(&self) -> &str {
		&self.scope_name
	}

	fn tokenize_line(
		&self,
		line: &str,
		rule_stack: Option<&RuleStack>,
		_first_line: bool,
	) -> LineTokens {
		let mut registry = self.registry.borrow_mut();
		let mut tags: Vec<i32> = Vec::new();
		let mut pending: i32 = 0;

		let mut stack = match rule_stack {
			Some(stack) => stack.clone(),
			None => {
				// No inherited state: open the root scope here.
				let root = registry.intern(&self.scope_name);
				tags.push(registry.start_tag(&self.scope_name));
				RuleStack::root(RuleFrame::new(0, Some(root)))
			}
		};

		let mut pos = 0usize;
		while pos < line.len() {
			if let Some(rule) = self.active_block(&stack) {
				let RuleKind::Block { end } = &rule.kind else {
					unreachable!("active frame always refers to a block rule");
				};
				match line[pos..].find(end.as_str()) {
					Some(offset) => {
						let consumed = offset + end.len();
						pending += char_len(&line[pos..pos + consumed]);
						flush(&mut tags, &mut pending);
						tags.push(registry.end_tag(&rule.scope));
						stack = stack.pop();
						pos += consumed;
					}
					None => {
						pending += char_len(&line[pos..]);
						pos = line.len();
					}
				}
			} else {
				match self.first_begin(&line[pos..]) {
					Some((offset, rule_index)) => {
						let rule = &self.rules[rule_index];
						self.emit_words(
							&mut registry,
							&line[pos..pos + offset],
							&mut tags,
							&mut pending,
						);
						flush(&mut tags, &mut pending);
						tags.push(registry.start_tag(&rule.scope));
						match &rule.kind {
							RuleKind::Line => {
								pending = char_len(&line[pos + offset..]);
								flush(&mut tags, &mut pending);
								tags.push(registry.end_tag(&rule.scope));
								pos = line.len();
							}
							RuleKind::Block { .. } => {
								let scope = registry.intern(&rule.scope);
								pending = char_len(&rule.begin);
								stack = stack
									.push(RuleFrame::new(rule_index as u32 + 1, Some(scope)));
								pos += offset + rule.begin.len();
							}
						}
					}
					None => {
						self.emit_words(&mut registry, &line[pos..], &mut tags, &mut pending);
						pos = line.len();
					}
				}
			}
		}
		flush(&mut tags, &mut pending);

		LineTokens {
			tags,
			rule_stack: stack,
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

	fn on_did_update(&self, mut callback: Box<dyn FnMut()>) -> Subscription {
		self.updates.subscribe(move |()| callback())
	}
}
