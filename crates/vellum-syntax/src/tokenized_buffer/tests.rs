use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use vellum_buffer::TextBuffer;
use vellum_grammar::{
	DelimiterGrammar, Grammar, LineTokens, RuleFrame, RuleStack, ScopeRegistry,
};
use vellum_primitives::{Point, Range};

use super::*;
use crate::fold::scopes_from_tags;
use crate::report::{AssertionMetadata, AssertionReporter};

fn buffer_of(lines: &[&str]) -> Rc<RefCell<TextBuffer>> {
	Rc::new(RefCell::new(TextBuffer::from_lines(lines)))
}

fn comment_grammar() -> Rc<DelimiterGrammar> {
	Rc::new(
		DelimiterGrammar::builder("Demo", "source.demo")
			.block("/*", "*/", "comment.block.demo")
			.line("//", "comment.line.demo")
			.keyword("fn", "keyword.control.demo")
			.build(),
	)
}

fn visible_layer(
	buffer: &Rc<RefCell<TextBuffer>>,
	grammar: Rc<dyn Grammar>,
) -> TokenizedBuffer {
	let mut layer = TokenizedBuffer::new(buffer.clone(), TokenizedBufferOptions::default());
	layer.set_grammar(grammar);
	layer.set_visible(true);
	layer
}

/// Pumps deferred work to completion; returns the number of ticks taken.
fn drain(layer: &mut TokenizedBuffer) -> u32 {
	let mut ticks = 0;
	while layer.has_deferred_work() {
		layer.tick();
		ticks += 1;
		assert!(ticks < 10_000, "tokenization failed to reach a fixed point");
	}
	ticks
}

fn edit(
	buffer: &Rc<RefCell<TextBuffer>>,
	layer: &mut TokenizedBuffer,
	range: Range,
	text: &str,
) {
	let change = buffer.borrow_mut().set_text_in_range(range, text);
	layer.buffer_did_change(&change);
}

fn range(start: (u32, u32), end: (u32, u32)) -> Range {
	Range::new(Point::new(start.0, start.1), Point::new(end.0, end.1))
}

/// Forwards to an inner grammar while recording every tokenized line, so
/// tests can assert which rows were rebuilt.
struct RecordingGrammar {
	inner: Rc<dyn Grammar>,
	lines: RefCell<Vec<String>>,
}

impl RecordingGrammar {
	fn new(inner: Rc<dyn Grammar>) -> Rc<Self> {
		Rc::new(Self {
			inner,
			lines: RefCell::new(Vec::new()),
		})
	}

	fn tokenized_lines(&self) -> Vec<String> {
		self.lines.borrow().clone()
	}

	fn reset(&self) {
		self.lines.borrow_mut().clear();
	}
}

impl Grammar for RecordingGrammar {
	fn name(&self) -> &str {
		self.inner.name()
	}

	fn scope_name(&self) -> &str {
		self.inner.scope_name()
	}

	fn tokenize_line(
		&self,
		line: &str,
		rule_stack: Option<&RuleStack>,
		first_line: bool,
	) -> LineTokens {
		self.lines.borrow_mut().push(line.to_string());
		self.inner.tokenize_line(line, rule_stack, first_line)
	}

	fn start_id_for_scope(&self, scope: &str) -> i32 {
		self.inner.start_id_for_scope(scope)
	}

	fn end_id_for_scope(&self, scope: &str) -> i32 {
		self.inner.end_id_for_scope(scope)
	}

	fn scope_for_id(&self, id: i32) -> Option<Arc<str>> {
		self.inner.scope_for_id(id)
	}
}

/// Emits a fixed nested tag stream for every line: `A(3 B(4) 2)`.
struct NestedScopesGrammar {
	registry: RefCell<ScopeRegistry>,
}

impl NestedScopesGrammar {
	fn new() -> Rc<Self> {
		Rc::new(Self {
			registry: RefCell::new(ScopeRegistry::new()),
		})
	}
}

impl Grammar for NestedScopesGrammar {
	fn name(&self) -> &str {
		"Nested"
	}

	fn scope_name(&self) -> &str {
		"source.nested"
	}

	fn tokenize_line(
		&self,
		_line: &str,
		_rule_stack: Option<&RuleStack>,
		_first_line: bool,
	) -> LineTokens {
		let mut registry = self.registry.borrow_mut();
		let tags = vec![
			registry.start_tag("A"),
			3,
			registry.start_tag("B"),
			4,
			registry.end_tag("B"),
			2,
			registry.end_tag("A"),
		];
		LineTokens {
			tags,
			rule_stack: RuleStack::root(RuleFrame::new(0, None)),
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
}

/// Closes a scope that was never opened, corrupting every line.
struct UnbalancedGrammar {
	registry: RefCell<ScopeRegistry>,
}

impl UnbalancedGrammar {
	fn new() -> Rc<Self> {
		Rc::new(Self {
			registry: RefCell::new(ScopeRegistry::new()),
		})
	}
}

impl Grammar for UnbalancedGrammar {
	fn name(&self) -> &str {
		"Unbalanced"
	}

	fn scope_name(&self) -> &str {
		"source.unbalanced"
	}

	fn tokenize_line(
		&self,
		line: &str,
		_rule_stack: Option<&RuleStack>,
		_first_line: bool,
	) -> LineTokens {
		let mut registry = self.registry.borrow_mut();
		let close = registry.end_tag("broken.scope");
		let length = line.chars().count() as i32;
		let mut tags = Vec::new();
		if length > 0 {
			tags.push(length);
		}
		tags.push(close);
		LineTokens {
			tags,
			rule_stack: RuleStack::root(RuleFrame::new(0, None)),
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
}

#[derive(Default)]
struct CapturingReporter {
	reports: RefCell<Vec<(String, Option<String>, Option<std::path::PathBuf>)>>,
}

impl AssertionReporter for CapturingReporter {
	fn assertion_failed(&self, message: &str, metadata: &AssertionMetadata) {
		self.reports.borrow_mut().push((
			message.to_string(),
			metadata.unmatched_scope.as_deref().map(str::to_string),
			metadata.buffer_path.clone(),
		));
	}
}

fn scope_names(layer: &mut TokenizedBuffer, row: u32) -> Vec<Vec<String>> {
	let line = layer.tokenized_line_for_row(row).expect("row in range");
	let grammar = line.grammar().clone();
	line.tokens()
		.map(|token| {
			token
				.scopes
				.iter()
				.filter_map(|&tag| grammar.scope_for_id(tag))
				.map(|name| name.to_string())
				.collect()
		})
		.collect()
}

// --- null grammar and large-file mode ---------------------------------------

#[test]
fn test_null_grammar_completes_synchronously() {
	let buffer = buffer_of(&["abc", "def"]);
	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());

	assert!(layer.is_fully_tokenized());
	assert!(layer.invalid_rows().is_empty());

	layer.set_visible(true);
	assert!(!layer.has_deferred_work());

	let lines = layer.tokenized_lines_for_rows(0, 1);
	assert_eq!(lines.len(), 2);
	for line in lines {
		let tokens: Vec<_> = line.tokens().collect();
		assert_eq!(tokens.len(), 1, "one root-scope span per line");
		let names = line.scope_names(&tokens[0].scopes);
		assert_eq!(names.len(), 1);
		assert_eq!(&*names[0], vellum_grammar::NULL_GRAMMAR_SCOPE);
	}
}

#[test]
fn test_large_file_mode_skips_background_tokenization() {
	let buffer = buffer_of(&["fn x", "fn y"]);
	let mut layer = TokenizedBuffer::new(
		buffer.clone(),
		TokenizedBufferOptions {
			large_file_mode: true,
			..TokenizedBufferOptions::default()
		},
	);
	layer.set_grammar(comment_grammar());
	layer.set_visible(true);

	assert!(layer.is_fully_tokenized());
	assert!(!layer.has_deferred_work());

	edit(&buffer, &mut layer, range((0, 0), (0, 2)), "let");
	assert!(layer.invalid_rows().is_empty());
	assert_eq!(layer.tokenized_line_count(), 2);

	// Rows read as placeholders.
	let line = layer.tokenized_line_for_row(0).unwrap();
	assert!(line.rule_stack().is_none());
}

// --- background scheduling ---------------------------------------------------

#[test]
fn test_chunked_background_drain() {
	let lines: Vec<String> = (0..100).map(|i| format!("fn row{i}")).collect();
	let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
	let buffer = buffer_of(&line_refs);

	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());
	let tokenize_events = Rc::new(Cell::new(0u32));
	let observed = tokenize_events.clone();
	let _sub = layer.on_did_tokenize(move |()| observed.set(observed.get() + 1));

	layer.set_grammar(comment_grammar());
	layer.set_visible(true);

	let mut ticks = 0;
	while layer.has_deferred_work() {
		let before = layer.invalid_rows().first().expect("work pending");
		layer.tick();
		ticks += 1;
		if let Some(after) = layer.invalid_rows().first() {
			assert!(after > before, "front of the invalid set must advance");
			assert!(after - before <= DEFAULT_CHUNK_SIZE);
		}
		assert!(ticks < 1000);
	}

	assert!(ticks >= 5, "100 rows at chunk size 20 need at least 5 chunks");
	assert!(layer.is_fully_tokenized());
	assert_eq!(tokenize_events.get(), 1, "did-tokenize fires exactly once");
}

#[test]
fn test_hidden_layer_schedules_no_work() {
	let buffer = buffer_of(&["fn a", "fn b"]);
	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());
	layer.set_grammar(comment_grammar());

	// Not visible: invalid rows accumulate but no chunk is pending.
	assert!(!layer.invalid_rows().is_empty());
	assert!(!layer.has_deferred_work());

	layer.set_visible(true);
	assert!(layer.has_deferred_work());
	drain(&mut layer);
	assert!(layer.is_fully_tokenized());
}

#[test]
fn test_destroyed_layer_ignores_scheduled_work() {
	let buffer = buffer_of(&["fn a", "fn b"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	assert!(layer.has_deferred_work());

	layer.destroy();
	assert!(!layer.is_alive());
	assert!(!layer.has_deferred_work());
	layer.tick();
	assert_eq!(layer.tokenized_line_count(), 0);
	assert!(layer.tokenized_line_for_row(0).is_none());
	assert!(layer.scope_descriptor_for_position(Point::ZERO).is_empty());
}

#[test]
fn test_dead_buffer_makes_chunks_noops() {
	let buffer = buffer_of(&["fn a", "fn b"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	assert!(layer.has_deferred_work());

	buffer.borrow_mut().destroy();
	layer.tick();
	// The chunk was consumed without tokenizing anything.
	assert!(!layer.is_fully_tokenized());
	assert!(!layer.invalid_rows().is_empty());
}

// --- fixed-point propagation -------------------------------------------------

#[test]
fn test_fixed_point_short_circuit() {
	let lines: Vec<&str> = std::iter::repeat_n("plain", 1000).collect();
	let buffer = buffer_of(&lines);
	let grammar = RecordingGrammar::new(comment_grammar());
	let mut layer = visible_layer(&buffer, grammar.clone());
	drain(&mut layer);
	assert!(layer.is_fully_tokenized());

	grammar.reset();
	edit(&buffer, &mut layer, range((0, 0), (0, 5)), "other");
	drain(&mut layer);

	assert_eq!(
		grammar.tokenized_lines(),
		vec!["other".to_string()],
		"an edit that preserves the end rule stack rebuilds only its own row"
	);
	assert!(layer.invalid_rows().is_empty());
	assert!(layer.is_fully_tokenized());
}

#[test]
fn test_spill_propagation() {
	let buffer = buffer_of(&["/*", "foo", "*/", "bar"]);
	let grammar = comment_grammar();
	let open_comment = grammar.start_id_for_scope("comment.block.demo");
	let mut layer = visible_layer(&buffer, grammar);
	drain(&mut layer);

	assert!(layer.tokenized_line_for_row(1).unwrap().open_scopes().contains(&open_comment));
	assert!(layer.tokenized_line_for_row(2).unwrap().open_scopes().contains(&open_comment));
	assert!(!layer.tokenized_line_for_row(3).unwrap().open_scopes().contains(&open_comment));

	let emitted: Rc<RefCell<Vec<Range>>> = Rc::new(RefCell::new(Vec::new()));
	let sink = emitted.clone();
	let _sub = layer.on_did_invalidate_range(move |r| sink.borrow_mut().push(*r));

	edit(&buffer, &mut layer, range((0, 0), (0, 2)), "x");
	drain(&mut layer);

	for row in 1..=3 {
		assert!(
			!layer.tokenized_line_for_row(row).unwrap().open_scopes().contains(&open_comment),
			"row {row} must no longer start inside the comment"
		);
	}

	// Rule-stack continuity: row 3 starts exactly where row 2 ends.
	let row2 = layer.tokenized_line_for_row(2).unwrap();
	let end_of_row2 = scopes_from_tags(row2.open_scopes(), row2.tags()).unwrap();
	let row3_open = layer.tokenized_line_for_row(3).unwrap().open_scopes().to_vec();
	assert_eq!(row3_open, end_of_row2);

	// Aggregate invalidations cover at least rows 0..3.
	let ranges = emitted.borrow();
	for row in 0..3u32 {
		assert!(
			ranges.iter().any(|r| r.start.row <= row && row < r.end.row),
			"row {row} must appear in some did-invalidate-range emission: {ranges:?}"
		);
	}
}

#[test]
fn test_edit_past_chunk_budget_spills_to_background() {
	let buffer = buffer_of(&["fn a", "fn b"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	drain(&mut layer);

	let inserted = "x\n".repeat(30);
	edit(&buffer, &mut layer, range((1, 0), (1, 0)), &inserted);

	assert_eq!(layer.tokenized_line_count(), 32);
	// Eager rebuild stops after one chunk; the remainder is scheduled.
	assert_eq!(layer.invalid_rows().first(), Some(1 + DEFAULT_CHUNK_SIZE));
	assert!(layer.has_deferred_work());

	drain(&mut layer);
	assert!(layer.is_fully_tokenized());
	for row in 0..32 {
		assert!(layer.tokenized_line_for_row(row).unwrap().rule_stack().is_some());
	}
}

#[test]
fn test_edit_in_untokenized_region_waits_for_background() {
	let buffer = buffer_of(&["/*", "a", "b", "c", "d", "*/"]);
	let mut layer = TokenizedBuffer::new(buffer.clone(), TokenizedBufferOptions::default());
	layer.set_grammar(comment_grammar());
	// Hidden: rows stay untokenized, invalid rows pending.

	edit(&buffer, &mut layer, range((3, 0), (3, 1)), "C");
	assert_eq!(layer.tokenized_line_count(), 6);
	// No seed stack above row 3, so nothing was built eagerly.
	assert!(layer.tokenized_line_for_row(3).unwrap().rule_stack().is_none());

	layer.set_visible(true);
	drain(&mut layer);
	assert!(layer.is_fully_tokenized());
	let open_comment = layer.grammar().start_id_for_scope("comment.block.demo");
	assert!(layer.tokenized_line_for_row(3).unwrap().open_scopes().contains(&open_comment));
}

// --- invariants under edits --------------------------------------------------

#[test]
fn test_cache_length_tracks_buffer_through_edits() {
	let buffer = buffer_of(&["/*", "foo", "*/", "bar", "baz"]);
	let mut layer = visible_layer(&buffer, comment_grammar());

	let check = |layer: &TokenizedBuffer, buffer: &Rc<RefCell<TextBuffer>>| {
		assert_eq!(layer.tokenized_line_count() as u32, buffer.borrow().line_count());
		let rows: Vec<u32> = layer.invalid_rows().iter().collect();
		let mut sorted = rows.clone();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(rows, sorted, "invalid rows stay sorted and unique");
		let last = buffer.borrow().last_row();
		assert!(rows.iter().all(|&row| row <= last));
	};

	check(&layer, &buffer);
	edit(&buffer, &mut layer, range((1, 0), (1, 0)), "x\ny\n");
	check(&layer, &buffer);
	layer.tick();
	check(&layer, &buffer);
	edit(&buffer, &mut layer, range((0, 0), (3, 1)), "z");
	check(&layer, &buffer);
	edit(&buffer, &mut layer, range((0, 0), (0, 0)), "/*\n");
	check(&layer, &buffer);
	drain(&mut layer);
	check(&layer, &buffer);
	assert!(layer.is_fully_tokenized());
}

#[test]
fn test_rule_stack_continuity_after_drain() {
	let buffer = buffer_of(&["fn a", "/* open", "still", "closed */", "fn b"]);
	let grammar = comment_grammar();
	let mut layer = visible_layer(&buffer, grammar.clone());
	drain(&mut layer);

	for row in 1..=buffer.borrow().last_row() {
		let previous = layer.tokenized_line_for_row(row - 1).unwrap().rule_stack().cloned();
		let text = buffer.borrow().line_for_row(row).unwrap();
		let fresh = grammar.tokenize_line(&text, previous.as_ref(), false);
		let cached = layer.tokenized_line_for_row(row).unwrap().rule_stack().cloned();
		assert_eq!(Some(fresh.rule_stack), cached, "row {row} diverged");
	}
}

#[test]
fn test_fold_idempotence_across_rows() {
	let buffer = buffer_of(&["/* a", "b */ fn c", "// d", "e"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	drain(&mut layer);

	for row in 0..buffer.borrow().last_row() {
		let (open_scopes, tags) = {
			let line = layer.tokenized_line_for_row(row).unwrap();
			(line.open_scopes().to_vec(), line.tags().to_vec())
		};
		let folded = scopes_from_tags(&open_scopes, &tags).unwrap();
		let next_open = layer.tokenized_line_for_row(row + 1).unwrap().open_scopes().to_vec();
		assert_eq!(folded, next_open, "row {} open scopes diverged", row + 1);
	}
}

// --- grammar lifecycle -------------------------------------------------------

#[test]
fn test_grammar_change_event_precedes_tokenization_events() {
	let buffer = buffer_of(&["fn a"]);
	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());
	layer.set_visible(true);

	let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
	let grammar_log = log.clone();
	let _g = layer.on_did_change_grammar(move |grammar| {
		grammar_log.borrow_mut().push(format!("grammar:{}", grammar.name()));
	});
	let tokenize_log = log.clone();
	let _t = layer.on_did_tokenize(move |()| tokenize_log.borrow_mut().push("tokenize".into()));
	let invalidate_log = log.clone();
	let _i = layer.on_did_invalidate_range(move |_| {
		invalidate_log.borrow_mut().push("invalidate".into())
	});

	let grammar = comment_grammar();
	layer.set_grammar(grammar.clone());
	drain(&mut layer);

	let events = log.borrow().clone();
	assert_eq!(events.first().map(String::as_str), Some("grammar:Demo"));
	assert_eq!(events.iter().filter(|e| e.starts_with("grammar:")).count(), 1);
	assert_eq!(events.iter().filter(|e| *e == "tokenize").count(), 1);
	assert!(events.iter().any(|e| e == "invalidate"));

	// Same grammar again: accepted-change events do not re-fire.
	layer.set_grammar(grammar);
	assert_eq!(log.borrow().len(), events.len());
}

#[test]
fn test_grammar_update_triggers_retokenization() {
	let buffer = buffer_of(&["let x"]);
	let grammar = comment_grammar();
	let mut layer = visible_layer(&buffer, grammar.clone());
	drain(&mut layer);

	let keyword_scope: Vec<Vec<String>> = scope_names(&mut layer, 0);
	assert!(keyword_scope.iter().all(|scopes| {
		scopes.iter().all(|scope| !scope.starts_with("keyword"))
	}));

	grammar.add_keyword("let", "keyword.control.demo");
	assert!(layer.has_deferred_work());
	drain(&mut layer);

	let tokens = scope_names(&mut layer, 0);
	assert!(
		tokens[0].iter().any(|scope| scope == "keyword.control.demo"),
		"re-tokenization must pick up the new keyword: {tokens:?}"
	);
}

// --- on-demand access and queries --------------------------------------------

#[test]
fn test_placeholder_lines_resolve_once_background_arrives() {
	let buffer = buffer_of(&["fn a", "fn b", "fn c"]);
	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());
	layer.set_grammar(comment_grammar());

	// Hidden and undrained: queries still see a root-scope placeholder.
	let descriptor = layer.scope_descriptor_for_position(Point::new(2, 1));
	assert_eq!(
		descriptor.scopes().iter().map(|s| s.to_string()).collect::<Vec<_>>(),
		vec!["source.demo".to_string()]
	);
	assert!(layer.tokenized_line_for_row(2).unwrap().rule_stack().is_none());

	layer.set_visible(true);
	drain(&mut layer);
	assert!(layer.tokenized_line_for_row(2).unwrap().rule_stack().is_some());
}

#[test]
fn test_scope_descriptor_for_position() {
	let buffer = buffer_of(&["fn main", "/* note"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	drain(&mut layer);

	let keyword = layer.scope_descriptor_for_position(Point::new(0, 1));
	assert_eq!(keyword.to_string(), "source.demo keyword.control.demo");

	let plain = layer.scope_descriptor_for_position(Point::new(0, 4));
	assert_eq!(plain.to_string(), "source.demo");

	// Past the end of the line: the end-of-line stack.
	let eol = layer.scope_descriptor_for_position(Point::new(1, 99));
	assert_eq!(eol.to_string(), "source.demo comment.block.demo");
}

#[test]
fn test_token_lookup_for_position() {
	let buffer = buffer_of(&["fn main"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	drain(&mut layer);

	let token = layer.token_for_position(Point::new(0, 1)).unwrap();
	assert_eq!((token.start, token.end), (0, 2));
	assert_eq!(
		layer.token_start_position_for_position(Point::new(0, 5)),
		Some(Point::new(0, 2))
	);
}

#[test]
fn test_range_for_scope_expansion() {
	let buffer = buffer_of(&["abcdefghi"]);
	let mut layer = visible_layer(&buffer, NestedScopesGrammar::new());
	drain(&mut layer);

	assert_eq!(
		layer.buffer_range_for_scope_at_position(".A", Point::new(0, 5)),
		Some(range((0, 0), (0, 9)))
	);
	assert_eq!(
		layer.buffer_range_for_scope_at_position(".B", Point::new(0, 5)),
		Some(range((0, 3), (0, 7)))
	);
	assert_eq!(
		layer.buffer_range_for_scope_at_position(".C", Point::new(0, 5)),
		None
	);
}

#[test]
fn test_foldability_by_indent() {
	let buffer = buffer_of(&["def f():", "    a", "    b", "c"]);
	let mut layer = TokenizedBuffer::new(
		buffer,
		TokenizedBufferOptions {
			tab_length: 2,
			..TokenizedBufferOptions::default()
		},
	);
	layer.set_visible(true);
	drain(&mut layer);

	assert!(layer.is_foldable_code_at_row(0));
	assert!(!layer.is_foldable_code_at_row(1));
	assert!(!layer.is_foldable_code_at_row(3));
	assert!(layer.is_foldable_at_row(0));
}

#[test]
fn test_foldability_of_comment_runs() {
	let buffer = buffer_of(&["// a", "// b", "x", "// c"]);
	let mut layer = visible_layer(&buffer, comment_grammar());
	drain(&mut layer);

	assert!(layer.is_foldable_comment_at_row(0));
	assert!(!layer.is_foldable_comment_at_row(1), "not the first row of the run");
	assert!(!layer.is_foldable_comment_at_row(2));
	assert!(!layer.is_foldable_comment_at_row(3), "run of one");
	assert!(!layer.is_foldable_code_at_row(0), "comment rows never code-fold");
}

#[test]
fn test_blank_row_indent_uses_neighbors() {
	let buffer = buffer_of(&["    a", "", "  b"]);
	let layer = TokenizedBuffer::new(
		buffer,
		TokenizedBufferOptions {
			tab_length: 4,
			..TokenizedBufferOptions::default()
		},
	);
	assert_eq!(layer.indent_level_for_row(0), 1.0);
	// max(ceil(0.5), ceil(1.0)) = 1
	assert_eq!(layer.indent_level_for_row(1), 1.0);
	assert_eq!(layer.indent_level_for_row(2), 0.5);
}

#[test]
fn test_indent_level_expands_tabs() {
	assert_eq!(indent_level_for_line("\tx", 4), 1.0);
	assert_eq!(indent_level_for_line("  \tx", 4), 1.0);
	assert_eq!(indent_level_for_line("    \tx", 4), 2.0);
	assert_eq!(indent_level_for_line("  x", 4), 0.5);
	assert_eq!(indent_level_for_line("x", 4), 0.0);
}

#[test]
fn test_out_of_range_rows_return_nothing() {
	let buffer = buffer_of(&["a"]);
	let mut layer = TokenizedBuffer::new(buffer, TokenizedBufferOptions::default());
	assert!(layer.tokenized_line_for_row(5).is_none());
	assert!(layer.tokenized_lines_for_rows(3, 9).len() <= 1);
	assert!(!layer.is_foldable_at_row(5));
}

// --- corruption reporting ----------------------------------------------------

#[test]
fn test_unmatched_close_reports_assertion_and_continues() {
	let buffer = Rc::new(RefCell::new(TextBuffer::with_path("ab\ncd", "/tmp/broken.txt")));
	let mut layer = visible_layer(&buffer, UnbalancedGrammar::new());
	let reporter = Rc::new(CapturingReporter::default());
	layer.set_assertion_reporter(reporter.clone());

	drain(&mut layer);
	assert!(layer.is_fully_tokenized(), "corruption is non-fatal");

	let reports = reporter.reports.borrow();
	assert!(!reports.is_empty());
	let (message, unmatched, path) = &reports[0];
	assert!(message.contains("unmatched scope-close"));
	assert_eq!(unmatched.as_deref(), Some("broken.scope"));
	assert_eq!(path.as_deref(), Some(std::path::Path::new("/tmp/broken.txt")));
}

// --- serialization ------------------------------------------------------------

#[test]
fn test_serialize_and_rebind() {
	let buffer = Rc::new(RefCell::new(TextBuffer::with_path("fn a", "/tmp/demo.rs")));
	let layer = TokenizedBuffer::new(
		buffer.clone(),
		TokenizedBufferOptions {
			tab_length: 2,
			..TokenizedBufferOptions::default()
		},
	);
	let state = layer.serialize();
	assert_eq!(state.deserializer, DESERIALIZER_NAME);
	assert_eq!(state.buffer_id, buffer.borrow().id().0);
	assert_eq!(state.tab_length, 2);

	let resolved = TokenizedBuffer::deserialize(&state, |id| {
		(id == buffer.borrow().id().0).then(|| buffer.clone())
	});
	assert!(resolved.is_some());
	assert_eq!(resolved.unwrap().tab_length(), 2);

	let unresolved = TokenizedBuffer::deserialize(&state, |_| None);
	assert!(unresolved.is_none());

	let mut foreign = state.clone();
	foreign.deserializer = "DisplayLayer".to_string();
	assert!(TokenizedBuffer::deserialize(&foreign, |_| Some(buffer.clone())).is_none());
}
