//! The incremental tokenization engine.
//!
//! [`TokenizedBuffer`] binds to one [`TextBuffer`] and one grammar. Edits
//! splice the per-row cache and rebase the invalid-row set synchronously;
//! the expensive work — re-tokenizing rows until rule stacks stop changing —
//! happens in bounded chunks whenever the host pumps [`TokenizedBuffer::tick`].
//!
//! Scheduling is cooperative and single-threaded: `tokenize_in_background`
//! only latches a pending-chunk flag, and the deferred chunk runs on the
//! host's next tick, after the current edit or query has completed. A chunk
//! re-reads the invalid-row set on every iteration, so edits interleaved
//! between ticks are safe.

mod queries;
#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vellum_buffer::{TextBuffer, TextChange};
use vellum_grammar::{Grammar, NullGrammar, RuleStack, tags};
use vellum_primitives::{Emitter, Range, Subscription};

use crate::fold::{FoldError, scopes_from_tags};
use crate::invalid_rows::InvalidRowSet;
use crate::report::{AssertionMetadata, AssertionReporter, TracingReporter};
use crate::serialization::{DESERIALIZER_NAME, TokenizedBufferState};
use crate::tokenized_line::TokenizedLine;

pub use queries::{ScopeDescriptor, indent_level_for_line};

/// Rows tokenized per background chunk. The value trades latency against
/// throughput and does not affect correctness.
pub const DEFAULT_CHUNK_SIZE: u32 = 20;

/// Construction-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct TokenizedBufferOptions {
	pub tab_length: u32,
	/// Skip tokenization entirely; every row reads as a root-scope span.
	pub large_file_mode: bool,
	pub chunk_size: u32,
}

impl Default for TokenizedBufferOptions {
	fn default() -> Self {
		Self {
			tab_length: 4,
			large_file_mode: false,
			chunk_size: DEFAULT_CHUNK_SIZE,
		}
	}
}

/// Incrementally tokenized view of a text buffer.
pub struct TokenizedBuffer {
	buffer: Rc<RefCell<TextBuffer>>,
	grammar: Rc<dyn Grammar>,
	tab_length: u32,
	large_file_mode: bool,
	chunk_size: u32,
	tokenized_lines: Vec<Option<TokenizedLine>>,
	invalid_rows: InvalidRowSet,
	visible: bool,
	alive: bool,
	pending_chunk: bool,
	fully_tokenized: bool,
	/// Set from inside the grammar's update callback; drained on tick.
	grammar_updated: Rc<Cell<bool>>,
	grammar_subscription: Option<Subscription>,
	did_change_grammar: Emitter<Rc<dyn Grammar>>,
	did_tokenize: Emitter<()>,
	did_invalidate_range: Emitter<Range>,
	reporter: Rc<dyn AssertionReporter>,
}

impl TokenizedBuffer {
	/// Creates a tokenized layer bound to `buffer`, starting under the null
	/// grammar (fully tokenized, no background work).
	pub fn new(buffer: Rc<RefCell<TextBuffer>>, options: TokenizedBufferOptions) -> Self {
		let mut this = Self {
			buffer,
			grammar: Rc::new(NullGrammar::new()),
			tab_length: options.tab_length.max(1),
			large_file_mode: options.large_file_mode,
			chunk_size: options.chunk_size.max(1),
			tokenized_lines: Vec::new(),
			invalid_rows: InvalidRowSet::new(),
			visible: false,
			alive: true,
			pending_chunk: false,
			fully_tokenized: false,
			grammar_updated: Rc::new(Cell::new(false)),
			grammar_subscription: None,
			did_change_grammar: Emitter::new(),
			did_tokenize: Emitter::new(),
			did_invalidate_range: Emitter::new(),
			reporter: Rc::new(TracingReporter),
		};
		this.retokenize_lines();
		this
	}

	/// Rebuilds a tokenized layer from a serialized envelope. Returns `None`
	/// when the envelope names a different deserializer or `resolve_buffer`
	/// cannot produce a live buffer for the recorded id.
	pub fn deserialize(
		state: &TokenizedBufferState,
		resolve_buffer: impl FnOnce(u64) -> Option<Rc<RefCell<TextBuffer>>>,
	) -> Option<Self> {
		if state.deserializer != DESERIALIZER_NAME {
			return None;
		}
		let buffer = resolve_buffer(state.buffer_id)?;
		Some(Self::new(
			buffer,
			TokenizedBufferOptions {
				tab_length: state.tab_length,
				large_file_mode: state.large_file_mode,
				chunk_size: DEFAULT_CHUNK_SIZE,
			},
		))
	}

	/// Serializes the rebind envelope. Tokenized rows are never persisted.
	pub fn serialize(&self) -> TokenizedBufferState {
		let buffer = self.buffer.borrow();
		TokenizedBufferState {
			deserializer: DESERIALIZER_NAME.to_string(),
			buffer_path: buffer.path().map(|path| path.to_path_buf()),
			buffer_id: buffer.id().0,
			tab_length: self.tab_length,
			large_file_mode: self.large_file_mode,
		}
	}

	pub fn buffer(&self) -> &Rc<RefCell<TextBuffer>> {
		&self.buffer
	}

	pub fn grammar(&self) -> &Rc<dyn Grammar> {
		&self.grammar
	}

	pub fn tab_length(&self) -> u32 {
		self.tab_length
	}

	pub fn set_tab_length(&mut self, tab_length: u32) {
		self.tab_length = tab_length.max(1);
	}

	pub fn is_alive(&self) -> bool {
		self.alive
	}

	pub fn is_fully_tokenized(&self) -> bool {
		self.fully_tokenized
	}

	pub fn invalid_rows(&self) -> &InvalidRowSet {
		&self.invalid_rows
	}

	/// Number of cached rows (placeholders included).
	pub fn tokenized_line_count(&self) -> usize {
		self.tokenized_lines.len()
	}

	/// Replaces the assertion sink used for invariant-violation reports.
	pub fn set_assertion_reporter(&mut self, reporter: Rc<dyn AssertionReporter>) {
		self.reporter = reporter;
	}

	pub fn on_did_change_grammar(
		&self,
		callback: impl FnMut(&Rc<dyn Grammar>) + 'static,
	) -> Subscription {
		self.did_change_grammar.subscribe(callback)
	}

	pub fn on_did_tokenize(&self, callback: impl FnMut(&()) + 'static) -> Subscription {
		self.did_tokenize.subscribe(callback)
	}

	pub fn on_did_invalidate_range(&self, callback: impl FnMut(&Range) + 'static) -> Subscription {
		self.did_invalidate_range.subscribe(callback)
	}

	/// Swaps the active grammar. Passing the grammar already in use is a
	/// no-op; otherwise the cache resets, `did-change-grammar` fires, and
	/// background tokenization restarts from row zero.
	pub fn set_grammar(&mut self, grammar: Rc<dyn Grammar>) {
		if Rc::ptr_eq(&self.grammar, &grammar) {
			return;
		}
		if let Some(subscription) = self.grammar_subscription.take() {
			subscription.dispose();
		}
		self.grammar = grammar.clone();
		self.grammar_updated.set(false);
		let flag = self.grammar_updated.clone();
		self.grammar_subscription = Some(
			self.grammar
				.on_did_update(Box::new(move || flag.set(true))),
		);
		self.retokenize_lines();
		tracing::debug!(grammar = grammar.name(), "grammar changed");
		self.did_change_grammar.emit(&grammar);
	}

	/// Visibility gates background work: hidden layers accumulate invalid
	/// rows but burn no cycles on them.
	pub fn set_visible(&mut self, visible: bool) {
		self.visible = visible;
		if visible && !self.large_file_mode && !self.grammar.is_null() {
			self.tokenize_in_background();
		}
	}

	/// Detaches from the buffer and drops all cached state. Scheduled
	/// chunks become no-ops.
	pub fn destroy(&mut self) {
		if !self.alive {
			return;
		}
		self.alive = false;
		if let Some(subscription) = self.grammar_subscription.take() {
			subscription.dispose();
		}
		self.pending_chunk = false;
		self.tokenized_lines.clear();
		self.invalid_rows.clear();
		tracing::debug!("tokenized buffer destroyed");
	}

	/// True when a deferred chunk or a grammar-update reset is waiting for
	/// the next [`tick`](Self::tick).
	pub fn has_deferred_work(&self) -> bool {
		self.alive && (self.pending_chunk || self.grammar_updated.get())
	}

	/// Runs at most one unit of deferred work. The host calls this once per
	/// turn of its run loop; dead layers and dead buffers make it a no-op.
	pub fn tick(&mut self) {
		if !self.alive {
			return;
		}
		if self.grammar_updated.replace(false) {
			tracing::debug!(grammar = self.grammar.name(), "grammar updated; retokenizing");
			self.retokenize_lines();
		}
		if !self.pending_chunk {
			return;
		}
		self.pending_chunk = false;
		if !self.buffer.borrow().is_alive() {
			return;
		}
		self.tokenize_next_chunk();
	}

	/// Applies a buffer edit to the cache: rebases invalid rows, splices the
	/// edited region, eagerly rebuilds it (bounded by the chunk size), and
	/// invalidates the spill row when the edit changed the rule stack flowing
	/// out of the region.
	pub fn buffer_did_change(&mut self, change: &TextChange) {
		if !self.alive {
			return;
		}
		let start = change.old_range.start.row;
		let end = change.old_range.end.row;
		let delta = change.row_delta();
		let old_count = (end - start + 1) as usize;
		let new_end = change.new_range.end.row;
		let new_count = (new_end - change.new_range.start.row + 1) as usize;

		let line_count = self.line_count();
		self.invalid_rows.rebase(start, end, delta);
		self.invalid_rows.retain_within(line_count);

		let previous_end_stack = self.rule_stack_at(end);

		let start_index = start as usize;
		self.tokenized_lines.splice(
			start_index..start_index + old_count,
			std::iter::repeat_with(|| None).take(new_count),
		);
		debug_assert_eq!(
			self.tokenized_lines.len(),
			self.line_count() as usize,
			"cache length must track the buffer line count"
		);

		if self.large_file_mode || self.grammar.is_null() {
			// Slots stay empty; queries synthesize placeholders on demand.
			return;
		}

		self.build_tokenized_lines_for_rows(start, new_end);

		let new_end_stack = self.rule_stack_at(new_end);
		if new_end_stack.is_some() && new_end_stack != previous_end_stack {
			tracing::trace!(row = new_end + 1, "rule stack changed across edit; spilling");
			self.invalidate_row(new_end + 1);
		}
		self.did_invalidate_range.emit(&Range::rows(start, new_end + 1));
	}

	/// The cached line for `row`, synthesizing and caching a root-scope
	/// placeholder when background tokenization has not reached it yet.
	/// `None` only for out-of-range rows or a destroyed layer.
	pub fn tokenized_line_for_row(&mut self, row: u32) -> Option<&TokenizedLine> {
		if !self.alive || row > self.last_row() {
			return None;
		}
		let slot = self.tokenized_lines.get_mut(row as usize)?;
		if slot.is_none() {
			let (text, ending) = {
				let buffer = self.buffer.borrow();
				(
					buffer.line_for_row(row).unwrap_or_default(),
					buffer.line_ending_for_row(row).unwrap_or(""),
				)
			};
			*slot = Some(TokenizedLine::placeholder(text, ending, self.grammar.clone()));
		}
		slot.as_ref()
	}

	/// Cached (or placeholder) lines for `start..=end`, clipped to the
	/// buffer.
	pub fn tokenized_lines_for_rows(&mut self, start: u32, end: u32) -> Vec<&TokenizedLine> {
		let end = end.min(self.last_row());
		if !self.alive || start > end {
			return Vec::new();
		}
		for row in start..=end {
			let _ = self.tokenized_line_for_row(row);
		}
		self.tokenized_lines[start as usize..=end as usize]
			.iter()
			.filter_map(|slot| slot.as_ref())
			.collect()
	}

	fn line_count(&self) -> u32 {
		self.buffer.borrow().line_count()
	}

	fn last_row(&self) -> u32 {
		self.buffer.borrow().last_row()
	}

	fn retokenize_lines(&mut self) {
		self.fully_tokenized = false;
		let line_count = self.line_count() as usize;
		self.tokenized_lines = std::iter::repeat_with(|| None).take(line_count).collect();
		self.invalid_rows.clear();
		if self.large_file_mode || self.grammar.is_null() {
			self.mark_tokenization_complete();
		} else {
			self.invalidate_row(0);
		}
	}

	fn mark_tokenization_complete(&mut self) {
		if !self.fully_tokenized {
			self.fully_tokenized = true;
			tracing::debug!("tokenization complete");
			self.did_tokenize.emit(&());
		}
	}

	fn invalidate_row(&mut self, row: u32) {
		if row > self.last_row() {
			return;
		}
		self.fully_tokenized = false;
		self.invalid_rows.insert(row);
		self.tokenize_in_background();
	}

	/// Debounced chunk scheduling: at most one chunk is ever pending, and
	/// hidden or dead layers schedule nothing.
	fn tokenize_in_background(&mut self) {
		if self.pending_chunk || !self.visible || !self.alive {
			return;
		}
		self.pending_chunk = true;
		tracing::trace!("background chunk scheduled");
	}

	fn tokenize_next_chunk(&mut self) {
		let last_row = self.last_row();
		let mut rows_remaining = self.chunk_size;

		while rows_remaining > 0 {
			let Some(start_row) = self.invalid_rows.pop_min() else {
				break;
			};
			if start_row > last_row {
				continue;
			}

			let mut row = start_row;
			let (end_row, filled) = loop {
				let previous_stack = self.rule_stack_at(row);
				let line = self.build_tokenized_line(row);
				self.tokenized_lines[row as usize] = Some(line);
				rows_remaining -= 1;

				if rows_remaining == 0 {
					break (row, false);
				}
				if row == last_row {
					break (row, true);
				}
				// Fixed point: propagation stops at the first row whose
				// rebuilt rule stack matches the cached one.
				let fixed_point = matches!(
					(self.rule_stack_at(row), previous_stack),
					(Some(new), Some(old)) if new == old
				);
				if fixed_point {
					break (row, true);
				}
				row += 1;
			};

			self.invalid_rows.validate_up_to(end_row);
			if !filled {
				self.invalidate_row(end_row + 1);
			}
			tracing::trace!(start_row, end_row, filled, "tokenized chunk region");
			self.did_invalidate_range.emit(&Range::rows(start_row, end_row + 1));
		}

		if self.invalid_rows.is_empty() {
			self.mark_tokenization_complete();
		} else {
			self.tokenize_in_background();
		}
	}

	/// Eagerly rebuilds `start..=end` after an edit, threading the rule
	/// stack and open scopes forward. Stops early when the preceding row has
	/// no stack to seed from (background work will arrive there) or when the
	/// region exceeds one chunk, in which case the remainder is invalidated.
	fn build_tokenized_lines_for_rows(&mut self, start: u32, end: u32) {
		let mut stack = self.rule_stack_before(start);
		let mut open_scopes = self.open_scopes_for_row(start);
		let chunk_limit = start.saturating_add(self.chunk_size);

		for row in start..=end {
			if stack.is_none() && row != 0 {
				break;
			}
			if row >= chunk_limit {
				self.invalidate_row(row);
				break;
			}
			let (text, ending) = {
				let buffer = self.buffer.borrow();
				(
					buffer.line_for_row(row).unwrap_or_default(),
					buffer.line_ending_for_row(row).unwrap_or(""),
				)
			};
			let tokens = self.grammar.tokenize_line(&text, stack.as_ref(), row == 0);
			let next_open_scopes = self.fold_scopes(&open_scopes, &tokens.tags);
			self.tokenized_lines[row as usize] = Some(TokenizedLine::new(
				text,
				ending,
				tokens.tags,
				Some(tokens.rule_stack.clone()),
				open_scopes,
				self.grammar.clone(),
			));
			stack = Some(tokens.rule_stack);
			open_scopes = next_open_scopes;
		}
	}

	fn build_tokenized_line(&self, row: u32) -> TokenizedLine {
		let (text, ending) = {
			let buffer = self.buffer.borrow();
			(
				buffer.line_for_row(row).unwrap_or_default(),
				buffer.line_ending_for_row(row).unwrap_or(""),
			)
		};
		let stack = self.rule_stack_before(row);
		let open_scopes = self.open_scopes_for_row(row);
		let tokens = self.grammar.tokenize_line(&text, stack.as_ref(), row == 0);
		TokenizedLine::new(
			text,
			ending,
			tokens.tags,
			Some(tokens.rule_stack),
			open_scopes,
			self.grammar.clone(),
		)
	}

	fn rule_stack_at(&self, row: u32) -> Option<RuleStack> {
		self.tokenized_lines
			.get(row as usize)?
			.as_ref()?
			.rule_stack()
			.cloned()
	}

	fn rule_stack_before(&self, row: u32) -> Option<RuleStack> {
		if row == 0 {
			None
		} else {
			self.rule_stack_at(row - 1)
		}
	}

	/// Open tags at the start of `row`: the previous row's open scopes
	/// folded over its tags. Rows after untokenized rows start empty.
	fn open_scopes_for_row(&self, row: u32) -> Vec<i32> {
		if row == 0 {
			return Vec::new();
		}
		match self
			.tokenized_lines
			.get(row as usize - 1)
			.and_then(|slot| slot.as_ref())
		{
			Some(previous) => self.fold_scopes(previous.open_scopes(), previous.tags()),
			None => Vec::new(),
		}
	}

	fn fold_scopes(&self, starting: &[i32], line_tags: &[i32]) -> Vec<i32> {
		match scopes_from_tags(starting, line_tags) {
			Ok(scopes) => scopes,
			Err(error) => {
				self.report_fold_error(&error);
				error.scopes
			}
		}
	}

	/// Non-fatal: report the corrupted tag stream with enough context to
	/// debug the grammar, keep the partial stack, and carry on.
	fn report_fold_error(&self, error: &FoldError) {
		let buffer = self.buffer.borrow();
		let metadata = AssertionMetadata {
			grammar_scope: self.grammar.scope_name().to_string(),
			unmatched_scope: self.grammar.scope_for_id(tags::open_for_close(error.tag)),
			buffer_path: buffer.path().map(|path| path.to_path_buf()),
			buffer_contents: buffer.text(),
		};
		self.reporter
			.assertion_failed("tag stream contained an unmatched scope-close tag", &metadata);
	}
}
