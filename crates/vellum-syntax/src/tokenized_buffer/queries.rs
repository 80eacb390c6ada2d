//! Position and scope queries over the tokenized cache.
//!
//! Queries clip positions to the buffer, read cached lines, and fall back to
//! on-demand placeholder lines for rows background tokenization has not
//! reached, so they always answer without blocking. Out-of-range input
//! yields `None`, never a panic.

use std::fmt;
use std::sync::Arc;

use vellum_grammar::ScopeSelector;
use vellum_primitives::{Point, Range};

use super::TokenizedBuffer;
use crate::fold::scopes_from_tags;
use crate::tokenized_line::{Token, TokenizedLine};

/// Ordered scope names at a position, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDescriptor {
	scopes: Vec<Arc<str>>,
}

impl ScopeDescriptor {
	pub fn new(scopes: Vec<Arc<str>>) -> Self {
		Self { scopes }
	}

	pub fn scopes(&self) -> &[Arc<str>] {
		&self.scopes
	}

	pub fn into_scopes(self) -> Vec<Arc<str>> {
		self.scopes
	}

	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}
}

impl fmt::Display for ScopeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for scope in &self.scopes {
			if !first {
				write!(f, " ")?;
			}
			write!(f, "{scope}")?;
			first = false;
		}
		Ok(())
	}
}

/// Indent level of one line: leading whitespace with tabs expanded to the
/// next multiple of `tab_length`, divided by `tab_length`. Fractional
/// levels are meaningful (e.g. two spaces under a four-space tab are 0.5).
pub fn indent_level_for_line(line: &str, tab_length: u32) -> f64 {
	let tab = tab_length.max(1);
	let mut indent = 0u32;
	for ch in line.chars() {
		match ch {
			' ' => indent += 1,
			'\t' => indent = (indent / tab + 1) * tab,
			_ => break,
		}
	}
	f64::from(indent) / f64::from(tab)
}

impl TokenizedBuffer {
	/// Scope names covering `position`, outermost first. Positions past the
	/// last token reproduce the scope stack open at end of line.
	pub fn scope_descriptor_for_position(&mut self, position: Point) -> ScopeDescriptor {
		let position = self.buffer.borrow().clip_position(position);
		let (scopes, grammar) = {
			let Some(line) = self.tokenized_line_for_row(position.row) else {
				return ScopeDescriptor::default();
			};
			let scopes = match line.token_at_buffer_column(position.column) {
				Some(token) => token.scopes,
				None => scopes_from_tags(line.open_scopes(), line.tags())
					.unwrap_or_else(|error| error.scopes),
			};
			(scopes, line.grammar().clone())
		};
		let names = scopes
			.iter()
			.filter_map(|&tag| grammar.scope_for_id(tag))
			.collect();
		ScopeDescriptor::new(names)
	}

	/// The token covering `position`.
	pub fn token_for_position(&mut self, position: Point) -> Option<Token> {
		let position = self.buffer.borrow().clip_position(position);
		self.tokenized_line_for_row(position.row)?
			.token_at_buffer_column(position.column)
	}

	/// Start of the token covering `position`.
	pub fn token_start_position_for_position(&mut self, position: Point) -> Option<Point> {
		let position = self.buffer.borrow().clip_position(position);
		let column = self
			.tokenized_line_for_row(position.row)?
			.token_start_column_for_buffer_column(position.column)?;
		Some(Point::new(position.row, column))
	}

	/// The contiguous column range around `position` whose scope stacks all
	/// match `selector` (dotted-superset semantics, see [`ScopeSelector`]).
	/// Ranges never cross row boundaries.
	pub fn buffer_range_for_scope_at_position(
		&mut self,
		selector: &str,
		position: Point,
	) -> Option<Range> {
		let selector = ScopeSelector::parse(selector);
		self.buffer_range_for_matching_scopes(position, move |scopes| {
			selector.matches_stack(scopes)
		})
	}

	/// Generalized form of [`buffer_range_for_scope_at_position`]: the match
	/// predicate over scope-name stacks is caller-supplied.
	///
	/// [`buffer_range_for_scope_at_position`]: Self::buffer_range_for_scope_at_position
	pub fn buffer_range_for_matching_scopes(
		&mut self,
		position: Point,
		predicate: impl Fn(&[Arc<str>]) -> bool,
	) -> Option<Range> {
		let position = self.buffer.borrow().clip_position(position);
		let row = position.row;
		let (tokens, grammar) = {
			let line = self.tokenized_line_for_row(row)?;
			(line.tokens().collect::<Vec<Token>>(), line.grammar().clone())
		};
		let names_of = |token: &Token| -> Vec<Arc<str>> {
			token
				.scopes
				.iter()
				.filter_map(|&tag| grammar.scope_for_id(tag))
				.collect()
		};

		let index = tokens
			.iter()
			.position(|token| token.start <= position.column && position.column < token.end)?;
		if !predicate(&names_of(&tokens[index])) {
			return None;
		}

		let mut first = index;
		while first > 0 && predicate(&names_of(&tokens[first - 1])) {
			first -= 1;
		}
		let mut last = index;
		while last + 1 < tokens.len() && predicate(&names_of(&tokens[last + 1])) {
			last += 1;
		}

		Some(Range::new(
			Point::new(row, tokens[first].start),
			Point::new(row, tokens[last].end),
		))
	}

	/// True when `row` starts either a code fold (next non-blank row is
	/// deeper indented) or a comment fold (first row of a comment run).
	pub fn is_foldable_at_row(&self, row: u32) -> bool {
		self.is_foldable_code_at_row(row) || self.is_foldable_comment_at_row(row)
	}

	/// Code fold: non-blank, not a comment line, and the next non-blank row
	/// is indented deeper.
	pub fn is_foldable_code_at_row(&self, row: u32) -> bool {
		let next = {
			let buffer = self.buffer.borrow();
			if row > buffer.last_row() || buffer.is_row_blank(row) {
				return false;
			}
			buffer.next_non_blank_row(row)
		};
		if self.row_is_comment(row) {
			return false;
		}
		match next {
			Some(next_row) => self.indent_level_for_row(next_row) > self.indent_level_for_row(row),
			None => false,
		}
	}

	/// Comment fold: a comment row starting a run of at least two comment
	/// rows. Uses cached tokenization only; untokenized rows read as
	/// non-comments.
	pub fn is_foldable_comment_at_row(&self, row: u32) -> bool {
		if !self.row_is_comment(row) {
			return false;
		}
		let previous_is_comment = row > 0 && self.row_is_comment(row - 1);
		!previous_is_comment && self.row_is_comment(row + 1)
	}

	/// Indent level of `row`. Blank rows take the larger of the surrounding
	/// non-blank rows' levels, rounded up.
	pub fn indent_level_for_row(&self, row: u32) -> f64 {
		let buffer = self.buffer.borrow();
		let Some(line) = buffer.line_for_row(row) else {
			return 0.0;
		};
		if !line.chars().all(char::is_whitespace) {
			return indent_level_for_line(&line, self.tab_length);
		}
		let level_of = |candidate: Option<u32>| {
			candidate
				.and_then(|r| buffer.line_for_row(r))
				.map(|text| indent_level_for_line(&text, self.tab_length).ceil())
				.unwrap_or(0.0)
		};
		let next = level_of(buffer.next_non_blank_row(row));
		let previous = level_of(buffer.previous_non_blank_row(row));
		next.max(previous)
	}

	fn row_is_comment(&self, row: u32) -> bool {
		self.tokenized_lines
			.get(row as usize)
			.and_then(|slot| slot.as_ref())
			.is_some_and(TokenizedLine::is_comment)
	}
}
