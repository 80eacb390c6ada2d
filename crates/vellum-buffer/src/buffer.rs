use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ropey::Rope;
use vellum_primitives::{Point, Range};

use crate::TextChange;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique buffer identity, used by serialized state to re-find a
/// live buffer on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "buffer-{}", self.0)
	}
}

/// A mutable, line-oriented text buffer.
///
/// Rows are newline-delimited; a trailing newline yields a final empty row,
/// so `line_count` is always at least 1. Columns are measured in characters.
pub struct TextBuffer {
	rope: Rope,
	id: BufferId,
	path: Option<PathBuf>,
	change_count: u64,
	alive: bool,
}

impl TextBuffer {
	pub fn new(text: &str) -> Self {
		Self {
			rope: Rope::from_str(text),
			id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
			path: None,
			change_count: 0,
			alive: true,
		}
	}

	pub fn with_path(text: &str, path: impl Into<PathBuf>) -> Self {
		let mut buffer = Self::new(text);
		buffer.path = Some(path.into());
		buffer
	}

	/// Builds a buffer from one string per row (no trailing newline).
	pub fn from_lines(lines: &[&str]) -> Self {
		Self::new(&lines.join("\n"))
	}

	pub fn id(&self) -> BufferId {
		self.id
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn set_path(&mut self, path: impl Into<PathBuf>) {
		self.path = Some(path.into());
	}

	/// Number of edits applied since creation.
	pub fn change_count(&self) -> u64 {
		self.change_count
	}

	pub fn is_alive(&self) -> bool {
		self.alive
	}

	/// Marks the buffer dead. Observers check liveness before deferred work.
	pub fn destroy(&mut self) {
		self.alive = false;
	}

	pub fn line_count(&self) -> u32 {
		self.rope.len_lines() as u32
	}

	pub fn last_row(&self) -> u32 {
		self.line_count() - 1
	}

	/// The text of `row` without its line ending.
	pub fn line_for_row(&self, row: u32) -> Option<String> {
		if row >= self.line_count() {
			return None;
		}
		let line = self.rope.line(row as usize);
		let mut text: String = line.chars().collect();
		if text.ends_with('\n') {
			text.pop();
			if text.ends_with('\r') {
				text.pop();
			}
		}
		Some(text)
	}

	/// The line ending of `row`: `"\n"`, `"\r\n"`, or `""` on the final row.
	pub fn line_ending_for_row(&self, row: u32) -> Option<&'static str> {
		if row >= self.line_count() {
			return None;
		}
		let line = self.rope.line(row as usize);
		let len = line.len_chars();
		if len == 0 || line.char(len - 1) != '\n' {
			return Some("");
		}
		if len >= 2 && line.char(len - 2) == '\r' {
			Some("\r\n")
		} else {
			Some("\n")
		}
	}

	/// Character length of `row`, excluding the line ending.
	pub fn line_length_for_row(&self, row: u32) -> Option<u32> {
		self.line_for_row(row).map(|line| line.chars().count() as u32)
	}

	pub fn is_row_blank(&self, row: u32) -> bool {
		self.line_for_row(row)
			.is_some_and(|line| line.chars().all(char::is_whitespace))
	}

	/// First non-blank row strictly after `row`.
	pub fn next_non_blank_row(&self, row: u32) -> Option<u32> {
		((row + 1)..self.line_count()).find(|&candidate| !self.is_row_blank(candidate))
	}

	/// Last non-blank row strictly before `row`.
	pub fn previous_non_blank_row(&self, row: u32) -> Option<u32> {
		(0..row.min(self.line_count())).rev().find(|&candidate| !self.is_row_blank(candidate))
	}

	pub fn text(&self) -> String {
		self.rope.to_string()
	}

	pub fn get_text_in_range(&self, range: Range) -> String {
		let range = self.clip_range(range);
		let start = self.char_index(range.start);
		let end = self.char_index(range.end);
		self.rope.slice(start..end).to_string()
	}

	/// Clamps `position` to a valid row and a valid column on that row.
	pub fn clip_position(&self, position: Point) -> Point {
		let row = position.row.min(self.last_row());
		let line_length = self.line_length_for_row(row).unwrap_or(0);
		Point::new(row, position.column.min(line_length))
	}

	fn clip_range(&self, range: Range) -> Range {
		Range::new(self.clip_position(range.start), self.clip_position(range.end)).ordered()
	}

	fn char_index(&self, position: Point) -> usize {
		self.rope.line_to_char(position.row as usize) + position.column as usize
	}

	/// Replaces `range` with `new_text` and describes the edit.
	///
	/// The returned change carries the clipped replaced region and the
	/// region the inserted text occupies in post-edit coordinates.
	pub fn set_text_in_range(&mut self, range: Range, new_text: &str) -> TextChange {
		let old_range = self.clip_range(range);
		let start = self.char_index(old_range.start);
		let end = self.char_index(old_range.end);

		let old_text = self.rope.slice(start..end).to_string();
		self.rope.remove(start..end);
		self.rope.insert(start, new_text);
		self.change_count += 1;

		let new_range = Range::new(
			old_range.start,
			old_range.start.traverse(Point::extent_of(new_text)),
		);
		tracing::trace!(
			old = %old_range,
			new = %new_range,
			change_count = self.change_count,
			"buffer edited"
		);

		TextChange {
			old_range,
			new_range,
			old_text,
			new_text: new_text.to_string(),
		}
	}
}

impl fmt::Debug for TextBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TextBuffer")
			.field("id", &self.id)
			.field("path", &self.path)
			.field("line_count", &self.line_count())
			.field("alive", &self.alive)
			.finish()
	}
}
