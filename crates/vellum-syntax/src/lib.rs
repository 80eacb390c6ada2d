//! Incremental syntax tokenization over a line-oriented buffer.
//!
//! [`TokenizedBuffer`] maintains, under arbitrary edits, a per-row cache of
//! [`TokenizedLine`]s and a sorted set of invalid rows, and re-tokenizes
//! invalid rows in bounded cooperative chunks until rule-stack propagation
//! reaches a fixed point.
//!
//! # Mental model
//!
//! - Terms: tag stream (interleaved span lengths and scope open/close tags),
//!   rule stack (the grammar's opaque continuation at a line boundary),
//!   chunk (one bounded unit of background work), spill (invalidation of the
//!   row after an edit whose end stack changed), fixed point (the row where a
//!   rebuilt stack equals the cached one, stopping propagation).
//! - Lifecycle in one sentence: edits splice the cache and rebase invalid
//!   rows, the host pumps [`TokenizedBuffer::tick`] to drain invalid rows in
//!   chunks, and queries fall back to placeholder lines for rows the drain
//!   has not reached.
//!
//! # Invariants
//!
//! 1. The cache length equals the buffer's line count after every edit.
//! 2. Invalid rows are sorted, unique, and within `[0, last_row]`.
//! 3. For adjacent tokenized rows, the later row's start-of-line scopes are
//!    the fold of the earlier row's scopes over its tags, and the earlier
//!    row's rule stack is the later row's tokenization input.
//! 4. `did-tokenize` fires exactly once per transition into the fully
//!    tokenized state.

mod fold;
mod invalid_rows;
mod report;
mod serialization;
mod tokenized_buffer;
mod tokenized_line;

pub use fold::{FoldError, scopes_from_tags};
pub use invalid_rows::InvalidRowSet;
pub use report::{AssertionMetadata, AssertionReporter, TracingReporter};
pub use serialization::{DESERIALIZER_NAME, TokenizedBufferState};
pub use tokenized_buffer::{
	DEFAULT_CHUNK_SIZE, ScopeDescriptor, TokenizedBuffer, TokenizedBufferOptions,
	indent_level_for_line,
};
pub use tokenized_line::{Token, TokenizedLine};
