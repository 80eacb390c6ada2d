//! Line-oriented text buffer.
//!
//! [`TextBuffer`] wraps a rope and exposes the row/column surface the
//! tokenization layer consumes: line access, blank-row navigation, position
//! clipping, and edits that report the replaced and inserted regions so
//! downstream caches can rebase themselves.

mod buffer;
mod change;

pub use buffer::{BufferId, TextBuffer};
pub use change::TextChange;
