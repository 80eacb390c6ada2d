use vellum_primitives::Range;

/// Description of one applied edit.
///
/// `old_range` addresses the replaced region in pre-edit coordinates,
/// `new_range` the inserted region in post-edit coordinates. Consumers that
/// maintain per-row caches use the row components to splice and rebase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
	pub old_range: Range,
	pub new_range: Range,
	pub old_text: String,
	pub new_text: String,
}

impl TextChange {
	/// Net row movement for rows below the edited region.
	pub fn row_delta(&self) -> i64 {
		i64::from(self.new_range.end.row) - i64::from(self.old_range.end.row)
	}
}
