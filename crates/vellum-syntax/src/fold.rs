use thiserror::Error;
use vellum_grammar::tags;

/// An unmatched scope-close tag encountered while folding a tag stream.
///
/// Carries the stack as it stood when folding stopped so callers can keep
/// the partial result; the engine reports the violation and continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unmatched scope-close tag {tag}: scope stack underflow")]
pub struct FoldError {
	/// The close tag whose open was not on the stack.
	pub tag: i32,
	/// The partial scope stack at the point of failure.
	pub scopes: Vec<i32>,
}

/// Folds a tag stream over a starting scope stack, producing the scope
/// stack open at the end of the line.
///
/// Span tags are skipped; open tags push; a close tag pops until its
/// matching open surfaces, discarding mismatched entries on the way. An
/// empty stack before the match is an underflow: the partial stack comes
/// back inside [`FoldError`].
pub fn scopes_from_tags(starting_scopes: &[i32], line_tags: &[i32]) -> Result<Vec<i32>, FoldError> {
	let mut scopes = starting_scopes.to_vec();
	for &tag in line_tags {
		if tags::is_open(tag) {
			scopes.push(tag);
		} else if tags::is_close(tag) {
			let open = tags::open_for_close(tag);
			loop {
				match scopes.pop() {
					Some(top) if top == open => break,
					Some(_) => continue,
					None => {
						return Err(FoldError { tag, scopes });
					}
				}
			}
		}
	}
	Ok(scopes)
}
