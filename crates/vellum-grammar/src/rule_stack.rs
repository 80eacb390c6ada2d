use std::sync::Arc;

use crate::ScopeId;

/// One grammar rule activation.
///
/// `rule` is grammar-private (the delimiter grammar stores a rule index,
/// test grammars encode arbitrary state); `scope` is the scope the rule
/// opened, when it opened one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleFrame {
	pub rule: u32,
	pub scope: Option<ScopeId>,
}

impl RuleFrame {
	pub fn new(rule: u32, scope: Option<ScopeId>) -> Self {
		Self { rule, scope }
	}
}

/// Opaque grammar continuation at a line boundary.
///
/// The engine never inspects frames; it only clones stacks across lines and
/// compares them structurally. Equality of the stack produced for a row with
/// the stack previously cached there is the fixed-point test that bounds
/// incremental re-tokenization, so `PartialEq` here must be total and cheap.
/// Frames are `Arc`-shared: cloning a stack is a pointer copy, pushing or
/// popping copies the (shallow) frame slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleStack {
	frames: Arc<[RuleFrame]>,
}

impl RuleStack {
	pub fn new(frames: impl Into<Vec<RuleFrame>>) -> Self {
		Self {
			frames: frames.into().into(),
		}
	}

	/// A stack holding only the given root frame.
	pub fn root(frame: RuleFrame) -> Self {
		Self::new(vec![frame])
	}

	pub fn push(&self, frame: RuleFrame) -> Self {
		let mut frames = self.frames.to_vec();
		frames.push(frame);
		Self::new(frames)
	}

	pub fn pop(&self) -> Self {
		let mut frames = self.frames.to_vec();
		frames.pop();
		Self::new(frames)
	}

	pub fn top(&self) -> Option<&RuleFrame> {
		self.frames.last()
	}

	pub fn frames(&self) -> &[RuleFrame] {
		&self.frames
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}

	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}
