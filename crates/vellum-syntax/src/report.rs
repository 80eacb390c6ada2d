use std::path::PathBuf;
use std::sync::Arc;

/// Diagnostic context attached to an invariant-violation report.
#[derive(Debug, Clone)]
pub struct AssertionMetadata {
	/// Root scope of the active grammar.
	pub grammar_scope: String,
	/// Scope name of the unmatched close tag, when resolvable.
	pub unmatched_scope: Option<Arc<str>>,
	/// Path of the buffer being tokenized.
	pub buffer_path: Option<PathBuf>,
	/// Full buffer contents at the time of the violation.
	pub buffer_contents: String,
}

/// Sink for non-fatal invariant violations.
///
/// Violations are observable-only: the engine reports, abandons the
/// offending line's fold, and keeps running. Hosts inject their own
/// reporter to route diagnostics into crash reporting.
pub trait AssertionReporter {
	fn assertion_failed(&self, message: &str, metadata: &AssertionMetadata);
}

/// Default reporter: structured error log.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl AssertionReporter for TracingReporter {
	fn assertion_failed(&self, message: &str, metadata: &AssertionMetadata) {
		tracing::error!(
			grammar_scope = %metadata.grammar_scope,
			unmatched_scope = metadata.unmatched_scope.as_deref().unwrap_or("<unknown>"),
			buffer_path = ?metadata.buffer_path,
			buffer_bytes = metadata.buffer_contents.len(),
			"{message}"
		);
	}
}
