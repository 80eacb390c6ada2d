use std::sync::Arc;

/// A dotted scope selector.
///
/// `.a.b.c` (the leading dot is optional) matches any scope name whose
/// dotted components are a superset of `{a, b, c}`. Whitespace separates
/// alternatives: `.comment .string` matches if either alternative does.
/// Matching against a scope stack succeeds when any scope in the stack
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSelector {
	alternatives: Vec<Vec<String>>,
}

impl ScopeSelector {
	pub fn parse(source: &str) -> Self {
		let alternatives = source
			.split_whitespace()
			.map(|alternative| {
				alternative
					.trim_start_matches('.')
					.split('.')
					.filter(|component| !component.is_empty())
					.map(str::to_string)
					.collect::<Vec<_>>()
			})
			.filter(|components: &Vec<String>| !components.is_empty())
			.collect();
		Self { alternatives }
	}

	/// Whether a single scope name satisfies the selector.
	pub fn matches_scope(&self, scope: &str) -> bool {
		let components: Vec<&str> = scope.split('.').collect();
		self.alternatives.iter().any(|alternative| {
			alternative
				.iter()
				.all(|required| components.contains(&required.as_str()))
		})
	}

	/// Whether any scope in the stack satisfies the selector.
	pub fn matches_stack(&self, scopes: &[Arc<str>]) -> bool {
		scopes.iter().any(|scope| self.matches_scope(scope))
	}

	/// True when the selector has no usable alternatives.
	pub fn is_empty(&self) -> bool {
		self.alternatives.is_empty()
	}
}
