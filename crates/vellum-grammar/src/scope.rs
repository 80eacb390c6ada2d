use std::collections::HashMap;
use std::sync::Arc;

use crate::tags;

/// Index of an interned scope name within one grammar's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
	pub fn new(index: u32) -> Self {
		Self(index)
	}

	pub fn index(self) -> u32 {
		self.0
	}
}

/// Per-grammar scope-name interner.
///
/// Ids are dense and stable for the lifetime of the registry; the same name
/// always interns to the same id, so open/close tags derived from a name are
/// stable as well.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
	names: Vec<Arc<str>>,
	ids: HashMap<Arc<str>, ScopeId>,
}

impl ScopeRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn intern(&mut self, name: &str) -> ScopeId {
		if let Some(&id) = self.ids.get(name) {
			return id;
		}
		let id = ScopeId::new(self.names.len() as u32);
		let shared: Arc<str> = Arc::from(name);
		self.names.push(shared.clone());
		self.ids.insert(shared, id);
		id
	}

	pub fn name(&self, id: ScopeId) -> Option<Arc<str>> {
		self.names.get(id.index() as usize).cloned()
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Interns `name` and returns its scope-open tag.
	pub fn start_tag(&mut self, name: &str) -> i32 {
		tags::open_tag(self.intern(name))
	}

	/// Interns `name` and returns its scope-close tag.
	pub fn end_tag(&mut self, name: &str) -> i32 {
		tags::close_tag(self.intern(name))
	}

	/// Resolves an open or close tag back to its scope name.
	pub fn name_for_tag(&self, tag: i32) -> Option<Arc<str>> {
		tags::scope_for_tag(tag).and_then(|id| self.name(id))
	}
}
