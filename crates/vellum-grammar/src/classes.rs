use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

static CLASS_CACHE: OnceLock<Mutex<HashMap<String, Arc<str>>>> = OnceLock::new();

/// CSS class string for a scope name: `a.b.c` becomes
/// `"syntax--a syntax--b syntax--c"`.
///
/// The mapping is cached process-wide; its size is bounded by the scope
/// vocabulary of the loaded grammars, so entries are never evicted.
pub fn class_name_for_scope(scope: &str) -> Arc<str> {
	let cache = CLASS_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
	let mut cache = cache.lock();
	if let Some(class) = cache.get(scope) {
		return class.clone();
	}
	let class: Arc<str> = scope
		.split('.')
		.filter(|component| !component.is_empty())
		.map(|component| format!("syntax--{component}"))
		.collect::<Vec<_>>()
		.join(" ")
		.into();
	cache.insert(scope.to_string(), class.clone());
	class
}
