//! Single-threaded callback registry.
//!
//! The tokenization layer is cooperative and runs entirely on one thread, so
//! subscriptions are `Rc`-backed rather than `Arc`-backed. Emission is
//! re-entrancy safe: callbacks may subscribe or dispose while an emit is in
//! progress; new subscribers are not invoked until the next emit.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T)>;

struct Registry<T> {
	next_id: u64,
	entries: Vec<(u64, Callback<T>)>,
	/// Ids disposed while an emit had the entries checked out.
	dead: Vec<u64>,
}

impl<T> Registry<T> {
	fn purge(&mut self) {
		if !self.dead.is_empty() {
			let dead = std::mem::take(&mut self.dead);
			self.entries.retain(|(id, _)| !dead.contains(id));
		}
	}
}

/// An event source with explicit-dispose subscriptions.
pub struct Emitter<T> {
	registry: Rc<RefCell<Registry<T>>>,
}

impl<T: 'static> Default for Emitter<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: 'static> Emitter<T> {
	pub fn new() -> Self {
		Self {
			registry: Rc::new(RefCell::new(Registry {
				next_id: 0,
				entries: Vec::new(),
				dead: Vec::new(),
			})),
		}
	}

	/// Registers `callback` and returns its subscription handle.
	///
	/// Dropping the handle does NOT unsubscribe; call
	/// [`Subscription::dispose`] to detach. This mirrors how hosts hold
	/// long-lived listeners without keeping guard objects around.
	pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
		let id = {
			let mut registry = self.registry.borrow_mut();
			let id = registry.next_id;
			registry.next_id += 1;
			registry.entries.push((id, Box::new(callback)));
			id
		};
		let weak: Weak<RefCell<Registry<T>>> = Rc::downgrade(&self.registry);
		Subscription::new(move || {
			if let Some(registry) = weak.upgrade() {
				let mut registry = registry.borrow_mut();
				// The entry may be checked out by an in-progress emit; the
				// dead list covers that case and is drained afterwards.
				registry.dead.push(id);
				registry.entries.retain(|(entry_id, _)| *entry_id != id);
			}
		})
	}

	/// Invokes every live subscriber with `payload`.
	pub fn emit(&self, payload: &T) {
		// Check the entries out of the registry so callbacks can subscribe
		// or dispose without re-borrowing.
		let mut entries = std::mem::take(&mut self.registry.borrow_mut().entries);
		for (id, callback) in entries.iter_mut() {
			if self.registry.borrow().dead.contains(id) {
				continue;
			}
			callback(payload);
		}
		let mut registry = self.registry.borrow_mut();
		// Subscribers added during emission landed in the registry; keep both.
		entries.append(&mut registry.entries);
		registry.entries = entries;
		registry.purge();
	}

	pub fn subscriber_count(&self) -> usize {
		self.registry.borrow().entries.len()
	}

	/// Drops every subscriber.
	pub fn clear(&self) {
		let mut registry = self.registry.borrow_mut();
		registry.entries.clear();
		registry.dead.clear();
	}
}

/// Handle to a registered callback. Detach with [`dispose`](Self::dispose).
pub struct Subscription {
	cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	fn new(cancel: impl FnOnce() + 'static) -> Self {
		Self {
			cancel: Some(Box::new(cancel)),
		}
	}

	/// A subscription that is not attached to anything.
	pub fn empty() -> Self {
		Self { cancel: None }
	}

	/// Removes the callback from its emitter. Idempotent.
	pub fn dispose(mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("attached", &self.cancel.is_some())
			.finish()
	}
}
