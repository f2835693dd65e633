use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ObserverInner<T> {
	label: &'static str,
	next_id: AtomicU64,
	entries: RwLock<Vec<(u64, Callback<T>)>>,
}

impl<T> ObserverInner<T> {
	fn remove(&self, id: u64) -> bool {
		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|(entry_id, _)| *entry_id != id);
		entries.len() != before
	}
}

/// Ordered list of observers for values of type `T`.
///
/// Observers are invoked synchronously in registration order. The list is
/// snapshotted before delivery, so observers may subscribe or unsubscribe
/// from inside a callback; changes take effect on the next notification.
/// A panicking observer is isolated: the panic is logged and delivery
/// continues with the next observer.
pub struct ObserverList<T> {
	inner: Arc<ObserverInner<T>>,
}

impl<T> Clone for ObserverList<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: 'static> std::fmt::Debug for ObserverList<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObserverList")
			.field("label", &self.inner.label)
			.field("observers", &self.len())
			.finish()
	}
}

/// Delivery summary for one [`ObserverList::notify`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
	pub delivered: usize,
	pub faulted: usize,
}

impl<T: 'static> ObserverList<T> {
	/// Creates an empty list. `label` names the list in fault logs.
	pub fn new(label: &'static str) -> Self {
		Self {
			inner: Arc::new(ObserverInner {
				label,
				next_id: AtomicU64::new(0),
				entries: RwLock::new(Vec::new()),
			}),
		}
	}

	/// Registers an observer.
	///
	/// The observer stays registered until the returned handle is dropped or
	/// [`Subscription::unsubscribe`] is called.
	#[must_use = "dropping the subscription unsubscribes the observer"]
	pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
		let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
		self.inner.entries.write().push((id, Arc::new(observer)));

		let weak: Weak<ObserverInner<T>> = Arc::downgrade(&self.inner);
		Subscription::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner.remove(id);
			}
		})
	}

	/// Number of registered observers.
	pub fn len(&self) -> usize {
		self.inner.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Delivers `value` to every registered observer.
	pub fn notify(&self, value: &T) -> NotifyReport {
		let snapshot: Vec<(u64, Callback<T>)> = self.inner.entries.read().iter().map(|(id, cb)| (*id, Arc::clone(cb))).collect();

		let mut report = NotifyReport::default();
		for (id, observer) in snapshot {
			match catch_unwind(AssertUnwindSafe(|| observer(value))) {
				Ok(()) => report.delivered += 1,
				Err(payload) => {
					report.faulted += 1;
					tracing::error!(
						observers = self.inner.label,
						observer = id,
						panic = %panic_message(payload.as_ref()),
						"observer.fault"
					);
				}
			}
		}
		report
	}
}

/// Handle owning one observer registration.
///
/// Dropping the handle unsubscribes the observer.
pub struct Subscription {
	remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
	/// Creates a handle that runs `remove` exactly once on unsubscribe or drop.
	pub fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			remove: Some(Box::new(remove)),
		}
	}

	/// Unsubscribes immediately.
	pub fn unsubscribe(mut self) {
		if let Some(remove) = self.remove.take() {
			remove();
		}
	}

	/// Keeps the observer registered for the lifetime of its list.
	pub fn detach(mut self) {
		self.remove = None;
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(remove) = self.remove.take() {
			remove();
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.remove.is_some()).finish()
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
