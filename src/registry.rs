/// file: src/registry.rs
/// description: category -> ordered subscriber list, with panic-isolated dispatch
use crate::types::Category;
use serde_json::Value;
use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::warn;

/// Subscriber callback. Identity is the `Arc` allocation, so registering a
/// clone of the same `Arc` twice under one category is a no-op.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wraps a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Entry {
    callback: Callback,
    // Cleared on removal so a snapshot taken before the removal skips it.
    active: Arc<AtomicBool>,
}

/// Result of delivering one payload to a category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub panicked: usize,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Mutex<HashMap<Category, Vec<Entry>>>,
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    // compare data pointers only; vtable pointers are not stable across codegen units
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Category, Vec<Entry>>> {
        // callbacks never run under this lock, so poisoning can only come from
        // a panic inside the registry itself; the map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when the pair was newly added.
    pub fn insert(&self, category: Category, callback: Callback) -> bool {
        let mut entries = self.lock();
        let list = entries.entry(category).or_default();
        if list.iter().any(|e| same_callback(&e.callback, &callback)) {
            return false;
        }
        list.push(Entry {
            callback,
            active: Arc::new(AtomicBool::new(true)),
        });
        true
    }

    /// Returns true when the pair was present.
    pub fn remove(&self, category: Category, callback: &Callback) -> bool {
        let mut entries = self.lock();
        let Some(list) = entries.get_mut(&category) else {
            return false;
        };
        let Some(pos) = list.iter().position(|e| same_callback(&e.callback, callback)) else {
            return false;
        };
        let entry = list.remove(pos);
        entry.active.store(false, Ordering::Release);
        if list.is_empty() {
            entries.remove(&category);
        }
        true
    }

    pub fn listener_count(&self, category: Category) -> usize {
        self.lock().get(&category).map_or(0, Vec::len)
    }

    /// Invokes every callback registered for `category`, in subscription order.
    ///
    /// The list is snapshotted and the lock released before any callback runs,
    /// so callbacks may subscribe or unsubscribe freely. A callback removed
    /// after the snapshot is skipped. A panicking callback is logged and the
    /// remaining callbacks still run.
    pub fn dispatch(&self, category: Category, payload: &Value) -> DispatchReport {
        let snapshot: Vec<(Callback, Arc<AtomicBool>)> = match self.lock().get(&category) {
            Some(list) => list
                .iter()
                .map(|e| (e.callback.clone(), e.active.clone()))
                .collect(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (callback, active) in snapshot {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => report.delivered += 1,
                Err(cause) => {
                    report.panicked += 1;
                    let reason = cause
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| cause.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    warn!(%category, %reason, "Subscriber panicked; continuing delivery");
                }
            }
        }
        report
    }
}

/// Handle returned by `subscribe`. Calling [`Subscription::unsubscribe`]
/// removes exactly the `(category, callback)` pair it was created for.
///
/// Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    category: Category,
    callback: Callback,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        category: Category,
        callback: Callback,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            category,
            callback,
            registry,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Idempotent.
    pub fn unsubscribe(&self) {
        self.registry.remove(self.category, &self.callback);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Callback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        (
            callback(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            hits,
        )
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let registry = SubscriberRegistry::new();
        let (cb, hits) = counter();

        assert!(registry.insert(Category::Market, cb.clone()));
        assert!(!registry.insert(Category::Market, cb.clone()));
        assert_eq!(registry.listener_count(Category::Market), 1);

        registry.dispatch(Category::Market, &json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_callback_may_join_several_categories() {
        let registry = SubscriberRegistry::new();
        let (cb, hits) = counter();

        assert!(registry.insert(Category::Market, cb.clone()));
        assert!(registry.insert(Category::User, cb.clone()));

        registry.dispatch(Category::Market, &Value::Null);
        registry.dispatch(Category::User, &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delivers_in_subscription_order() {
        let registry = SubscriberRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..4 {
            let order = order.clone();
            registry.insert(
                Category::Investment,
                callback(move |_| order.lock().unwrap().push(id)),
            );
        }

        registry.dispatch(Category::Investment, &Value::Null);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn remove_is_idempotent_and_scoped_to_category() {
        let registry = SubscriberRegistry::new();
        let (cb, hits) = counter();
        registry.insert(Category::Market, cb.clone());
        registry.insert(Category::User, cb.clone());

        assert!(registry.remove(Category::Market, &cb));
        assert!(!registry.remove(Category::Market, &cb));
        assert_eq!(registry.listener_count(Category::Market), 0);

        registry.dispatch(Category::Market, &Value::Null);
        registry.dispatch(Category::User, &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_stop_the_rest() {
        let registry = SubscriberRegistry::new();
        let (good, hits) = counter();
        registry.insert(Category::Market, callback(|_| panic!("widget exploded")));
        registry.insert(Category::Market, good);

        let report = registry.dispatch(Category::Market, &json!({"symbol": "BTC-USD"}));
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                panicked: 1
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_during_dispatch_skips_pending_callback() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (victim, hits) = counter();

        let reg = registry.clone();
        let target = victim.clone();
        registry.insert(
            Category::Notification,
            callback(move |_| {
                reg.remove(Category::Notification, &target);
            }),
        );
        registry.insert(Category::Notification, victim);

        let report = registry.dispatch(Category::Notification, &Value::Null);
        assert_eq!(report.delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscription_handle_unsubscribes_once() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (cb, hits) = counter();
        registry.insert(Category::Transaction, cb.clone());
        let handle = Subscription::new(Category::Transaction, cb, registry.clone());

        handle.unsubscribe();
        handle.unsubscribe();

        registry.dispatch(Category::Transaction, &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(handle.category(), Category::Transaction);
    }
}
