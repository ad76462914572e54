//! Selector-based change subscriptions.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::state::ConnectionState;

/// Type-erased notification entry. Each entry remembers its own last slice.
pub(crate) type Notify = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

/// Equality check deciding whether a selected slice changed.
pub type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Registered listeners in subscription order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Notify)>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, notify: Notify) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, notify));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        before != self.entries.len()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Copy of the entries, so callbacks can run without the lock held.
    pub(crate) fn snapshot(&self) -> Vec<(u64, Notify)> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Options of [`ConnectionStore::subscribe`](super::ConnectionStore::subscribe).
pub struct SubscribeOptions<T> {
    /// Call the listener once with the current slice (as both new and previous value)
    /// right after subscribing.
    pub emit_immediately: bool,
    /// Custom equality. Defaults to `PartialEq`.
    pub equality: Option<EqualityFn<T>>,
}

impl<T> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self {
            emit_immediately: false,
            equality: None,
        }
    }
}

impl<T> SubscribeOptions<T> {
    /// Emit the current slice right away.
    #[must_use]
    pub const fn emit_immediately(mut self) -> Self {
        self.emit_immediately = true;
        self
    }

    /// Use `equality` instead of `PartialEq` to detect changes.
    #[must_use]
    pub fn with_equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equality));
        self
    }
}

/// Builds the entry for a selector/listener pair, seeded with the slice of `current`.
pub(crate) fn selector_entry<T, S, L>(
    current: &ConnectionState,
    selector: S,
    listener: Arc<L>,
    equality: Option<EqualityFn<T>>,
) -> Notify
where
    T: Clone + PartialEq + Send + 'static,
    S: Fn(&ConnectionState) -> T + Send + Sync + 'static,
    L: Fn(&T, &T) + Send + Sync + 'static,
{
    let last = Mutex::new(selector(current));
    Arc::new(move |state: &ConnectionState| {
        let next = selector(state);
        let previous = {
            let mut last = last.lock();
            let unchanged = equality
                .as_ref()
                .map_or_else(|| *last == next, |equal| equal(&*last, &next));
            if unchanged {
                return;
            }
            std::mem::replace(&mut *last, next.clone())
        };
        // The slice lock is released here so the listener may update the store again.
        listener(&next, &previous);
    })
}

/// Handle returned by [`ConnectionStore::subscribe`](super::ConnectionStore::subscribe).
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(listeners: &Arc<Mutex<Listeners>>, id: u64) -> Self {
        Self {
            listeners: Arc::downgrade(listeners),
            id,
        }
    }

    /// Removes the listener. Safe to call repeatedly and after the store is gone.
    pub fn unsubscribe(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(self.id);
        }
    }

    /// Whether the listener is still registered with a live store.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|listeners| listeners.lock().contains(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, ChainConfig};

    fn state(chain_id: u64) -> ConnectionState {
        let config = ChainConfig::new(vec![Chain::new(chain_id, "test")], []).unwrap();
        ConnectionState::initial(&config)
    }

    #[test]
    fn test_entry_fires_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let entry = selector_entry(
            &state(1),
            |s: &ConnectionState| s.chain_id,
            Arc::new(move |next: &u64, previous: &u64| sink.lock().push((*next, *previous))),
            None,
        );

        entry(&state(1));
        entry(&state(137));
        entry(&state(137));
        entry(&state(1));
        assert_eq!(*seen.lock(), vec![(137, 1), (1, 137)]);
    }

    #[test]
    fn test_custom_equality() {
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);
        let same_parity: EqualityFn<u64> = Arc::new(|a: &u64, b: &u64| a % 2 == b % 2);
        let entry = selector_entry(
            &state(1),
            |s: &ConnectionState| s.chain_id,
            Arc::new(move |_: &u64, _: &u64| *sink.lock() += 1),
            Some(same_parity),
        );

        entry(&state(3));
        entry(&state(4));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_unsubscribe_after_drop_is_harmless() {
        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let id = listeners.lock().insert(Arc::new(|_: &ConnectionState| {}));
        let subscription = Subscription::new(&listeners, id);
        assert!(subscription.is_active());

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(listeners.lock().len(), 0);

        drop(listeners);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
