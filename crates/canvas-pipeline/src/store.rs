//! Subscribable value containers.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct StoreInner<T> {
    value: T,
    subscribers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
}

/// A shared, single-threaded value with change subscribers.
///
/// Subscribers are invoked outside of any internal borrow, so a subscriber may read the store or
/// write to other stores.
pub struct Store<T> {
    inner: Rc<RefCell<StoreInner<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("value", &self.inner.borrow().value)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                value,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.replace(value);
        self.notify();
    }

    /// Replace the value without notifying anyone.
    pub(crate) fn replace(&self, value: T) -> T {
        std::mem::replace(&mut self.inner.borrow_mut().value, value)
    }

    pub(crate) fn notify(&self) {
        let (value, subscribers) = {
            let inner = self.inner.borrow();
            let subscribers: Vec<Subscriber<T>> =
                inner.subscribers.iter().map(|(_, s)| Rc::clone(s)).collect();
            (inner.value.clone(), subscribers)
        };
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    /// Register `f`; it runs once right away with the current value and again after every change.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let subscriber: Subscriber<T> = Rc::new(f);
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::clone(&subscriber)));
            id
        };

        let value = self.get();
        subscriber(&value);

        let weak: Weak<RefCell<StoreInner<T>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub(crate) fn downgrade(&self) -> WeakStore<T> {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

pub(crate) struct WeakStore<T> {
    inner: Weak<RefCell<StoreInner<T>>>,
}

impl<T> WeakStore<T> {
    pub(crate) fn upgrade(&self) -> Option<Store<T>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Handle returned by `subscribe`; dropping it (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the subscriber.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A read-only view of a store whose value is computed by the pipeline.
pub struct Derived<T> {
    store: Store<T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.store).finish()
    }
}

impl<T: Clone + 'static> Derived<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            store: Store::new(value),
        }
    }

    pub fn get(&self) -> T {
        self.store.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.store.with(f)
    }

    /// Runs `f` now and after every recompute of this value.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.store.subscribe(f)
    }

    pub(crate) fn set(&self, value: T) {
        self.store.set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn subscribe_fires_immediately_then_on_change() {
        let store = Store::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = store.subscribe(move |v| sink.borrow_mut().push(*v));

        store.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);

        sub.unsubscribe();
        store.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn subscribers_may_read_the_store() {
        let store = Store::new(String::from("a"));
        let reader = store.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = store.subscribe(move |_| sink.borrow_mut().push(reader.get()));
        store.set("b".into());
        assert_eq!(*seen.borrow(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let store = Store::new(0);
        {
            let _sub = store.subscribe(|_| {});
            assert_eq!(store.subscriber_count(), 1);
        }
        assert_eq!(store.subscriber_count(), 0);
    }
}
