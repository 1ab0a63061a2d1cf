use crate::channel::{ObserverId, SyncChannel, SyncValue, Syncable};
use crate::store::{Store, Subscription};
use log::warn;
use std::fmt;
use std::rc::Rc;

/// A named parameter mirrored to the host through a [`SyncChannel`].
///
/// Local writes update the value, commit it to the channel and then notify subscribers. Values
/// pushed by the host overwrite the local value and notify subscribers without being committed
/// back.
pub struct SyncedCell<T: Syncable + Clone + 'static> {
    name: String,
    initial: T,
    store: Store<T>,
    channel: Rc<dyn SyncChannel>,
    observer: Option<ObserverId>,
}

impl<T: Syncable + Clone + fmt::Debug + 'static> fmt::Debug for SyncedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedCell")
            .field("name", &self.name)
            .field("value", &self.store.get())
            .finish_non_exhaustive()
    }
}

impl<T: Syncable + Clone + 'static> SyncedCell<T> {
    /// Link a cell to `name` on `channel`, starting from the channel's value when it has one.
    pub fn new(name: impl Into<String>, initial: T, channel: Rc<dyn SyncChannel>) -> Self {
        let name = name.into();
        let start = channel
            .get(&name)
            .and_then(|value| decode::<T>(&name, &value))
            .unwrap_or_else(|| initial.clone());
        let store = Store::new(start);

        let weak = store.downgrade();
        let observed_name = name.clone();
        let fallback = initial.clone();
        let observer = channel.observe(
            &name,
            Rc::new(move |value: &SyncValue| {
                let Some(store) = weak.upgrade() else {
                    return;
                };
                if let Some(next) = decode_or_reset::<T>(&observed_name, value, &fallback) {
                    store.set(next);
                }
            }),
        );

        Self {
            name,
            initial,
            store,
            channel,
            observer: Some(observer),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> T {
        self.store.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.store.with(f)
    }

    /// Overwrite the value, commit it to the channel and notify subscribers.
    pub fn set(&self, value: T) {
        self.store.replace(value.clone());
        if self.observer.is_some() {
            match value.to_sync() {
                Ok(sync) => {
                    if let Err(err) = self.channel.commit(&self.name, sync) {
                        warn!("failed to commit {}: {err}", self.name);
                    }
                }
                Err(err) => warn!("failed to encode {}: {err}", self.name),
            }
        }
        self.store.notify();
    }

    /// `set(f(current))`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.store.with(f);
        self.set(next);
    }

    /// Runs `f` now and after every change, local or external.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        self.store.subscribe(f)
    }

    pub fn initial(&self) -> &T {
        &self.initial
    }

    /// Unlink from the channel. Later writes stay local.
    pub fn unlink(&mut self) {
        if let Some(id) = self.observer.take() {
            self.channel.unobserve(id);
        }
    }

    pub fn is_linked(&self) -> bool {
        self.observer.is_some()
    }
}

impl<T: Syncable + Clone + 'static> Drop for SyncedCell<T> {
    fn drop(&mut self) {
        self.unlink();
    }
}

fn decode<T: Syncable>(name: &str, value: &SyncValue) -> Option<T> {
    match T::from_sync(value) {
        Ok(value) => value,
        Err(err) => {
            warn!("ignoring undecodable value for {name}: {err}");
            None
        }
    }
}

/// Decode an external value. `null` resets to `fallback`; undecodable values are ignored.
fn decode_or_reset<T: Syncable + Clone>(name: &str, value: &SyncValue, fallback: &T) -> Option<T> {
    match T::from_sync(value) {
        Ok(Some(value)) => Some(value),
        Ok(None) => Some(fallback.clone()),
        Err(err) => {
            warn!("ignoring undecodable value for {name}: {err}");
            None
        }
    }
}
