//! The key/value channel that keeps parameters in sync with the host.

use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Parameter names shared with the host.
pub mod names {
    pub const TABLE: &str = "table";
    pub const FILTER: &str = "filter";
    pub const FILTER_ERROR: &str = "filter_error";
    pub const GROUP_COLUMNS: &str = "group_columns";
    pub const SELECTED: &str = "selected";
    pub const CANVAS_SPEC: &str = "canvas_spec";
}

/// A value as it travels over the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncValue {
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl SyncValue {
    fn kind(&self) -> String {
        match self {
            SyncValue::Bytes(b) => format!("{} bytes", b.len()),
            SyncValue::Json(v) => format!("JSON {v}"),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, SyncValue::Json(serde_json::Value::Null))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("expected {expected}, got {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: String,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("channel rejected {name}: {reason}")]
    Rejected { name: String, reason: String },
}

/// Conversion between a parameter's Rust type and its [`SyncValue`] form.
pub trait Syncable: Sized {
    fn to_sync(&self) -> Result<SyncValue, SyncError>;

    /// `Ok(None)` means "no value" (JSON `null`).
    fn from_sync(value: &SyncValue) -> Result<Option<Self>, SyncError>;
}

impl Syncable for String {
    fn to_sync(&self) -> Result<SyncValue, SyncError> {
        Ok(SyncValue::Json(serde_json::Value::String(self.clone())))
    }

    fn from_sync(value: &SyncValue) -> Result<Option<Self>, SyncError> {
        match value {
            SyncValue::Json(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            v if v.is_null() => Ok(None),
            other => Err(SyncError::UnexpectedValue {
                expected: "a string",
                actual: other.kind(),
            }),
        }
    }
}

impl Syncable for Vec<String> {
    fn to_sync(&self) -> Result<SyncValue, SyncError> {
        Ok(SyncValue::Json(serde_json::to_value(self)?))
    }

    fn from_sync(value: &SyncValue) -> Result<Option<Self>, SyncError> {
        match value {
            SyncValue::Json(json) if !json.is_null() => {
                Ok(Some(serde_json::from_value(json.clone())?))
            }
            v if v.is_null() => Ok(None),
            other => Err(SyncError::UnexpectedValue {
                expected: "a list of strings",
                actual: other.kind(),
            }),
        }
    }
}

impl Syncable for Bytes {
    fn to_sync(&self) -> Result<SyncValue, SyncError> {
        Ok(SyncValue::Bytes(self.clone()))
    }

    fn from_sync(value: &SyncValue) -> Result<Option<Self>, SyncError> {
        match value {
            SyncValue::Bytes(b) => Ok(Some(b.clone())),
            v if v.is_null() => Ok(None),
            other => Err(SyncError::UnexpectedValue {
                expected: "a byte buffer",
                actual: other.kind(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type ObserverFn = Rc<dyn Fn(&SyncValue)>;

/// The host side of parameter sync.
///
/// Implementations must not call observers for values committed through [`commit`](Self::commit);
/// observers only see changes that originate on the host.
pub trait SyncChannel {
    fn get(&self, name: &str) -> Option<SyncValue>;

    /// Set `name` and save it to the host.
    fn commit(&self, name: &str, value: SyncValue) -> Result<(), SyncError>;

    fn observe(&self, name: &str, callback: ObserverFn) -> ObserverId;

    fn unobserve(&self, id: ObserverId);
}

/// An in-process [`SyncChannel`], used for tests and for embedding without a host.
#[derive(Default)]
pub struct InMemoryChannel {
    values: RefCell<HashMap<String, SyncValue>>,
    observers: RefCell<Vec<(ObserverId, String, ObserverFn)>>,
    commits: RefCell<Vec<(String, SyncValue)>>,
    next_id: Cell<u64>,
}

impl fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("values", &self.values.borrow())
            .field("observers", &self.observers.borrow().len())
            .field("commits", &self.commits.borrow().len())
            .finish()
    }
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without notifying anyone, as if the host had it before the view connected.
    pub fn with_value(self, name: &str, value: SyncValue) -> Self {
        self.values.borrow_mut().insert(name.to_owned(), value);
        self
    }

    /// Simulate a change made on the host: store it and notify observers of `name`.
    pub fn push_external(&self, name: &str, value: SyncValue) {
        self.values
            .borrow_mut()
            .insert(name.to_owned(), value.clone());
        let callbacks: Vec<ObserverFn> = self
            .observers
            .borrow()
            .iter()
            .filter(|(_, n, _)| n == name)
            .map(|(_, _, cb)| Rc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Every value committed from the local side, oldest first.
    pub fn commits(&self) -> Vec<(String, SyncValue)> {
        self.commits.borrow().clone()
    }

    pub fn commits_for(&self, name: &str) -> Vec<SyncValue> {
        self.commits
            .borrow()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

impl SyncChannel for InMemoryChannel {
    fn get(&self, name: &str) -> Option<SyncValue> {
        self.values.borrow().get(name).cloned()
    }

    fn commit(&self, name: &str, value: SyncValue) -> Result<(), SyncError> {
        self.values
            .borrow_mut()
            .insert(name.to_owned(), value.clone());
        self.commits.borrow_mut().push((name.to_owned(), value));
        Ok(())
    }

    fn observe(&self, name: &str, callback: ObserverFn) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.observers
            .borrow_mut()
            .push((id, name.to_owned(), callback));
        id
    }

    fn unobserve(&self, id: ObserverId) {
        self.observers.borrow_mut().retain(|(oid, _, _)| *oid != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn commits_are_not_echoed_to_observers() {
        let channel = InMemoryChannel::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        channel.observe(names::FILTER, Rc::new(move |_| counter.set(counter.get() + 1)));

        channel
            .commit(names::FILTER, SyncValue::Json(json!("x")))
            .unwrap();
        assert_eq!(hits.get(), 0);

        channel.push_external(names::FILTER, SyncValue::Json(json!("y")));
        channel.push_external(names::GROUP_COLUMNS, SyncValue::Json(json!([])));
        assert_eq!(hits.get(), 1);
        assert_eq!(
            channel.get(names::FILTER),
            Some(SyncValue::Json(json!("y")))
        );
        assert_eq!(channel.commits_for(names::FILTER).len(), 1);
    }

    #[test]
    fn syncable_conversions() {
        let cols = vec!["a".to_owned(), "b".to_owned()];
        let value = cols.to_sync().unwrap();
        assert_eq!(value, SyncValue::Json(json!(["a", "b"])));
        assert_eq!(Vec::<String>::from_sync(&value).unwrap(), Some(cols));

        assert_eq!(String::from_sync(&SyncValue::Json(json!(null))).unwrap(), None);
        assert!(String::from_sync(&SyncValue::Json(json!(3))).is_err());
        assert!(Vec::<String>::from_sync(&SyncValue::Json(json!([1]))).is_err());
        assert!(Bytes::from_sync(&SyncValue::Json(json!("x"))).is_err());
    }
}
