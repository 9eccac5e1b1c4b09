//! The `store` crate contains an observable key-path state store.
//!
//! State lives in a persistent tree addressed by dot-delimited paths such as
//! `"case.primaryColor"`. Updates replace a single subtree and synchronously notify every
//! subscriber whose path is related to the changed one, i.e. one of the two paths is a
//! prefix of the other.

mod value;

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use log::debug;
use serde::{de::DeserializeOwned, Serialize};

pub use value::Value;

use value::ReplaceError;

/// A callback invoked with the changed path and the state after the change.
type Callback = Rc<dyn Fn(&str, &Snapshot)>;

/// An observable state store.
///
/// Cloning a store yields another handle to the same state. Dispatch is synchronous and runs
/// callbacks in registration order. Callbacks may update the store again, which recurses
/// synchronously; guarding against unbounded recursion is up to the caller.
#[derive(Clone)]
pub struct Store {
    inner: Rc<RefCell<Inner>>,
}

struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

struct Subscriber {
    id: u64,
    path: Vec<String>,
    callback: Callback,
}

impl Store {
    /// Creates a new store holding the given initial state.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the state cannot be serialized into a table.
    pub fn new(initial: &impl Serialize) -> Result<Self, Error> {
        let root: Value = toml::Value::try_from(initial)?.into();
        if !matches!(root, Value::Table(_)) {
            return Err(Error::NotATable(String::new()));
        }

        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                root,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        })
    }

    /// Returns a read-only snapshot of the current state.
    #[must_use]
    pub fn get_state(&self) -> Snapshot {
        Snapshot {
            root: self.inner.borrow().root.clone(),
        }
    }

    /// Replaces the value at the given path and notifies related subscribers.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the path is malformed, runs through a non-table value or the
    /// value cannot be serialized.
    pub fn update_state<T: Serialize>(&self, path: &str, value: T) -> Result<(), Error> {
        self.set_value(path, toml::Value::try_from(value)?.into())
    }

    /// Replaces the value at the given path with an already converted value.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the path is malformed or runs through a non-table value.
    pub fn set_value(&self, path: &str, value: Value) -> Result<(), Error> {
        let segments = segments(path)?;

        let (snapshot, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            inner.root = inner
                .root
                .replaced(&segments, value)
                .map_err(|ReplaceError::NotATable(depth)| {
                    Error::NotATable(segments[..depth].join("."))
                })?;

            let callbacks: Vec<_> = inner
                .subscribers
                .iter()
                .filter(|subscriber| related(&subscriber.path, &segments))
                .map(|subscriber| subscriber.callback.clone())
                .collect();

            (
                Snapshot {
                    root: inner.root.clone(),
                },
                callbacks,
            )
        };

        debug!("Dispatching `{path}` to {} subscribers", callbacks.len());
        for callback in callbacks {
            callback(path, &snapshot);
        }

        Ok(())
    }

    /// Subscribes to changes of the given path, its ancestors and its descendants.
    ///
    /// An empty path subscribes to every change. The subscription lasts until the returned
    /// handle is dropped or [`Subscription::unsubscribe`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path contains empty segments.
    pub fn subscribe(
        &self,
        path: &str,
        callback: impl Fn(&str, &Snapshot) + 'static,
    ) -> Result<Subscription, Error> {
        let path = if path.is_empty() {
            Vec::new()
        } else {
            segments(path)?.into_iter().map(str::to_owned).collect()
        };

        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            path,
            callback: Rc::new(callback),
        });

        Ok(Subscription {
            id,
            inner: Rc::downgrade(&self.inner),
        })
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// A handle to an active subscription, unsubscribing when dropped.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<RefCell<Inner>>,
}

impl Subscription {
    /// Ends the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .borrow_mut()
                .subscribers
                .retain(|subscriber| subscriber.id != self.id);
        }
    }
}

/// A read-only view of the state at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    root: Value,
}

impl Snapshot {
    /// Returns the root of the state tree.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Returns the value at the given path, an empty path returns the root.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        let segments = segments(path).ok()?;

        self.root.get_segments(&segments)
    }

    /// Deserializes the value at the given path, an empty path reads the whole state.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if there is no value at the path or it has the wrong shape.
    pub fn read<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let value = self
            .get(path)
            .ok_or_else(|| Error::Missing(path.to_owned()))?;

        Ok(value.to_toml().try_into()?)
    }
}

/// Splits a path into its segments.
fn segments(path: &str) -> Result<Vec<&str>, Error> {
    let segments: Vec<_> = path.split('.').collect();

    if segments.iter().any(|segment| segment.is_empty()) {
        Err(Error::InvalidPath(path.to_owned()))
    } else {
        Ok(segments)
    }
}

/// Returns true if one of the paths is a prefix of the other.
fn related(subscribed: &[String], changed: &[&str]) -> bool {
    subscribed
        .iter()
        .zip(changed)
        .all(|(subscribed, changed)| subscribed == changed)
}

/// The error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path is empty or contains empty segments.
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    /// The value at the given path is not a table and cannot have children.
    #[error("value at `{0}` is not a table")]
    NotATable(String),
    /// There is no value at the given path.
    #[error("no value at `{0}`")]
    Missing(String),
    /// Failed to serialize a value.
    #[error("failed to serialize value")]
    Serialize(#[from] toml::ser::Error),
    /// Failed to deserialize a value.
    #[error("failed to deserialize value")]
    Deserialize(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Case {
        primary_color: String,
        layout: String,
    }

    #[derive(Serialize, Deserialize)]
    struct State {
        case: Case,
        volume: i64,
    }

    fn store() -> Store {
        Store::new(&State {
            case: Case {
                primary_color: "#eeeeee".to_owned(),
                layout: "tkl".to_owned(),
            },
            volume: 3,
        })
        .unwrap()
    }

    fn counter(store: &Store, path: &str) -> (Rc<Cell<usize>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let subscription = store
            .subscribe(path, {
                let count = count.clone();
                move |_, _| count.set(count.get() + 1)
            })
            .unwrap();

        (count, subscription)
    }

    #[test]
    fn update_replaces_leaf() {
        let store = store();
        store.update_state("case.primaryColor", "#ff0000").unwrap();

        let color: String = store.get_state().read("case.primaryColor").unwrap();
        assert_eq!(color, "#ff0000");
        let layout: String = store.get_state().read("case.layout").unwrap();
        assert_eq!(layout, "tkl");
    }

    #[test]
    fn snapshots_are_immutable() {
        let store = store();
        let before = store.get_state();
        store.update_state("volume", 7).unwrap();

        assert_eq!(before.read::<i64>("volume").unwrap(), 3);
        assert_eq!(store.get_state().read::<i64>("volume").unwrap(), 7);
    }

    #[test]
    fn prefix_matching_is_bidirectional() {
        let store = store();
        let (parent, _parent_subscription) = counter(&store, "case");
        let (leaf, _leaf_subscription) = counter(&store, "case.primaryColor");
        let (other, _other_subscription) = counter(&store, "volume");
        let (all, _all_subscription) = counter(&store, "");

        store.update_state("case.primaryColor", "#ff0000").unwrap();
        assert_eq!((parent.get(), leaf.get(), other.get(), all.get()), (1, 1, 0, 1));

        store
            .update_state(
                "case",
                Case {
                    primary_color: "#00ff00".to_owned(),
                    layout: "60".to_owned(),
                },
            )
            .unwrap();
        assert_eq!((parent.get(), leaf.get(), other.get(), all.get()), (2, 2, 0, 2));

        store.update_state("case.layout", "65").unwrap();
        assert_eq!((parent.get(), leaf.get(), other.get(), all.get()), (3, 2, 0, 3));
    }

    #[test]
    fn segments_are_matched_whole() {
        let store = store();
        let (count, _subscription) = counter(&store, "cas");

        store.update_state("case.layout", "60").unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let store = store();
        let order = Rc::new(RefCell::new(Vec::new()));

        let subscriptions: Vec<_> = (0..3)
            .map(|index| {
                let order = order.clone();
                store
                    .subscribe("case", move |_, _| order.borrow_mut().push(index))
                    .unwrap()
            })
            .collect();

        store.update_state("case.layout", "60").unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        drop(subscriptions);
    }

    #[test]
    fn callbacks_see_the_new_state() {
        let store = store();
        let seen = Rc::new(RefCell::new(String::new()));
        let _subscription = store
            .subscribe("case.primaryColor", {
                let seen = seen.clone();
                move |path, snapshot| {
                    assert_eq!(path, "case.primaryColor");
                    *seen.borrow_mut() = snapshot.read("case.primaryColor").unwrap();
                }
            })
            .unwrap();

        store.update_state("case.primaryColor", "#123456").unwrap();
        assert_eq!(*seen.borrow(), "#123456");
    }

    #[test]
    fn callbacks_may_update_recursively() {
        let store = store();
        let _subscription = store
            .subscribe("case.layout", {
                let store = store.clone();
                move |_, snapshot| {
                    if snapshot.read::<i64>("volume").unwrap() < 5 {
                        store.update_state("volume", 5).unwrap();
                    }
                }
            })
            .unwrap();

        store.update_state("case.layout", "60").unwrap();
        assert_eq!(store.get_state().read::<i64>("volume").unwrap(), 5);
    }

    #[test]
    fn unsubscribing_stops_notifications() {
        let store = store();
        let (count, subscription) = counter(&store, "case");

        store.update_state("case.layout", "60").unwrap();
        subscription.unsubscribe();
        store.update_state("case.layout", "65").unwrap();

        assert_eq!(count.get(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let store = store();

        assert!(matches!(
            store.update_state("", 1),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            store.update_state("case..layout", 1),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            store.update_state("volume.level", 1),
            Err(Error::NotATable(path)) if path == "volume"
        ));
    }

    #[test]
    fn reading_missing_values_fails() {
        let store = store();

        assert!(matches!(
            store.get_state().read::<String>("case.material"),
            Err(Error::Missing(_))
        ));
        assert!(matches!(
            store.get_state().read::<i64>("case.layout"),
            Err(Error::Deserialize(_))
        ));
    }
}
