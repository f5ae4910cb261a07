#![forbid(unsafe_code)]

//! Observable component fields.
//!
//! A [`Field`] is the host-side cell a component keeps a setting's value in.
//! It stands in for the UI framework's reactive data: the binding reads and
//! assigns it, and watches it to write local edits back to storage.
//!
//! # Change kinds
//!
//! | Mutation | Notifies |
//! |----------|----------|
//! | [`Field::set`] (assignment) | every watcher |
//! | [`Field::splice_list`] (list contents replaced in place) | every watcher |
//! | [`Field::update`] (arbitrary in-place edit) | deep watchers only |
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. A mutation that leaves the value equal is a no-op: no version bump, no
//!    notifications.
//! 3. Watchers run in registration order, after the value has been stored
//!    and with no borrow held, so they may read or mutate the field.
//! 4. Dropping a [`Watch`] removes its watcher before the next notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value as Json;

use crate::value::Value;

type Callback = Rc<dyn Fn(&Value)>;

struct WatcherSlot {
    id: u64,
    deep: bool,
    callback: Weak<dyn Fn(&Value)>,
}

struct FieldInner {
    value: RefCell<Value>,
    version: Cell<u64>,
    watchers: RefCell<Vec<WatcherSlot>>,
    next_id: Cell<u64>,
}

/// Shared, version-tracked value cell with change watchers.
///
/// Clones share the same cell.
#[derive(Clone)]
pub struct Field {
    inner: Rc<FieldInner>,
}

impl Field {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(FieldInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                watchers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Current value (cloned).
    #[must_use]
    pub fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Number of changing mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Assign a new value. Returns `false` (and notifies nobody) if equal.
    pub fn set(&self, value: Value) -> bool {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.changed(false);
        true
    }

    /// Edit the value in place. Only deep watchers hear about it.
    pub fn update(&self, f: impl FnOnce(&mut Value)) -> bool {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            let before = current.clone();
            f(&mut *current);
            *current != before
        };
        if changed {
            self.changed(true);
        }
        changed
    }

    /// Replace a list's contents without replacing the list.
    ///
    /// The existing `Vec` is kept (same allocation when capacity allows), so
    /// holders of the list see the new contents. Non-list fields are
    /// assigned instead.
    pub fn splice_list(&self, items: Vec<Json>) -> bool {
        let is_list = matches!(*self.inner.value.borrow(), Value::List(_));
        if !is_list {
            return self.set(Value::List(items));
        }
        {
            let mut current = self.inner.value.borrow_mut();
            if let Value::List(list) = &mut *current {
                if *list == items {
                    return false;
                }
                list.clear();
                list.extend(items);
            }
        }
        self.changed(false);
        true
    }

    /// Watch for changes. `deep` watchers also see in-place edits.
    pub fn watch(&self, deep: bool, callback: impl Fn(&Value) + 'static) -> Watch {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let callback: Callback = Rc::new(callback);
        self.inner.watchers.borrow_mut().push(WatcherSlot {
            id,
            deep,
            callback: Rc::downgrade(&callback),
        });
        Watch {
            _callback: callback,
            field: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .borrow()
            .iter()
            .filter(|w| w.callback.strong_count() > 0)
            .count()
    }

    fn changed(&self, in_place: bool) {
        self.inner.version.set(self.inner.version.get() + 1);
        let callbacks: Vec<Callback> = {
            let mut watchers = self.inner.watchers.borrow_mut();
            watchers.retain(|w| w.callback.strong_count() > 0);
            watchers
                .iter()
                .filter(|w| !in_place || w.deep)
                .filter_map(|w| w.callback.upgrade())
                .collect()
        };
        if callbacks.is_empty() {
            return;
        }
        let snapshot = self.get();
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

/// RAII guard for a field watcher.
#[must_use = "dropping a Watch removes the watcher"]
pub struct Watch {
    _callback: Callback,
    field: Weak<FieldInner>,
    id: u64,
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(field) = self.field.upgrade() {
            field.watchers.borrow_mut().retain(|w| w.id != self.id);
        }
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").field("id", &self.id).finish()
    }
}
