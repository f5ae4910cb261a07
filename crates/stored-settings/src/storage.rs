#![forbid(unsafe_code)]

//! Storage backend abstraction and an in-memory multi-context backend.
//!
//! A backend is a per-origin string map that several browsing contexts
//! (tabs) share. Writes are visible to every context immediately, but other
//! contexts only *hear* about them later, through the change notification
//! channel exposed by [`StorageBackend::subscribe_remote`]. The writing
//! context is never notified of its own writes.
//!
//! [`MemoryOrigin`] models this for tests and native hosts: each
//! [`MemoryOrigin::context`] is one tab, and notifications queue up until
//! [`MemoryOrigin::dispatch_pending`] delivers them.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::StorageError;

/// A cross-context storage notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Changed key; `None` when the whole area was cleared.
    pub key: Option<String>,
    /// New raw value; `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Callback invoked for every remote change.
pub type RemoteHandler = Rc<dyn Fn(&StorageChange)>;

/// RAII guard for a remote change subscription.
///
/// Dropping it (or calling [`release`](Self::release)) detaches the handler.
#[must_use = "dropping a RemoteSubscription detaches the handler"]
pub struct RemoteSubscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl RemoteSubscription {
    /// Wrap a detach action.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Detach now.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Persistent string storage shared by all contexts of an origin.
pub trait StorageBackend {
    /// Raw value for `key`, `None` if absent.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Listen for mutations made by *other* contexts.
    fn subscribe_remote(&self, handler: RemoteHandler) -> RemoteSubscription;
}

impl<T: StorageBackend + ?Sized> StorageBackend for Rc<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn subscribe_remote(&self, handler: RemoteHandler) -> RemoteSubscription {
        (**self).subscribe_remote(handler)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct Listener {
    id: u64,
    context: usize,
    handler: RemoteHandler,
}

#[derive(Default)]
struct OriginInner {
    items: RefCell<HashMap<String, String>>,
    listeners: RefCell<Vec<Listener>>,
    pending: RefCell<VecDeque<(usize, StorageChange)>>,
    next_context: Cell<usize>,
    next_listener: Cell<u64>,
}

impl OriginInner {
    fn queue(&self, source: usize, change: StorageChange) {
        self.pending.borrow_mut().push_back((source, change));
    }
}

/// One origin's storage, shared by any number of contexts.
#[derive(Clone, Default)]
pub struct MemoryOrigin {
    inner: Rc<OriginInner>,
}

impl MemoryOrigin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new context (tab) on this origin.
    #[must_use]
    pub fn context(&self) -> MemoryStorage {
        let id = self.inner.next_context.get();
        self.inner.next_context.set(id + 1);
        MemoryStorage {
            origin: Rc::clone(&self.inner),
            context: id,
            stats: Rc::new(AccessStats::default()),
        }
    }

    /// Deliver queued notifications to every context except the writer.
    ///
    /// Changes caused by handlers are delivered in the same call. Returns the
    /// number of handler invocations.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some((source, change)) = next else {
                break;
            };
            let targets: Vec<RemoteHandler> = self
                .inner
                .listeners
                .borrow()
                .iter()
                .filter(|l| l.context != source)
                .map(|l| Rc::clone(&l.handler))
                .collect();
            trace!(key = ?change.key, targets = targets.len(), "dispatching storage change");
            for handler in targets {
                handler(&change);
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of queued, undelivered notifications.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Raw value as any context would see it.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.items.borrow().get(key).cloned()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Number of attached remote listeners across all contexts.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl fmt::Debug for MemoryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryOrigin")
            .field("items", &self.inner.items.borrow().len())
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("pending", &self.inner.pending.borrow().len())
            .finish()
    }
}

#[derive(Default)]
struct AccessStats {
    reads: Cell<usize>,
    writes: Cell<usize>,
}

/// One context's view of a [`MemoryOrigin`].
///
/// Clones share the context identity and access counters.
#[derive(Clone)]
pub struct MemoryStorage {
    origin: Rc<OriginInner>,
    context: usize,
    stats: Rc<AccessStats>,
}

impl MemoryStorage {
    /// A standalone single-context store.
    #[must_use]
    pub fn new() -> Self {
        MemoryOrigin::new().context()
    }

    /// Remove `key`, notifying other contexts if it existed.
    pub fn remove_item(&self, key: &str) {
        let removed = self.origin.items.borrow_mut().remove(key);
        if removed.is_some() {
            self.origin.queue(
                self.context,
                StorageChange {
                    key: Some(key.to_string()),
                    new_value: None,
                },
            );
        }
    }

    /// Remove every key, notifying other contexts with a key-less change.
    pub fn clear(&self) {
        let had_items = {
            let mut items = self.origin.items.borrow_mut();
            let had = !items.is_empty();
            items.clear();
            had
        };
        if had_items {
            self.origin.queue(
                self.context,
                StorageChange {
                    key: None,
                    new_value: None,
                },
            );
        }
    }

    /// `get_item` calls made through this context.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.stats.reads.get()
    }

    /// `set_item` calls made through this context.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.stats.writes.get()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.stats.reads.set(self.stats.reads.get() + 1);
        self.origin.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.stats.writes.set(self.stats.writes.get() + 1);
        let previous = self
            .origin
            .items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            self.origin.queue(
                self.context,
                StorageChange {
                    key: Some(key.to_string()),
                    new_value: Some(value.to_string()),
                },
            );
        }
        Ok(())
    }

    fn subscribe_remote(&self, handler: RemoteHandler) -> RemoteSubscription {
        let id = self.origin.next_listener.get();
        self.origin.next_listener.set(id + 1);
        self.origin.listeners.borrow_mut().push(Listener {
            id,
            context: self.context,
            handler,
        });
        let origin: Weak<OriginInner> = Rc::downgrade(&self.origin);
        RemoteSubscription::new(move || {
            if let Some(origin) = origin.upgrade() {
                origin.listeners.borrow_mut().retain(|l| l.id != id);
            }
        })
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("context", &self.context)
            .field("reads", &self.stats.reads.get())
            .field("writes", &self.stats.writes.get())
            .finish()
    }
}
