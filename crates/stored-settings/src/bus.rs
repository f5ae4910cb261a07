#![forbid(unsafe_code)]

//! In-page change bus.
//!
//! [`ChangeBus`] is the mediator that lets independent component bindings on
//! the same page hear about each other's writes without holding references
//! to each other. It is constructed once by the application and handed to
//! every [`StoredSettings`](crate::StoredSettings) factory; clones share the
//! same subscriber table.
//!
//! # Invariants
//!
//! 1. `publish` is synchronous: every handler has run when it returns.
//! 2. Handlers for a key run in subscription order.
//! 3. Handlers may publish, subscribe or unsubscribe re-entrantly. A handler
//!    subscribed during a publication first runs on the next one; a handler
//!    unsubscribed during a publication is not called after its removal.
//! 4. Dropping a [`BusSubscription`] removes its handler.
//!
//! Nothing is persisted and nothing crosses the page boundary.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::value::Value;

type Handler = Rc<dyn Fn(&Value)>;

#[derive(Default)]
struct BusInner {
    topics: RefCell<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: Cell<u64>,
}

/// Synchronous publish/subscribe mediator keyed by storage key.
#[derive(Clone, Default)]
pub struct ChangeBus {
    inner: Rc<BusInner>,
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for values published under `key`.
    pub fn subscribe(
        &self,
        key: impl Into<String>,
        handler: impl Fn(&Value) + 'static,
    ) -> BusSubscription {
        let key = key.into();
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .topics
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push((id, Rc::new(handler)));
        BusSubscription {
            bus: Rc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Deliver `value` to every handler currently subscribed to `key`.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, key: &str, value: &Value) -> usize {
        let handlers: Vec<(u64, Handler)> = match self.inner.topics.borrow().get(key) {
            Some(subs) => subs.iter().map(|(id, h)| (*id, Rc::clone(h))).collect(),
            None => return 0,
        };
        trace!(key, subscribers = handlers.len(), "publishing change");
        let mut delivered = 0;
        for (id, handler) in &handlers {
            if !self.is_subscribed(key, *id) {
                continue;
            }
            handler(value);
            delivered += 1;
        }
        delivered
    }

    fn is_subscribed(&self, key: &str, id: u64) -> bool {
        self.inner
            .topics
            .borrow()
            .get(key)
            .is_some_and(|subs| subs.iter().any(|(sub, _)| *sub == id))
    }

    /// Number of handlers subscribed to `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner.topics.borrow().get(key).map_or(0, Vec::len)
    }

    /// Total number of handlers across all keys.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.inner.topics.borrow().values().map(Vec::len).sum()
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("keys", &self.inner.topics.borrow().len())
            .field("subscribers", &self.total_subscribers())
            .finish()
    }
}

/// RAII handle for a bus subscription.
#[must_use = "dropping a BusSubscription unsubscribes the handler"]
pub struct BusSubscription {
    bus: Weak<BusInner>,
    key: String,
    id: u64,
}

impl BusSubscription {
    /// Storage key this subscription listens on.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut topics = bus.topics.borrow_mut();
        if let Some(subs) = topics.get_mut(&self.key) {
            subs.retain(|(id, _)| *id != self.id);
            if subs.is_empty() {
                topics.remove(&self.key);
            }
        }
    }
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSubscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
