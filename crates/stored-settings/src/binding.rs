#![forbid(unsafe_code)]

//! Component bindings: the live link between a component's fields, the
//! storage backend and the change bus.
//!
//! For every write-back setting a binding holds three things:
//!
//! - a field watcher that writes local edits through the [`Writer`];
//! - a bus subscription that applies same-page writes from other bindings;
//! - a route in the binding's single remote-change subscription that applies
//!   writes made by other contexts.
//!
//! # Invariants
//!
//! 1. Incoming values (bus or remote) equal to the field's current value are
//!    dropped without touching the field.
//! 2. Applying an incoming value never writes that value back. Only the
//!    echo is suppressed: edits that other watchers make in response, to
//!    this field or to any other, are written and published as usual.
//! 3. List fields receive incoming values by content replacement; the field
//!    keeps its container.
//! 4. One remote subscription per binding, routed by storage key. Changes for
//!    keys the binding does not own are ignored.
//! 5. After [`ComponentBinding::release`] (or drop) no callback of this
//!    binding runs again.
//!
//! # State machine
//!
//! ```text
//! unbound --on_create--> bound --on_destroy/drop--> unbound
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::bus::{BusSubscription, ChangeBus};
use crate::descriptor::ResolvedSetting;
use crate::error::Result;
use crate::field::{Field, Watch};
use crate::settings::{SettingsData, Writer};
use crate::storage::{RemoteSubscription, StorageBackend, StorageChange};
use crate::value::Value;

type RemoteRoute = Box<dyn Fn(Option<&str>)>;

/// The value currently being applied to one field, if any.
type Incoming = Rc<RefCell<Option<Value>>>;

/// Applies incoming values to one field.
struct Updater {
    field: Field,
    in_place: bool,
    incoming: Incoming,
}

impl Updater {
    fn apply(&self, value: &Value) {
        if self.field.with(|current| current == value) {
            return;
        }
        let outer = self.incoming.replace(Some(value.clone()));
        match value {
            Value::List(items) if self.in_place => {
                self.field.splice_list(items.clone());
            }
            _ => {
                self.field.set(value.clone());
            }
        }
        *self.incoming.borrow_mut() = outer;
    }
}

fn is_echo(incoming: &Incoming, value: &Value) -> bool {
    incoming.borrow().as_ref() == Some(value)
}

/// Subscriptions held on behalf of one live component instance.
pub struct ComponentBinding {
    watches: Vec<Watch>,
    bus_subscriptions: Vec<BusSubscription>,
    remote: Option<RemoteSubscription>,
    bound: bool,
}

impl ComponentBinding {
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Number of settings this binding keeps in sync.
    #[must_use]
    pub fn synced_settings(&self) -> usize {
        self.bus_subscriptions.len()
    }

    /// Whether the remote-change subscription is installed.
    #[must_use]
    pub fn listens_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Drop every subscription. Idempotent.
    pub fn release(&mut self) {
        if !self.bound {
            return;
        }
        if let Some(remote) = self.remote.take() {
            remote.release();
        }
        self.bus_subscriptions.clear();
        self.watches.clear();
        self.bound = false;
        debug!("component binding released");
    }
}

impl Drop for ComponentBinding {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ComponentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBinding")
            .field("bound", &self.bound)
            .field("watches", &self.watches.len())
            .field("bus_subscriptions", &self.bus_subscriptions.len())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

pub(crate) fn bind(
    settings: &[ResolvedSetting],
    data: &SettingsData,
    storage: &Rc<dyn StorageBackend>,
    bus: &ChangeBus,
) -> Result<ComponentBinding> {
    let mut watches = Vec::new();
    let mut bus_subscriptions = Vec::new();
    let mut routes: HashMap<String, RemoteRoute> = HashMap::new();

    for setting in settings.iter().filter(|s| s.descriptor.write_back) {
        let field = data.field(&setting.name)?;
        let descriptor = Rc::clone(&setting.descriptor);

        let incoming: Incoming = Rc::new(RefCell::new(None));
        let writer = Writer::new(setting, Rc::clone(storage), bus.clone());
        let echo = Rc::clone(&incoming);
        let name = setting.name.clone();
        watches.push(field.watch(descriptor.deep, move |value| {
            if is_echo(&echo, value) {
                return;
            }
            if let Err(err) = writer.write(value) {
                warn!(setting = %name, error = %err, "write-back failed");
            }
        }));

        let updater = Rc::new(Updater {
            field: field.clone(),
            in_place: descriptor.is_list(),
            incoming,
        });

        let local = Rc::clone(&updater);
        bus_subscriptions.push(bus.subscribe(setting.storage_key.clone(), move |value| {
            local.apply(value);
        }));

        routes.insert(
            setting.storage_key.clone(),
            Box::new(move |raw: Option<&str>| {
                updater.apply(&descriptor.parse(raw.unwrap_or_default()));
            }),
        );
    }

    let remote = if routes.is_empty() {
        None
    } else {
        Some(storage.subscribe_remote(Rc::new(move |change: &StorageChange| {
            match change.key.as_deref().and_then(|key| routes.get(key)) {
                Some(route) => route(change.new_value.as_deref()),
                None => trace!(key = ?change.key, "ignoring unrelated storage change"),
            }
        })))
    };

    debug!(
        settings = bus_subscriptions.len(),
        remote = remote.is_some(),
        "component binding created"
    );
    Ok(ComponentBinding {
        watches,
        bus_subscriptions,
        remote,
        bound: true,
    })
}
