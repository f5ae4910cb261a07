#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use stored_settings::{
    ChangeBus, RemoteHandler, RemoteSubscription, SettingsDecl, StorageBackend, StorageChange,
    StorageError, StoredSettings,
};
use tracing::{trace, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Storage, StorageEvent, Window};

const STORAGE_EVENT: &str = "storage";

/// Which Web Storage area to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageArea {
    Local,
    Session,
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("localStorage"),
            Self::Session => f.write_str("sessionStorage"),
        }
    }
}

/// A Web Storage area plus the window it belongs to.
#[derive(Clone, Debug)]
pub struct WebStorage {
    window: Window,
    storage: Storage,
    area: StorageArea,
}

impl WebStorage {
    /// `window.localStorage`.
    pub fn local() -> Result<Self, StorageError> {
        Self::open(StorageArea::Local)
    }

    /// `window.sessionStorage`.
    pub fn session() -> Result<Self, StorageError> {
        Self::open(StorageArea::Session)
    }

    pub fn open(area: StorageArea) -> Result<Self, StorageError> {
        let window =
            web_sys::window().ok_or_else(|| StorageError::Unavailable("no window".into()))?;
        let storage = match area {
            StorageArea::Local => window.local_storage(),
            StorageArea::Session => window.session_storage(),
        }
        .map_err(|err| StorageError::Unavailable(describe(&err)))?
        .ok_or_else(|| StorageError::Unavailable(format!("{area} is disabled")))?;
        Ok(Self {
            window,
            storage,
            area,
        })
    }

    #[must_use]
    pub fn area(&self) -> StorageArea {
        self.area
    }

    /// Remove `key`. Other documents see a change with no new value.
    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.storage
            .remove_item(key)
            .map_err(|err| StorageError::Backend(describe(&err)))
    }
}

impl StorageBackend for WebStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %describe(&err), "storage read failed");
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage
            .set_item(key, value)
            .map_err(|err| StorageError::Backend(describe(&err)))
    }

    fn subscribe_remote(&self, handler: RemoteHandler) -> RemoteSubscription {
        let area = self.storage.clone();
        let callback = Closure::<dyn FnMut(StorageEvent)>::new(move |event: StorageEvent| {
            if event.storage_area().as_ref() != Some(&area) {
                trace!(key = ?event.key(), "ignoring event for another storage area");
                return;
            }
            handler(&StorageChange {
                key: event.key(),
                new_value: event.new_value(),
            });
        });

        if let Err(err) = self
            .window
            .add_event_listener_with_callback(STORAGE_EVENT, callback.as_ref().unchecked_ref())
        {
            warn!(error = %describe(&err), "could not listen for storage events");
            return RemoteSubscription::noop();
        }

        let window = self.window.clone();
        RemoteSubscription::new(move || {
            if let Err(err) = window
                .remove_event_listener_with_callback(STORAGE_EVENT, callback.as_ref().unchecked_ref())
            {
                warn!(error = %describe(&err), "could not detach storage listener");
            }
        })
    }
}

/// A settings factory backed by `localStorage`.
pub fn stored_settings(
    prefix: Option<&str>,
    decl: SettingsDecl,
    bus: &ChangeBus,
) -> stored_settings::Result<StoredSettings> {
    let storage = WebStorage::local()?;
    StoredSettings::new(prefix, decl, Rc::new(storage), bus)
}

fn describe(err: &JsValue) -> String {
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}
