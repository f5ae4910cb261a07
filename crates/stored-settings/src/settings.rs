#![forbid(unsafe_code)]

//! The settings factory and its typed read/write adapter.
//!
//! [`StoredSettings`] is built once per component type from a namespace
//! prefix, a [`SettingsDecl`], a storage backend and the page's
//! [`ChangeBus`]. It hands the host framework three lifecycle entry points:
//!
//! - [`provide_defaults`](StoredSettings::provide_defaults) when a component
//!   instance is constructed,
//! - [`on_create`](StoredSettings::on_create) once it is live,
//! - [`on_destroy`](StoredSettings::on_destroy) when it is torn down.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use stored_settings::{ChangeBus, Kind, MemoryStorage, SettingSpec, SettingsDecl, StoredSettings, Value};
//!
//! let bus = ChangeBus::new();
//! let storage = Rc::new(MemoryStorage::new());
//! let decl = SettingsDecl::new().with("count", SettingSpec::of(Kind::Integer).default_value(0));
//! let settings = StoredSettings::new(Some("ui"), decl, storage.clone(), &bus).unwrap();
//!
//! let data = settings.provide_defaults();
//! let mut binding = settings.on_create(&data).unwrap();
//! assert_eq!(data.get("count").unwrap().get(), Value::Integer(0));
//!
//! data.get("count").unwrap().set(Value::Integer(5));
//! assert_eq!(settings.read("count").unwrap(), Value::Integer(5));
//!
//! settings.on_destroy(&mut binding);
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::binding::{self, ComponentBinding};
use crate::bus::ChangeBus;
use crate::descriptor::{self, Descriptor, ResolvedSetting, SettingsDecl};
use crate::error::{Result, SettingsError};
use crate::field::Field;
use crate::storage::StorageBackend;
use crate::value::Value;

/// Settings factory for one component type.
pub struct StoredSettings {
    prefix: Option<String>,
    settings: Vec<ResolvedSetting>,
    storage: Rc<dyn StorageBackend>,
    bus: ChangeBus,
}

impl StoredSettings {
    /// Resolve `decl` and bind it to `storage` and `bus`.
    ///
    /// Fails immediately if any setting cannot be resolved.
    pub fn new(
        prefix: Option<&str>,
        decl: SettingsDecl,
        storage: Rc<dyn StorageBackend>,
        bus: &ChangeBus,
    ) -> Result<Self> {
        let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        let settings = descriptor::resolve_all(prefix.as_deref(), decl)?;
        debug!(prefix = ?prefix, settings = settings.len(), "stored settings resolved");
        Ok(Self {
            prefix,
            settings,
            storage,
            bus: bus.clone(),
        })
    }

    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Resolved settings in declaration order.
    pub fn settings(&self) -> impl Iterator<Item = &ResolvedSetting> {
        self.settings.iter()
    }

    pub fn setting(&self, name: &str) -> Result<&ResolvedSetting> {
        self.settings
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SettingsError::UnknownSetting(name.to_string()))
    }

    pub fn descriptor(&self, name: &str) -> Result<&Descriptor> {
        self.setting(name).map(|s| &*s.descriptor)
    }

    pub fn storage_key(&self, name: &str) -> Result<&str> {
        self.setting(name).map(|s| s.storage_key.as_str())
    }

    /// Typed read. An empty slot yields the setting's default.
    pub fn read(&self, name: &str) -> Result<Value> {
        let setting = self.setting(name)?;
        Ok(read_setting(self.storage.as_ref(), setting))
    }

    /// Write handle for one setting.
    pub fn writer(&self, name: &str) -> Result<Writer> {
        let setting = self.setting(name)?;
        Ok(Writer::new(setting, Rc::clone(&self.storage), self.bus.clone()))
    }

    /// Typed write; `Null` is ignored.
    pub fn write(&self, name: &str, value: &Value) -> Result<()> {
        self.writer(name)?.write(value)
    }

    /// Initial field values for a new component instance.
    #[must_use]
    pub fn provide_defaults(&self) -> SettingsData {
        SettingsData {
            fields: self
                .settings
                .iter()
                .map(|s| {
                    (
                        s.name.clone(),
                        Field::new(read_setting(self.storage.as_ref(), s)),
                    )
                })
                .collect(),
        }
    }

    /// Bind a live component's fields to storage.
    pub fn on_create(&self, data: &SettingsData) -> Result<ComponentBinding> {
        binding::bind(&self.settings, data, &self.storage, &self.bus)
    }

    /// Release everything [`on_create`](Self::on_create) set up.
    pub fn on_destroy(&self, binding: &mut ComponentBinding) {
        binding.release();
    }
}

impl fmt::Debug for StoredSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSettings")
            .field("prefix", &self.prefix)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

pub(crate) fn read_setting(storage: &dyn StorageBackend, setting: &ResolvedSetting) -> Value {
    match storage.get_item(&setting.storage_key) {
        Some(raw) => {
            trace!(key = %setting.storage_key, "read stored value");
            setting.descriptor.parse(&raw)
        }
        None => setting.descriptor.default_value(),
    }
}

/// Serializes, persists and announces values for one setting.
#[derive(Clone)]
pub struct Writer {
    storage_key: String,
    descriptor: Rc<Descriptor>,
    storage: Rc<dyn StorageBackend>,
    bus: ChangeBus,
}

impl Writer {
    pub(crate) fn new(setting: &ResolvedSetting, storage: Rc<dyn StorageBackend>, bus: ChangeBus) -> Self {
        Self {
            storage_key: setting.storage_key.clone(),
            descriptor: Rc::clone(&setting.descriptor),
            storage,
            bus,
        }
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Persist `value` and publish it on the bus.
    ///
    /// `Null` leaves the stored value alone and publishes nothing.
    pub fn write(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            trace!(key = %self.storage_key, "ignoring null write");
            return Ok(());
        }
        let serialized = self.descriptor.serialize(value);
        self.storage.set_item(&self.storage_key, &serialized)?;
        trace!(key = %self.storage_key, "wrote value");
        self.bus.publish(&self.storage_key, value);
        Ok(())
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("storage_key", &self.storage_key)
            .finish_non_exhaustive()
    }
}

/// A component instance's setting fields, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct SettingsData {
    fields: Vec<(String, Field)>,
}

impl SettingsData {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.get(name)
            .ok_or_else(|| SettingsError::UnknownSetting(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Current values of all fields.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .map(|(n, f)| (n.clone(), f.get()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
