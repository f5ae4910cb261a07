#![forbid(unsafe_code)]

//! Typed settings bound to persistent key/value storage.
//!
//! `stored-settings` keeps a component's setting fields in sync with a
//! string key/value store (the browser's `localStorage` by default) and with
//! every other component bound to the same keys, on the same page and in
//! other tabs.
//!
//! - [`codec`] / [`kind`]: the type registry turning storage strings into
//!   typed [`Value`]s and back.
//! - [`descriptor`]: declarations and their resolution into descriptors.
//! - [`key`]: storage key derivation (`prefix.name`).
//! - [`settings`]: the [`StoredSettings`] factory and its read/write adapter.
//! - [`bus`]: the in-page [`ChangeBus`].
//! - [`binding`]: per-component subscriptions and remote change routing.
//! - [`storage`]: the [`StorageBackend`] trait and an in-memory backend.
//! - [`field`]: observable fields standing in for the host's reactive data.
//!
//! # Sync protocol
//!
//! A local edit of a bound field is serialized, stored, and published on the
//! bus under its storage key; every other binding of that key on the page
//! applies it directly. Other tabs learn of it from the backend's change
//! notifications, parse the new string, and apply it the same way. Values
//! equal to the current field value are dropped, and applied values are never
//! written back, so no update cycles form.
//!
//! Everything is single-threaded and synchronous.

pub mod binding;
pub mod bus;
pub mod codec;
#[cfg(feature = "config")]
pub mod config;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod key;
pub mod kind;
pub mod settings;
pub mod storage;
pub mod value;

pub use binding::ComponentBinding;
pub use bus::{BusSubscription, ChangeBus};
pub use codec::Codec;
#[cfg(feature = "config")]
pub use config::SettingsConfig;
pub use descriptor::{Descriptor, ResolvedSetting, SettingDecl, SettingSpec, SettingsDecl};
pub use error::{Result, SettingsError, StorageError};
pub use field::{Field, Watch};
pub use key::storage_key;
pub use kind::{DefaultValue, Kind};
pub use settings::{SettingsData, StoredSettings, Writer};
pub use storage::{
    MemoryOrigin, MemoryStorage, RemoteHandler, RemoteSubscription, StorageBackend, StorageChange,
};
pub use value::{JsonMap, Value};
