#![forbid(unsafe_code)]

//! Settings declarations loaded from TOML or JSON.
//!
//! ```toml
//! prefix = "ui"
//!
//! [settings.count]
//! type = "integer"
//! default = 0
//!
//! [settings.last_seen]
//! type = "timestamp"
//! as = "seen"
//! readonly = false
//! ```
//!
//! `settings` may also be a plain list of names (`settings = ["a", "b"]`).
//! Entries are declared in key order. A missing `type` declares a text
//! passthrough. Timestamp defaults may be strings or TOML datetimes.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::bus::ChangeBus;
use crate::codec;
use crate::descriptor::{SettingDecl, SettingSpec, SettingsDecl};
use crate::error::{Result, SettingsError};
use crate::kind::Kind;
use crate::settings::StoredSettings;
use crate::storage::StorageBackend;
use crate::value::Value;

const TOML_DATETIME_FIELD: &str = "$__toml_private_datetime";

/// Top-level settings document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub settings: SettingsSection,
}

/// Either a list of names or a table of per-setting options.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SettingsSection {
    Names(Vec<String>),
    Table(BTreeMap<String, SettingConfig>),
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self::Table(BTreeMap::new())
    }
}

/// Options for one setting.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub default: Option<Json>,
    #[serde(default, rename = "as")]
    pub rename: Option<String>,
    #[serde(default)]
    pub readonly: Option<bool>,
    #[serde(default)]
    pub deep: Option<bool>,
}

impl SettingsConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| SettingsError::Config(e.to_string()))
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| SettingsError::Config(e.to_string()))
    }

    /// Convert into a declaration, validating kind names.
    pub fn to_decl(&self) -> Result<SettingsDecl> {
        let mut decl = SettingsDecl::new();
        match &self.settings {
            SettingsSection::Names(names) => {
                for name in names {
                    decl.push(name.clone(), SettingDecl::Untyped);
                }
            }
            SettingsSection::Table(table) => {
                for (name, setting) in table {
                    decl.push(name.clone(), setting.to_spec(name)?);
                }
            }
        }
        Ok(decl)
    }

    /// Build the factory this document describes.
    pub fn build(&self, storage: Rc<dyn StorageBackend>, bus: &ChangeBus) -> Result<StoredSettings> {
        StoredSettings::new(self.prefix.as_deref(), self.to_decl()?, storage, bus)
    }
}

impl SettingConfig {
    fn to_spec(&self, name: &str) -> Result<SettingSpec> {
        let kind = match self.kind.as_deref() {
            None => Kind::Text,
            Some(kind_name) => Kind::from_name(kind_name).ok_or_else(|| {
                SettingsError::Config(format!("setting '{name}': unknown type '{kind_name}'"))
            })?,
        };

        let mut spec = SettingSpec::of(kind.clone());
        match &self.default {
            Some(json) => spec = spec.default_value(coerce_default(&kind, json)),
            None if self.kind.is_none() => spec = spec.default_value(Value::Null),
            None => {}
        }
        if let Some(rename) = &self.rename {
            spec = spec.rename(rename.clone());
        }
        if let Some(readonly) = self.readonly {
            spec = spec.readonly(readonly);
        }
        if let Some(deep) = self.deep {
            spec = spec.deep(deep);
        }
        Ok(spec)
    }
}

fn coerce_default(kind: &Kind, json: &Json) -> Value {
    match (kind, json) {
        (Kind::Timestamp, Json::String(s)) => codec::parse_timestamp(s),
        (Kind::Timestamp, Json::Object(map)) => match map.get(TOML_DATETIME_FIELD) {
            Some(Json::String(s)) => codec::parse_timestamp(s),
            _ => Value::Null,
        },
        (Kind::Integer, Json::String(s)) => codec::parse_integer(s),
        _ => Value::from_json(json.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn timestamp_defaults_accept_both_forms() {
        let expected = Value::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        assert_eq!(
            coerce_default(&Kind::Timestamp, &Json::String("2024-05-01T12:00:00Z".into())),
            expected
        );
        let toml_dt = serde_json::json!({ TOML_DATETIME_FIELD: "2024-05-01T12:00:00Z" });
        assert_eq!(coerce_default(&Kind::Timestamp, &toml_dt), expected);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let cfg = SettingsConfig::from_json_str(r#"{"settings": {"x": {"type": "Number"}}}"#).unwrap();
        let err = cfg.to_decl().unwrap_err();
        assert!(matches!(err, SettingsError::Config(msg) if msg.contains("unknown type 'Number'")));
    }

    #[test]
    fn untyped_entry_is_text_with_null_default() {
        let cfg = SettingsConfig::from_json_str(r#"{"settings": {"note": {}}}"#).unwrap();
        let spec = cfg.to_decl().unwrap();
        let resolved = crate::descriptor::resolve_all(None, spec).unwrap();
        assert_eq!(resolved[0].descriptor.default_value(), Value::Null);
    }
}
