#![forbid(unsafe_code)]

//! Settings declarations and their resolution into descriptors.
//!
//! A declaration names each setting and says as much or as little about it
//! as the caller wants: a bare [`Kind`], a partial [`SettingSpec`], or just
//! the name. Resolution fills the gaps from the type registry and fails fast
//! when a setting ends up without a codec.
//!
//! # Resolution rules
//!
//! | Declaration | Result |
//! |-------------|--------|
//! | name only | text passthrough, `Null` default |
//! | bare built-in kind | registry entry as-is |
//! | bare custom kind | its codec, `Null` default |
//! | spec with built-in kind | registry entry, spec fields win |
//! | spec with custom kind | kind's codec, spec fields win |
//! | spec without kind | spec must carry parse and serialize, else [`SettingsError::MissingCodec`] |
//!
//! # Invariants
//!
//! 1. Every resolved [`Descriptor`] has both a parse and a serialize function.
//! 2. Write-back is enabled unless `readonly` is explicitly `false`.
//! 3. Declaration order is preserved; redeclaring a name replaces it in place.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::codec::{self, Codec, ParseFn, SerializeFn};
use crate::error::{Result, SettingsError};
use crate::key::storage_key;
use crate::kind::{self, DefaultValue, Kind, TypeEntry};
use crate::value::Value;

/// Partial description of one setting; unset fields come from the registry.
#[derive(Clone, Default)]
pub struct SettingSpec {
    kind: Option<Kind>,
    default: Option<DefaultValue>,
    rename: Option<String>,
    readonly: Option<bool>,
    deep: Option<bool>,
    parse: Option<ParseFn>,
    serialize: Option<SerializeFn>,
}

impl SettingSpec {
    /// An empty spec. Without a kind it must be given a parse and serialize.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A spec for the given kind.
    #[must_use]
    pub fn of(kind: Kind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Fixed default used while the storage slot is empty.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default built fresh on every use.
    #[must_use]
    pub fn default_with(mut self, provider: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(DefaultValue::provider(provider));
        self
    }

    /// Store under this name instead of the declared key (the `as` option).
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// `readonly(false)` turns off write-back to storage; any other setting,
    /// including leaving it unset, keeps write-back on.
    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    /// Watch the field deeply (in-place mutations trigger write-back).
    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = Some(deep);
        self
    }

    #[must_use]
    pub fn parse(mut self, parse: impl Fn(&str) -> Value + 'static) -> Self {
        self.parse = Some(Rc::new(parse));
        self
    }

    #[must_use]
    pub fn serialize(mut self, serialize: impl Fn(&Value) -> String + 'static) -> Self {
        self.serialize = Some(Rc::new(serialize));
        self
    }

    /// Override both halves of the codec.
    #[must_use]
    pub fn codec(mut self, codec: &Codec) -> Self {
        self.parse = Some(Rc::clone(codec.parse_fn()));
        self.serialize = Some(Rc::clone(codec.serialize_fn()));
        self
    }
}

impl fmt::Debug for SettingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingSpec")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("rename", &self.rename)
            .field("readonly", &self.readonly)
            .field("deep", &self.deep)
            .field("parse", &self.parse.is_some())
            .field("serialize", &self.serialize.is_some())
            .finish()
    }
}

/// Declaration of a single setting.
#[derive(Clone, Debug)]
pub enum SettingDecl {
    /// Declared by name only.
    Untyped,
    Kind(Kind),
    Spec(SettingSpec),
}

impl From<Kind> for SettingDecl {
    fn from(kind: Kind) -> Self {
        Self::Kind(kind)
    }
}

impl From<SettingSpec> for SettingDecl {
    fn from(spec: SettingSpec) -> Self {
        Self::Spec(spec)
    }
}

/// Ordered declaration of all settings bound by one component type.
#[derive(Clone, Debug, Default)]
pub struct SettingsDecl {
    entries: Vec<(String, SettingDecl)>,
}

impl SettingsDecl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List form: every name becomes an untyped setting.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut decl = Self::new();
        for name in names {
            decl.push(name, SettingDecl::Untyped);
        }
        decl
    }

    /// Add or replace a setting (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, decl: impl Into<SettingDecl>) -> Self {
        self.push(name, decl);
        self
    }

    /// Add or replace a setting. A replaced setting keeps its position.
    pub fn push(&mut self, name: impl Into<String>, decl: impl Into<SettingDecl>) {
        let name = name.into();
        let decl = decl.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = decl,
            None => self.entries.push((name, decl)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingDecl)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }
}

impl<S: Into<String>> FromIterator<S> for SettingsDecl {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::names(iter)
    }
}

/// Fully resolved configuration of one setting.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub kind: Kind,
    pub default: DefaultValue,
    /// Storage name override (`as`).
    pub rename: Option<String>,
    /// Whether field mutations are written back to storage.
    pub write_back: bool,
    /// Whether in-place mutations of the field count as changes.
    pub deep: bool,
    codec: Codec,
}

impl Descriptor {
    fn from_entry(entry: TypeEntry) -> Self {
        Self {
            kind: entry.kind,
            default: entry.default,
            rename: None,
            write_back: true,
            deep: entry.deep,
            codec: entry.codec,
        }
    }

    #[must_use]
    pub fn parse(&self, raw: &str) -> Value {
        self.codec.parse(raw)
    }

    #[must_use]
    pub fn serialize(&self, value: &Value) -> String {
        self.codec.serialize(value)
    }

    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// A fresh default value.
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.default.produce()
    }

    /// List fields are updated by replacing their contents in place.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.kind, Kind::List)
    }
}

/// Resolve one declaration.
pub fn resolve_setting(name: &str, decl: SettingDecl) -> Result<Descriptor> {
    match decl {
        SettingDecl::Untyped => Ok(Descriptor {
            default: DefaultValue::default(),
            ..Descriptor::from_entry(builtin(&Kind::Text))
        }),
        SettingDecl::Kind(kind) => Ok(Descriptor::from_entry(entry_for(name, &kind))),
        SettingDecl::Spec(spec) => resolve_spec(name, spec),
    }
}

fn resolve_spec(name: &str, spec: SettingSpec) -> Result<Descriptor> {
    let base = spec.kind.as_ref().map(|k| entry_for(name, k));

    let parse = spec
        .parse
        .or_else(|| base.as_ref().map(|b| Rc::clone(b.codec.parse_fn())));
    let serialize = spec
        .serialize
        .or_else(|| base.as_ref().map(|b| Rc::clone(b.codec.serialize_fn())));
    let (Some(parse), Some(serialize)) = (parse, serialize) else {
        return Err(SettingsError::MissingCodec {
            setting: name.to_string(),
        });
    };
    let codec = Codec::from_parts(parse, serialize);

    let (kind, base_default, base_deep) = match base {
        Some(entry) => (entry.kind, Some(entry.default), entry.deep),
        None => {
            debug!(setting = name, "using custom codec");
            (Kind::Custom(codec.clone()), None, false)
        }
    };

    Ok(Descriptor {
        kind,
        default: spec.default.or(base_default).unwrap_or_default(),
        rename: spec.rename,
        write_back: spec.readonly != Some(false),
        deep: spec.deep.unwrap_or(base_deep),
        codec,
    })
}

fn builtin(kind: &Kind) -> TypeEntry {
    kind::lookup(kind).unwrap_or_else(|| TypeEntry {
        kind: kind.clone(),
        default: DefaultValue::default(),
        codec: Codec::new(codec::parse_text, codec::serialize_value),
        deep: false,
    })
}

fn entry_for(name: &str, kind: &Kind) -> TypeEntry {
    match kind {
        Kind::Custom(codec) => {
            debug!(setting = name, "using custom type");
            TypeEntry {
                kind: kind.clone(),
                default: DefaultValue::default(),
                codec: codec.clone(),
                deep: false,
            }
        }
        _ => builtin(kind),
    }
}

/// A resolved setting together with its storage slot.
#[derive(Clone, Debug)]
pub struct ResolvedSetting {
    pub name: String,
    pub storage_key: String,
    pub descriptor: Rc<Descriptor>,
}

/// Resolve a whole declaration under an optional namespace prefix.
///
/// Fails on the first setting without a codec. Two write-back settings that
/// map to the same storage key are reported at `warn`; they will overwrite
/// each other.
pub fn resolve_all(prefix: Option<&str>, decl: SettingsDecl) -> Result<Vec<ResolvedSetting>> {
    let mut resolved = Vec::with_capacity(decl.len());
    let mut writers: HashMap<String, String> = HashMap::new();

    for (name, setting) in decl.entries {
        let descriptor = resolve_setting(&name, setting)?;
        let storage_key = storage_key(prefix, descriptor.rename.as_deref(), &name);
        if descriptor.write_back {
            if let Some(other) = writers.insert(storage_key.clone(), name.clone()) {
                warn!(
                    %storage_key,
                    first = %other,
                    second = %name,
                    "two writable settings share a storage key; last write wins"
                );
            }
        }
        resolved.push(ResolvedSetting {
            name,
            storage_key,
            descriptor: Rc::new(descriptor),
        });
    }
    Ok(resolved)
}
