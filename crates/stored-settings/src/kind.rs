#![forbid(unsafe_code)]

//! Value kinds and the built-in type registry.
//!
//! Kinds are a closed set resolved once, when a settings declaration is
//! turned into descriptors. Reads and writes never dispatch on kind again;
//! they call the resolved [`Codec`] directly.

use std::fmt;
use std::rc::Rc;

use crate::codec::{self, Codec};
use crate::value::Value;

/// The kind of value a setting holds.
#[derive(Clone, Debug)]
pub enum Kind {
    Text,
    Integer,
    Boolean,
    List,
    Map,
    Timestamp,
    /// User-defined kind carrying its own codec.
    Custom(Codec),
}

impl Kind {
    /// Built-in kinds in registry order.
    pub const BUILTIN: [Kind; 6] = [
        Kind::Text,
        Kind::Integer,
        Kind::Boolean,
        Kind::List,
        Kind::Map,
        Kind::Timestamp,
    ];

    /// Lowercase kind name (`"custom"` for user kinds).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Map => "map",
            Self::Timestamp => "timestamp",
            Self::Custom(_) => "custom",
        }
    }

    /// Look up a built-in kind by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::BUILTIN.into_iter().find(|k| k.name() == name)
    }

    #[must_use]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default for a setting whose storage slot is empty.
///
/// Providers run on every use, so each component instance gets its own
/// freshly built container.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Provider(Rc<dyn Fn() -> Value>),
}

impl DefaultValue {
    pub fn provider(f: impl Fn() -> Value + 'static) -> Self {
        Self::Provider(Rc::new(f))
    }

    /// Produce the default, invoking the provider if there is one.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Provider(f) => f(),
        }
    }
}

impl Default for DefaultValue {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// A registry row: everything a bare kind tag resolves to.
#[derive(Clone, Debug)]
pub struct TypeEntry {
    pub kind: Kind,
    pub default: DefaultValue,
    pub codec: Codec,
    pub deep: bool,
}

/// Registry row for a built-in kind; `None` for custom kinds.
#[must_use]
pub fn lookup(kind: &Kind) -> Option<TypeEntry> {
    let (default, parse, deep): (DefaultValue, fn(&str) -> Value, bool) = match kind {
        Kind::Text => (DefaultValue::Value(Value::Text(String::new())), codec::parse_text, false),
        Kind::Integer => (DefaultValue::Value(Value::Null), codec::parse_integer, false),
        Kind::Boolean => (DefaultValue::Value(Value::Boolean(false)), codec::parse_boolean, false),
        Kind::List => (DefaultValue::provider(Value::empty_list), codec::parse_list, false),
        Kind::Map => (DefaultValue::provider(Value::empty_map), codec::parse_map, true),
        Kind::Timestamp => (DefaultValue::provider(|| Value::Null), codec::parse_timestamp, false),
        Kind::Custom(_) => return None,
    };
    Some(TypeEntry {
        kind: kind.clone(),
        default,
        codec: Codec::new(parse, codec::serialize_value),
        deep,
    })
}
