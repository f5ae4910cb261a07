#![forbid(unsafe_code)]

//! Typed setting values.
//!
//! A [`Value`] is what a component field holds and what the bus carries. Values
//! compare by deep content: two lists with equal elements are equal regardless
//! of where they live.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as Json};

/// JSON object type used by map-kind settings.
pub type JsonMap = Map<String, Json>;

/// A typed setting value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    /// No value. Writing `Null` is a no-op.
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    List(Vec<Json>),
    Map(JsonMap),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Empty list value.
    #[must_use]
    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    /// Empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(JsonMap::new())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Json]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&JsonMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Convert a JSON document into the closest value.
    ///
    /// Numbers that do not fit an `i64` become text.
    #[must_use]
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Boolean(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Text(n.to_string()),
            },
            Json::String(s) => Self::Text(s),
            Json::Array(items) => Self::List(items),
            Json::Object(map) => Self::Map(map),
        }
    }

    /// JSON representation. Timestamps become ISO-8601 strings.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Text(s) => Json::String(s.clone()),
            Self::Integer(n) => Json::from(*n),
            Self::Boolean(b) => Json::Bool(*b),
            Self::List(items) => Json::Array(items.clone()),
            Self::Map(map) => Json::Object(map.clone()),
            Self::Timestamp(ts) => Json::String(iso_string(ts)),
        }
    }

    /// Canonical storage string for this value, independent of the declared kind.
    ///
    /// `Null` serializes to the empty string, booleans to `"1"`/`"0"`,
    /// containers to JSON and timestamps to ISO-8601 with millisecond precision.
    #[must_use]
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Boolean(b) => String::from(if *b { "1" } else { "0" }),
            Self::List(items) => serde_json::to_string(items).unwrap_or_else(|_| "[]".into()),
            Self::Map(map) => serde_json::to_string(map).unwrap_or_else(|_| "{}".into()),
            Self::Timestamp(ts) => iso_string(ts),
        }
    }
}

/// ISO-8601 instant with milliseconds and a `Z` suffix.
pub(crate) fn iso_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::List(items) => items.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
            Self::Timestamp(ts) => serializer.serialize_str(&iso_string(ts)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<Json>> for Value {
    fn from(items: Vec<Json>) -> Self {
        Self::List(items)
    }
}

impl From<JsonMap> for Value {
    fn from(map: JsonMap) -> Self {
        Self::Map(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
