#![forbid(unsafe_code)]

//! Storage-string codecs.
//!
//! Every setting converts between the backend's string slots and typed
//! [`Value`]s through a [`Codec`]. The built-in parsers in this module are
//! total: any input string produces a value, malformed input degrading to the
//! kind's empty value instead of an error.
//!
//! # Parsing rules
//!
//! | Parser | Rule |
//! |--------|------|
//! | [`parse_text`] | identity |
//! | [`parse_integer`] | optional leading whitespace and sign, then the longest run of ASCII digits; none gives `Null` |
//! | [`parse_boolean`] | exactly `"1"` is `true` |
//! | [`parse_list`] | `[]` unless the input starts with `[` and decodes as a JSON array |
//! | [`parse_map`] | `{}` unless the input starts with `{` and decodes as a JSON object |
//! | [`parse_timestamp`] | blank gives `Null`; RFC 3339, RFC 2822, `YYYY-MM-DD[ T]hh:mm[:ss[.fff]]`, `YYYY-MM-DD` (UTC) |

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as Json;

use crate::value::{JsonMap, Value};

/// Storage string to value.
pub type ParseFn = Rc<dyn Fn(&str) -> Value>;
/// Value to storage string.
pub type SerializeFn = Rc<dyn Fn(&Value) -> String>;

/// A parse/serialize pair.
#[derive(Clone)]
pub struct Codec {
    parse: ParseFn,
    serialize: SerializeFn,
}

impl Codec {
    /// Build a codec from explicit functions.
    pub fn new(
        parse: impl Fn(&str) -> Value + 'static,
        serialize: impl Fn(&Value) -> String + 'static,
    ) -> Self {
        Self {
            parse: Rc::new(parse),
            serialize: Rc::new(serialize),
        }
    }

    pub(crate) fn from_parts(parse: ParseFn, serialize: SerializeFn) -> Self {
        Self { parse, serialize }
    }

    /// Codec storing any value as a JSON document.
    #[must_use]
    pub fn json() -> Self {
        Self::new(parse_json, serialize_json)
    }

    /// Custom parser paired with the JSON serializer.
    ///
    /// For types that know how to read themselves back but rely on their JSON
    /// form for storage.
    pub fn json_serialized(parse: impl Fn(&str) -> Value + 'static) -> Self {
        Self::new(parse, serialize_json)
    }

    /// Decode a storage string.
    #[must_use]
    pub fn parse(&self, raw: &str) -> Value {
        (self.parse)(raw)
    }

    /// Encode a value for storage.
    #[must_use]
    pub fn serialize(&self, value: &Value) -> String {
        (self.serialize)(value)
    }

    pub(crate) fn parse_fn(&self) -> &ParseFn {
        &self.parse
    }

    pub(crate) fn serialize_fn(&self) -> &SerializeFn {
        &self.serialize
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

pub fn parse_text(raw: &str) -> Value {
    Value::Text(raw.to_string())
}

/// Base-10 integer prefix parse.
///
/// `"42px"` gives 42, `"  -7"` gives -7, `"0x1A"` gives 0, `"abc"` and
/// out-of-range inputs give `Null`.
pub fn parse_integer(raw: &str) -> Value {
    let s = raw.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return Value::Null;
    }

    let mut acc: i64 = 0;
    for b in rest[..end].bytes() {
        let digit = i64::from(b - b'0');
        let next = acc.checked_mul(10).and_then(|v| {
            if negative {
                v.checked_sub(digit)
            } else {
                v.checked_add(digit)
            }
        });
        match next {
            Some(v) => acc = v,
            None => return Value::Null,
        }
    }
    Value::Integer(acc)
}

pub fn parse_boolean(raw: &str) -> Value {
    Value::Boolean(raw == "1")
}

pub fn parse_list(raw: &str) -> Value {
    if !raw.starts_with('[') {
        return Value::empty_list();
    }
    Value::List(serde_json::from_str::<Vec<Json>>(raw).unwrap_or_default())
}

pub fn parse_map(raw: &str) -> Value {
    if !raw.starts_with('{') {
        return Value::empty_map();
    }
    Value::Map(serde_json::from_str::<JsonMap>(raw).unwrap_or_default())
}

pub fn parse_timestamp(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    parse_date(s).map_or(Value::Null, Value::Timestamp)
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Any JSON document; malformed input gives `Null`.
pub fn parse_json(raw: &str) -> Value {
    serde_json::from_str::<Json>(raw).map_or(Value::Null, Value::from_json)
}

/// Kind-independent serializer used by all built-in kinds.
pub fn serialize_value(value: &Value) -> String {
    value.to_storage_string()
}

pub fn serialize_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}
