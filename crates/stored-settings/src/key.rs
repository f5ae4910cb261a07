#![forbid(unsafe_code)]

//! Storage key derivation.
//!
//! A setting's slot in the backend is `"{prefix}.{name}"`, where `name` is the
//! setting's `as` rename when present and its declared key otherwise. Empty
//! strings count as absent for both parts. Read, write and listener
//! registration all go through [`storage_key`] so they agree on the slot.

/// Derive the storage key for a setting.
///
/// ```
/// use stored_settings::storage_key;
///
/// assert_eq!(storage_key(Some("app"), Some("x"), "ignored"), "app.x");
/// assert_eq!(storage_key(None, None, "volume"), "volume");
/// ```
#[must_use]
pub fn storage_key(prefix: Option<&str>, rename: Option<&str>, key: &str) -> String {
    let name = rename.filter(|r| !r.is_empty()).unwrap_or(key);
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_string(),
    }
}
