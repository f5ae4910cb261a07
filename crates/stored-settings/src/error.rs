#![forbid(unsafe_code)]

//! Error types for settings resolution, storage access and configuration.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing codec | Declaration without kind, parse or serialize | `MissingCodec` at setup |
//! | Unknown setting | Read/write of an undeclared name | `UnknownSetting` |
//! | Backend refusal | Quota exceeded, storage disabled | `Storage(..)` |
//! | Bad config document | TOML/JSON syntax or unknown kind | `Config(..)` |
//! | Malformed stored value | Corrupt list/map/timestamp string | Not an error: empty or `Null` |

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The storage area cannot be reached (no window, access denied).
    Unavailable(String),
    /// The backend rejected an operation (e.g. quota exceeded).
    Backend(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Errors from settings operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A custom setting did not provide both `parse` and `serialize`.
    MissingCodec { setting: String },
    /// The name was not part of the settings declaration.
    UnknownSetting(String),
    /// The storage backend failed.
    Storage(StorageError),
    /// A configuration document could not be loaded.
    Config(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCodec { setting } => write!(
                f,
                "setting '{setting}': custom type must provide 'parse' and 'serialize'"
            ),
            Self::UnknownSetting(name) => write!(f, "unknown setting: {name}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for SettingsError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
