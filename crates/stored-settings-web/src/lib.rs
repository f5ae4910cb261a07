#![forbid(unsafe_code)]

//! Browser storage backend for `stored-settings`.
//!
//! [`WebStorage`] adapts `window.localStorage` (or `sessionStorage`) to the
//! [`StorageBackend`](stored_settings::StorageBackend) trait. Remote changes
//! arrive through the window's `storage` event, which browsers fire in every
//! *other* document of the origin when a value changes.
//!
//! On non-wasm targets this crate is empty.

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::{StorageArea, WebStorage, stored_settings};
