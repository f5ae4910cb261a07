#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use stored_settings::storage_key;

#[derive(Debug, Arbitrary)]
struct KeyInput {
    prefix: Option<String>,
    rename: Option<String>,
    key: String,
}

fuzz_target!(|input: KeyInput| {
    let prefix = input.prefix.as_deref().filter(|p| !p.is_empty());
    let name = input
        .rename
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(&input.key);

    let full = storage_key(input.prefix.as_deref(), input.rename.as_deref(), &input.key);

    match prefix {
        Some(prefix) => assert_eq!(full, format!("{prefix}.{name}")),
        None => assert_eq!(full, name),
    }
});
