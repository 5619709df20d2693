use std::fmt::Write as _;

use crate::constants::{CURRENT_USER_MARKER, MY_FOLDERS};

/// Escape one path component the way RDS expects it in URLs.
///
/// `_` becomes `_x005F`, space becomes `__`, and anything else outside
/// `[A-Za-z0-9]` becomes `_xHHHH` per UTF-16 code unit.
pub fn encode_component(component: &str) -> String {
    let mut encoded = String::with_capacity(component.len());
    let mut units = [0u16; 2];
    for ch in component.chars() {
        match ch {
            '_' => encoded.push_str("_x005F"),
            ' ' => encoded.push_str("__"),
            c if c.is_ascii_alphanumeric() => encoded.push(c),
            c => {
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(encoded, "_x{:04X}", unit);
                }
            }
        }
    }
    encoded
}

/// Encode a backend path, expanding a leading `~` into the account's
/// `My Folders`
pub fn encode_path(path: &[String], account_id: &str) -> String {
    let expanded: Vec<&str> = match path.split_first() {
        Some((first, rest)) if first == CURRENT_USER_MARKER => [account_id, MY_FOLDERS]
            .into_iter()
            .chain(rest.iter().map(String::as_str))
            .collect(),
        _ => path.iter().map(String::as_str).collect(),
    };

    expanded
        .into_iter()
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}
