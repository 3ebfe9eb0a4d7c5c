//! Kernel command line (spec section 4.12): the Multiboot2 `TAG_CMDLINE`
//! string, parsed into a `key=value`/bare-flag dictionary and cached in a
//! `sync::GlobalState` so any subsystem can look a parameter up after boot.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use crate::sync::GlobalState;

static CMDLINE: GlobalState<BTreeMap<String, String>> = GlobalState::new();

/// Parse the Multiboot2 command line and make it available via [`get`]/
/// [`has`]. Safe to call with `multiboot_info_addr == 0` (e.g. under the
/// test harness, which never passes real boot info) -- the dictionary is
/// just empty in that case.
pub fn init(multiboot_info_addr: usize) {
    let raw = if multiboot_info_addr != 0 {
        // SAFETY: `multiboot_info_addr` is the pointer `kernel_main`
        // received straight from the bootloader, still identity-mapped
        // this early in boot.
        unsafe {
            crate::arch::x86_64::multiboot::find_tag(
                multiboot_info_addr,
                crate::arch::x86_64::multiboot::TAG_CMDLINE,
            )
        }
        .and_then(|tag| core::str::from_utf8(tag.data).ok())
        .map(|s| s.trim_end_matches('\0'))
        .unwrap_or("")
    } else {
        ""
    };

    let params = parse(raw);
    println!("[CMDLINE] {} parameter(s): {}", params.len(), raw);
    CMDLINE.set(params);
}

fn parse(raw: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for token in raw.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) => {
                params.insert(key.to_string(), value.to_string());
            }
            None => {
                params.insert(token.to_string(), String::new());
            }
        }
    }
    params
}

/// Look up `key`'s value. Present-but-bare flags (e.g. `quiet`) return
/// `Some("")`.
pub fn get(key: &str) -> Option<&'static str> {
    CMDLINE
        .get()
        .and_then(|m| m.get(key))
        .map(String::as_str)
}

/// Whether `key` was present at all, bare or with a value.
pub fn has(key: &str) -> bool {
    CMDLINE.get().is_some_and(|m| m.contains_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_parse_key_value() {
        let params = parse("root=/dev/sda1 ro quiet loglevel=3");
        assert_eq!(params.get("root").map(String::as_str), Some("/dev/sda1"));
        assert_eq!(params.get("ro").map(String::as_str), Some(""));
        assert_eq!(params.get("loglevel").map(String::as_str), Some("3"));
    }

    #[test_case]
    fn test_parse_empty() {
        assert!(parse("").is_empty());
    }

    #[test_case]
    fn test_parse_repeated_key_keeps_last() {
        let params = parse("level=1 level=2");
        assert_eq!(params.get("level").map(String::as_str), Some("2"));
    }
}
