//! `#!interpreter` script handler (spec section 4.11): reads the
//! interpreter path off the first line and recursively execs it with the
//! script's own path prepended to argv.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

const MAX_INTERPRETER_LINE: usize = 255;

pub fn matches(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == b'#' && data[1] == b'!'
}

/// Parse the shebang line into `(interpreter, optional_arg)`. Only a
/// single optional argument is supported, matching the common subset of
/// the convention (no shell-style word splitting of further arguments).
pub fn parse_shebang(data: &[u8]) -> Option<(String, Option<String>)> {
    if !matches(data) {
        return None;
    }
    let line_end = data
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(data.len())
        .min(MAX_INTERPRETER_LINE);
    let line = core::str::from_utf8(&data[2..line_end]).ok()?.trim();
    if line.is_empty() {
        return None;
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let interpreter = parts.next()?.to_string();
    let arg = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Some((interpreter, arg))
}

/// Build the argv a recursive exec of the interpreter should see:
/// `[interpreter, optional_arg, script_path, ...original_argv[1..]]`.
pub fn rewrite_argv(interpreter: &str, arg: Option<&str>, script_path: &str, original_argv: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(original_argv.len() + 3);
    argv.push(interpreter.to_string());
    if let Some(arg) = arg {
        argv.push(arg.to_string());
    }
    argv.push(script_path.to_string());
    if original_argv.len() > 1 {
        argv.extend(original_argv[1..].iter().cloned());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_requires_shebang() {
        assert!(matches(b"#!/bin/sh\necho hi\n"));
        assert!(!matches(b"no shebang here"));
    }

    #[test]
    fn test_parse_shebang_with_arg() {
        let (interp, arg) = parse_shebang(b"#!/bin/sh -e\nrest of file").unwrap();
        assert_eq!(interp, "/bin/sh");
        assert_eq!(arg.as_deref(), Some("-e"));
    }

    #[test]
    fn test_parse_shebang_without_arg() {
        let (interp, arg) = parse_shebang(b"#!/bin/true\n").unwrap();
        assert_eq!(interp, "/bin/true");
        assert!(arg.is_none());
    }

    #[test]
    fn test_rewrite_argv_prepends_script_path() {
        let original = alloc::vec!["script.sh".to_string(), "a".to_string(), "b".to_string()];
        let argv = rewrite_argv("/bin/sh", None, "/usr/bin/script.sh", &original);
        assert_eq!(
            argv,
            alloc::vec![
                "/bin/sh".to_string(),
                "/usr/bin/script.sh".to_string(),
                "a".to_string(),
                "b".to_string(),
            ]
        );
    }
}
