//! Kernel parameters applied after `cmdline` is parsed (spec section 4.12).
//!
//! The original's `initcall()`/`initcall_dependency()` macros placed
//! function pointers into link sections the linker script collected into a
//! dependency-sorted array (`core` -> `subsys` -> `device`); its `kparam.h`
//! did the same for command-line-settable globals, applied by
//! `kparam_init()` once `kernel_cmdline_init()` had run. Rust has no
//! portable equivalent of a link-section registry without pulling in a
//! crate the teacher's stack doesn't carry, so this keeps the same
//! "apply after cmdline" contract as a hand-maintained table instead: a
//! setting earns a slot here by being added to [`KPARAMS`].

/// One command-line-settable kernel parameter.
struct KParam {
    name: &'static str,
    apply: fn(&str),
}

const KPARAMS: &[KParam] = &[KParam {
    name: "loglevel",
    apply: apply_loglevel,
}];

fn apply_loglevel(value: &str) {
    let level = match value {
        "error" | "0" => log::LevelFilter::Error,
        "warn" | "1" => log::LevelFilter::Warn,
        "info" | "2" => log::LevelFilter::Info,
        "debug" | "3" => log::LevelFilter::Debug,
        "trace" | "4" => log::LevelFilter::Trace,
        other => {
            println!("[INITCALL] unrecognized loglevel={other}, leaving default");
            return;
        }
    };
    log::set_max_level(level);
    println!("[INITCALL] loglevel={level}");
}

/// Run every registered kernel parameter's `apply` function against the
/// value `cmdline::init` parsed out, if the parameter was present at all.
pub fn run_all() {
    for param in KPARAMS {
        if let Some(value) = crate::cmdline::get(param.name) {
            (param.apply)(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_kparams_table_nonempty() {
        assert!(!KPARAMS.is_empty());
    }
}
