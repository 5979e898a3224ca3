//! Boot-time command-line parsing (SPEC_FULL §4.11, ambient/thin).
//!
//! Grounded on `original_source/args.c`'s token loop (`-live`, `-silent`, `-root=XXXX`),
//! with the guard condition corrected: the original's `if(*cmdline) return;` returns
//! *before parsing* whenever the command line is non-empty, which silently disables
//! argument parsing on every boot that actually supplies one. The reimplementation
//! returns the all-default configuration only when the command line is empty.

use alloc::string::{String, ToString};

/// Parsed, immutable boot-time configuration (SPEC_FULL §3 "Boot configuration").
/// Built exactly once at boot from the multiboot command-line field and never re-parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootConfig {
    pub live: bool,
    pub silent: bool,
    /// 4-character pinned root volume token, e.g. `-root=sda1` -> `sda1`.
    pub root: Option<[u8; 4]>,
}

/// Tokenizes `cmdline` on whitespace and recognizes `-live`, `-silent`, `-root=XXXX`.
/// Unrecognized tokens are ignored. An empty command line yields the all-default
/// configuration immediately.
pub fn args_parse(cmdline: &str) -> BootConfig {
    if cmdline.is_empty() {
        return BootConfig::default();
    }

    let mut config = BootConfig::default();
    for token in cmdline.split_whitespace() {
        if token == "-live" {
            config.live = true;
        } else if token == "-silent" {
            config.silent = true;
        } else if let Some(vol) = token.strip_prefix("-root=") {
            let mut buf = [0u8; 4];
            for (dst, src) in buf.iter_mut().zip(vol.bytes()) {
                *dst = src;
            }
            config.root = Some(buf);
        }
    }
    config
}

/// Decodes a pinned root-volume token back to a display string, for logging.
pub fn root_token_to_string(token: [u8; 4]) -> String {
    core::str::from_utf8(&token)
        .unwrap_or("????")
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cmdline_is_all_defaults() {
        let config = args_parse("");
        assert_eq!(config, BootConfig::default());
    }

    #[test]
    fn live_and_silent_tokens_set_flags() {
        let config = args_parse("-live -silent");
        assert!(config.live);
        assert!(config.silent);
        assert_eq!(config.root, None);
    }

    #[test]
    fn root_token_is_truncated_to_four_bytes() {
        let config = args_parse("-root=sda1extra");
        assert_eq!(config.root, Some(*b"sda1"));
    }

    #[test]
    fn unrecognized_tokens_are_ignored() {
        let config = args_parse("-verbose -live");
        assert!(config.live);
    }
}
