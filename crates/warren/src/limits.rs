//! Protocol buffer ceilings and deterministic truncation.
//!
//! Every size that used to be a fixed socket buffer lives here. Input that
//! exceeds a ceiling is truncated at a UTF-8 boundary, never corrupted and
//! never allowed to grow a response past the line ceiling.

use std::time::Duration;

/// Longest line accepted from or sent to a client, in bytes, including the
/// trailing newline.
pub const MAX_LINE_BYTES: usize = 4096;

/// Longest command token (the first word of a line).
pub const MAX_COMMAND_BYTES: usize = 256;

/// Longest command argument (everything after the first word).
pub const MAX_ARG_BYTES: usize = MAX_LINE_BYTES - MAX_COMMAND_BYTES - 5;

/// Directory-entry names longer than this are truncated in listings.
pub const MAX_NAME_BYTES: usize = 255;

/// Upper bound on nested `@script` replays within one session.
pub const MAX_SCRIPT_DEPTH: u32 = 5;

/// Welcome string sent on connect and in response to `INFO`.
pub const DEFAULT_WELCOME: &str = "Welcome to the test server 'myserver'";

/// How long a client waits for further lines of a multi-line response
/// (`LIST` has no end-of-list marker; a pause is the end).
pub const CLIENT_RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Truncate `s` to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn truncate_short_input_is_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn truncate_cuts_at_byte_limit() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        // "héllo": 'é' is two bytes starting at index 1.
        let s = "h\u{e9}llo";
        assert_eq!(truncate(s, 2), "h");
        assert_eq!(truncate(s, 3), "h\u{e9}");
    }

    #[test]
    fn ceilings_are_consistent() {
        assert!(MAX_COMMAND_BYTES + MAX_ARG_BYTES < MAX_LINE_BYTES);
    }
}
