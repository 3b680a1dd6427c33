// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Cleanup of captured terminal output.
//!
//! Terminal tool invocations in a Copilot export carry the raw bytes the
//! command wrote, escape sequences included. These helpers turn that into
//! plain text and keep very long output from dominating a turn document.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Matches CSI sequences, OSC sequences (BEL or ST terminated), charset
/// designations, and finally any ESC left over.
///
/// The trailing bare `\x1b` alternative guarantees the output never contains
/// ESC, which is what makes [`strip_ansi_codes`] idempotent.
static ANSI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1b")
        .expect("ANSI pattern is valid")
});

/// Head/tail line counts used when truncating terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Lines kept from the start of the output.
    pub head: usize,
    /// Lines kept from the end of the output.
    pub tail: usize,
}

impl Default for Truncation {
    fn default() -> Self {
        Self { head: 5, tail: 5 }
    }
}

/// Slack added on top of `head + tail` so that truncation never hides only a
/// line or two.
const TRUNCATION_MARGIN: usize = 2;

/// Removes terminal escape sequences (colors, cursor movement, titles).
///
/// # Example
///
/// ```
/// use cpturns::sanitize::strip_ansi_codes;
///
/// assert_eq!(strip_ansi_codes("\x1b[32mok\x1b[0m"), "ok");
/// ```
#[must_use]
pub fn strip_ansi_codes(text: &str) -> Cow<'_, str> {
    ANSI_PATTERN.replace_all(text, "")
}

/// Keeps the first `head` and last `tail` lines of `text`, replacing the
/// middle with a single `... (N lines omitted) ...` line.
///
/// Text with at most `head + tail + 2` lines is returned unchanged.
///
/// # Example
///
/// ```
/// use cpturns::sanitize::truncate_output;
///
/// let text: Vec<String> = (1..=50).map(|i| i.to_string()).collect();
/// let joined = text.join("\n");
/// let out = truncate_output(&joined, 5, 5);
/// assert!(out.contains("... (40 lines omitted) ..."));
/// ```
#[must_use]
pub fn truncate_output(text: &str, head: usize, tail: usize) -> Cow<'_, str> {
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    if total <= head + tail + TRUNCATION_MARGIN {
        return Cow::Borrowed(text);
    }

    let omitted = total - head - tail;
    let marker = format!("... ({omitted} lines omitted) ...");

    let mut kept: Vec<&str> = Vec::with_capacity(head + tail + 1);
    kept.extend_from_slice(&lines[..head]);
    kept.push(&marker);
    kept.extend_from_slice(&lines[total - tail..]);

    Cow::Owned(kept.join("\n"))
}

/// Strips escape sequences and, when `truncation` is set, shortens the result.
#[must_use]
pub fn clean_terminal_output(text: &str, truncation: Option<Truncation>) -> String {
    let stripped = strip_ansi_codes(text);
    match truncation {
        Some(Truncation { head, tail }) => truncate_output(&stripped, head, tail).into_owned(),
        None => stripped.into_owned(),
    }
}
