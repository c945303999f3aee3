// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ANSI/escape-sequence stripping for output classification (spec §4.1).
//!
//! Only stripped text is ever fed to the parser or idle detector; raw bytes
//! are preserved separately for re-display. This is a classification aid,
//! not a terminal emulator — byte-exact rendering is explicitly out of
//! scope.

use std::sync::LazyLock;

use regex::Regex;

static CSI_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid regex"));
static OSC_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(\x07|\x1b\\)").expect("valid regex"));
static OTHER_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b[()#][0-9A-Za-z]|\x1b[=>MNOPZ78]").expect("valid regex"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]").expect("valid regex"));
static CARRIAGE_RETURN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").expect("valid regex"));

/// Strip ANSI/VT escape sequences and most control characters from a chunk
/// of raw PTY output, leaving a plain-text view suitable for classification.
pub fn strip(raw: &str) -> String {
    let stripped = OSC_SEQUENCE.replace_all(raw, "");
    let stripped = CSI_SEQUENCE.replace_all(&stripped, "");
    let stripped = OTHER_ESCAPE.replace_all(&stripped, "");
    let stripped = CARRIAGE_RETURN.replace_all(&stripped, "\n");
    CONTROL_CHARS.replace_all(&stripped, "").into_owned()
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
