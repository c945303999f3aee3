// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::strip;

#[test]
fn strips_csi_color_codes() {
    let raw = "\x1b[31mhello\x1b[0m world";
    assert_eq!(strip(raw), "hello world");
}

#[test]
fn strips_cursor_movement() {
    let raw = "\x1b[2K\x1b[1Gspinning...";
    assert_eq!(strip(raw), "spinning...");
}

#[test]
fn strips_osc_title_sequence() {
    let raw = "\x1b]0;window title\x07prompt> ";
    assert_eq!(strip(raw), "prompt> ");
}

#[test]
fn normalizes_crlf_to_lf() {
    let raw = "line one\r\nline two\r";
    assert_eq!(strip(raw), "line one\nline two\n");
}

#[test]
fn passes_through_plain_text() {
    let raw = "[[SUMMARY]]\ncurrent task: build parser\n[[/SUMMARY]]";
    assert_eq!(strip(raw), raw);
}
