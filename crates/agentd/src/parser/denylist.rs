// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placeholder denylist (spec §4.5 "Placeholder filter").
//!
//! Elevated to a configuration table per spec.md §9's open question, rather
//! than being hard-coded into the parsing logic that consumes it.

use regex::Regex;
use std::sync::LazyLock;

/// Literal placeholder strings rejected verbatim (case-insensitive,
/// whitespace-trimmed match).
pub const LITERAL_DENYLIST: &[&str] = &[
    "...",
    "....",
    "task1",
    "item1",
    "src/file1.ts",
    "what you've done",
    "none",
    "n/a",
    "tbd",
];

static PLACEHOLDER_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^\.{2,}$").expect("valid regex"),
        Regex::new(r"^\[\.{3}\]$").expect("valid regex"),
        Regex::new(r"^<[^>]*>$").expect("valid regex"),
    ]
});

/// A denylist of placeholder strings, extensible at runtime (spec.md §9:
/// "elevate it to a configuration table so it can be extended without code
/// changes").
#[derive(Debug, Clone)]
pub struct Denylist {
    literals: Vec<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self { literals: LITERAL_DENYLIST.iter().map(|s| s.to_lowercase()).collect() }
    }
}

impl Denylist {
    /// Build a denylist with additional literal entries appended to the
    /// built-in table.
    pub fn with_extra(extra: impl IntoIterator<Item = String>) -> Self {
        let mut d = Self::default();
        d.literals.extend(extra.into_iter().map(|s| s.to_lowercase()));
        d
    }

    /// Whether the entire (trimmed) value is a placeholder.
    pub fn is_placeholder(&self, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return true;
        }
        let lower = trimmed.to_lowercase();
        if self.literals.iter().any(|l| l == &lower) {
            return true;
        }
        PLACEHOLDER_REGEXES.iter().any(|r| r.is_match(trimmed))
    }
}

#[cfg(test)]
#[path = "denylist_tests.rs"]
mod tests;
