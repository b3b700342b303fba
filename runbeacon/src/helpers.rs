// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for runbeacon.

use std::time::Duration;

/// The marker appended to truncated text.
pub(crate) const ELLIPSIS: &str = "...";

/// Truncates `s` to at most `max` characters, appending an ellipsis marker if
/// anything was cut. The result, marker included, never exceeds `max`.
pub(crate) fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    debug_assert!(max >= ELLIPSIS.len(), "max must fit the ellipsis marker");
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let kept: String = s.chars().take(max - ELLIPSIS.len()).collect();
    format!("{kept}{ELLIPSIS}")
}

/// Returns the first `lines` lines of `stack`, joined by newlines. Keeps the
/// payload bounded even for deeply nested stack traces.
pub(crate) fn stack_head(stack: &str, lines: usize) -> String {
    stack.lines().take(lines).collect::<Vec<_>>().join("\n")
}

/// Formats a duration the way it reads in a notification subtitle: seconds
/// with one decimal under a minute, whole minutes and seconds above.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = duration.as_secs();
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}

/// Formats the share of `passed` out of `total` as a percentage with one
/// decimal. A run with no tests reads as 100%.
pub(crate) fn pass_rate(passed: usize, total: usize) -> String {
    if total == 0 {
        return "100.0%".to_owned();
    }
    format!("{:.1}%", passed as f64 * 100.0 / total as f64)
}

/// Utilities for pluralizing words based on count.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "attempt" if `count` is 1, otherwise "attempts".
    pub(crate) fn attempts_str(count: usize) -> &'static str {
        if count == 1 { "attempt" } else { "attempts" }
    }
}
