// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of execution histories into a run summary.
//!
//! Everything in this module is pure: it consumes the finalized
//! [`AttemptStore`](crate::store::AttemptStore) contents and produces the
//! [`RunSummary`] the notification payload is rendered from. Classifications
//! are derived on demand and never cached across runs.

use crate::{
    helpers::{stack_head, truncate_with_ellipsis},
    store::{AttemptRecord, ExecutionHistory, TestCaseId},
};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use std::time::Duration;

/// Placeholder for a failed attempt that carried no error message.
pub const MISSING_ERROR_MESSAGE: &str = "(no error message)";

/// Placeholder for a test with no reported source location.
pub const UNKNOWN_LOCATION: &str = "(unknown location)";

/// Maximum length of a captured error message, ellipsis included.
pub const ERROR_TRUNCATE_LEN: usize = 200;

/// Number of stack trace lines kept in a captured failure detail.
pub const STACK_HEAD_LINES: usize = 3;

/// The final classification of one test, derived from its history.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FinalStatus {
    /// The last attempt passed and no earlier attempt failed hard.
    Passed,
    /// The last attempt passed after at least one failed or timed-out
    /// attempt.
    Flaky,
    /// The last attempt failed.
    Failed,
    /// The last attempt was skipped.
    Skipped,
    /// The last attempt timed out.
    TimedOut,
}

/// A description of one test's executions, borrowing from its history.
///
/// Only the last attempt's status determines pass/fail/skip/timeout;
/// intermediate failures only matter for the flaky determination. A test
/// that fails and then passes on retry is never counted as failed.
#[derive(Copy, Clone, Debug)]
pub enum ExecutionDescription<'h> {
    /// The final attempt passed cleanly.
    Passed {
        /// The last, passing attempt.
        last_attempt: &'h AttemptRecord,
    },

    /// The final attempt passed, but an earlier attempt failed hard.
    Flaky {
        /// The last, passing attempt.
        last_attempt: &'h AttemptRecord,
        /// Total number of attempts, including the passing one.
        attempts: usize,
    },

    /// The final attempt failed.
    Failed {
        /// The last, failing attempt.
        last_attempt: &'h AttemptRecord,
    },

    /// The final attempt was skipped.
    Skipped,

    /// The final attempt timed out.
    TimedOut {
        /// The last, timed-out attempt.
        last_attempt: &'h AttemptRecord,
    },
}

impl<'h> ExecutionDescription<'h> {
    /// Classifies an execution history.
    pub fn of(history: &'h ExecutionHistory) -> Self {
        use crate::store::AttemptStatus::*;

        let last_attempt = history.last_attempt();
        match last_attempt.status {
            Passed => {
                // Flaky requires a retry *and* a prior hard failure: a test
                // whose single attempt passed, or whose earlier attempts
                // were all skips, reads as plain passed.
                if history.len() > 1 && history.had_hard_failure() {
                    ExecutionDescription::Flaky {
                        last_attempt,
                        attempts: history.len(),
                    }
                } else {
                    ExecutionDescription::Passed { last_attempt }
                }
            }
            Failed => ExecutionDescription::Failed { last_attempt },
            Skipped => ExecutionDescription::Skipped,
            TimedOut => ExecutionDescription::TimedOut { last_attempt },
        }
    }

    /// Returns the final status for this description.
    pub fn final_status(&self) -> FinalStatus {
        match self {
            ExecutionDescription::Passed { .. } => FinalStatus::Passed,
            ExecutionDescription::Flaky { .. } => FinalStatus::Flaky,
            ExecutionDescription::Failed { .. } => FinalStatus::Failed,
            ExecutionDescription::Skipped => FinalStatus::Skipped,
            ExecutionDescription::TimedOut { .. } => FinalStatus::TimedOut,
        }
    }
}

/// Aggregate counts for a run, one per classification.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// Tests that passed on their only attempt.
    pub passed: usize,
    /// Tests that passed on retry after a hard failure.
    pub flaky: usize,
    /// Tests whose last attempt failed.
    pub failed: usize,
    /// Tests whose last attempt was skipped.
    pub skipped: usize,
    /// Tests whose last attempt timed out.
    pub timed_out: usize,
}

impl RunStats {
    fn on_test_classified(&mut self, status: FinalStatus) {
        match status {
            FinalStatus::Passed => self.passed += 1,
            FinalStatus::Flaky => self.flaky += 1,
            FinalStatus::Failed => self.failed += 1,
            FinalStatus::Skipped => self.skipped += 1,
            FinalStatus::TimedOut => self.timed_out += 1,
        }
    }

    /// Total number of distinct tests observed.
    pub fn total(&self) -> usize {
        self.passed + self.flaky + self.failed + self.skipped + self.timed_out
    }

    /// Failed and timed-out tests, merged for display. The classifications
    /// stay distinct internally.
    pub fn failed_total(&self) -> usize {
        self.failed + self.timed_out
    }

    /// Tests whose final attempt passed, whether or not they were retried.
    pub fn passed_total(&self) -> usize {
        self.passed + self.flaky
    }

    /// Returns true if any test failed or timed out.
    pub fn any_failed(&self) -> bool {
        self.failed_total() > 0
    }

    /// Returns the overall status for the run.
    pub fn status_level(&self) -> RunStatusLevel {
        if self.any_failed() {
            RunStatusLevel::Failed
        } else if self.flaky > 0 {
            RunStatusLevel::Unstable
        } else {
            RunStatusLevel::Passed
        }
    }
}

/// The overall status of a run, as reported in the notification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunStatusLevel {
    /// Every test's final attempt passed with no retries needed.
    Passed,
    /// No failures, but at least one test needed a retry to pass.
    Unstable,
    /// At least one test failed or timed out.
    Failed,
}

impl RunStatusLevel {
    /// The status label rendered into the notification.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatusLevel::Passed => "PASSED",
            RunStatusLevel::Unstable => "UNSTABLE",
            RunStatusLevel::Failed => "FAILED",
        }
    }

    /// The fixed theme color for the rendered card.
    pub fn theme_color(self) -> &'static str {
        match self {
            RunStatusLevel::Passed => "2EB886",
            RunStatusLevel::Unstable => "DAA038",
            RunStatusLevel::Failed => "A30200",
        }
    }

    /// The status emoji for the card's title line.
    pub fn emoji(self) -> &'static str {
        match self {
            RunStatusLevel::Passed => "\u{2705}",
            RunStatusLevel::Unstable => "\u{26a0}\u{fe0f}",
            RunStatusLevel::Failed => "\u{274c}",
        }
    }
}

/// Captured detail for a failed or timed-out test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailedTestDetail {
    /// The test's title.
    pub title: String,
    /// The error message from the final attempt, truncated.
    pub message: String,
    /// The first lines of the stack trace, if one was reported.
    pub stack: Option<String>,
    /// The test's location, rendered as `file:line` or a placeholder.
    pub location: String,
}

impl FailedTestDetail {
    /// Captures failure detail from a test's final attempt. Shared between
    /// failed and timed-out classifications.
    fn capture(title: &str, last_attempt: &AttemptRecord) -> Self {
        let error = last_attempt.error.as_ref();
        let message = match error.and_then(|e| e.message.as_deref()) {
            Some(message) => truncate_with_ellipsis(message, ERROR_TRUNCATE_LEN),
            None => MISSING_ERROR_MESSAGE.to_owned(),
        };
        let stack = error
            .and_then(|e| e.stack.as_deref())
            .map(|stack| stack_head(stack, STACK_HEAD_LINES));
        let location = match &last_attempt.location {
            Some(loc) => format!("{}:{}", loc.file, loc.line),
            None => UNKNOWN_LOCATION.to_owned(),
        };
        Self {
            title: title.to_owned(),
            message,
            stack,
            location,
        }
    }
}

/// Captured detail for a flaky test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlakyTestDetail {
    /// The test's title.
    pub title: String,
    /// Total number of attempts, including the final passing one.
    pub attempts: usize,
}

/// Everything the notification payload needs about a finished run.
///
/// Built once at run end; immutable thereafter.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Aggregate counts per classification.
    pub stats: RunStats,
    /// Detail for every failed or timed-out test, in completion order.
    pub failed: Vec<FailedTestDetail>,
    /// Detail for every flaky test, in completion order.
    pub flaky: Vec<FlakyTestDetail>,
    /// When the run started.
    pub start_time: DateTime<Local>,
    /// How long the run took.
    pub duration: Duration,
}

impl RunSummary {
    /// Classifies every history and aggregates the run summary.
    pub fn new(
        histories: &IndexMap<TestCaseId, ExecutionHistory>,
        start_time: DateTime<Local>,
        duration: Duration,
    ) -> Self {
        let mut stats = RunStats::default();
        let mut failed = Vec::new();
        let mut flaky = Vec::new();

        for history in histories.values() {
            let description = ExecutionDescription::of(history);
            stats.on_test_classified(description.final_status());
            match description {
                ExecutionDescription::Failed { last_attempt }
                | ExecutionDescription::TimedOut { last_attempt } => {
                    failed.push(FailedTestDetail::capture(history.title(), last_attempt));
                }
                ExecutionDescription::Flaky { attempts, .. } => {
                    flaky.push(FlakyTestDetail {
                        title: history.title().to_owned(),
                        attempts,
                    });
                }
                ExecutionDescription::Passed { .. } | ExecutionDescription::Skipped => {}
            }
        }

        Self {
            stats,
            failed,
            flaky,
            start_time,
            duration,
        }
    }
}
