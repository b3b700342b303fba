// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events consumed by the reporter.
//!
//! These are plain data types, decoupled from any host plugin interface:
//! an adapter converts the host's callbacks into these events and forwards
//! them to the [`WebhookReporter`](crate::reporter::WebhookReporter).

use crate::store::{AttemptStatus, ErrorInfo, SourceLocation, TestCaseId};

/// The host runner's own verdict for the run, carried on the run-finished
/// event.
///
/// Consumed for logging only: the summary derives its own status from the
/// recorded attempts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HostRunStatus {
    /// The host considers the run passed.
    Passed,
    /// The host considers the run failed.
    Failed,
    /// The run was interrupted before completing.
    Interrupted,
}

/// One test finished one execution attempt.
#[derive(Clone, Debug)]
pub struct TestFinishedEvent {
    /// Stable identity, shared by all attempts of this test.
    pub id: TestCaseId,
    /// Human-readable title.
    pub title: String,
    /// The outcome of this attempt.
    pub status: AttemptStatus,
    /// The host's retry counter: 0 for the initial attempt.
    pub retry_index: u32,
    /// Error details, if any.
    pub error: Option<ErrorInfo>,
    /// Where the test is defined, if known.
    pub location: Option<SourceLocation>,
}

/// The run finished; no further test events will arrive.
#[derive(Copy, Clone, Debug)]
pub struct RunFinishedEvent {
    /// The host's overall verdict.
    pub status: HostRunStatus,
}
