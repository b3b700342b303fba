// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accumulation of per-test execution attempts during a run.
//!
//! The [`AttemptStore`] is the only shared mutable state in the crate: test
//! workers append [`AttemptRecord`]s as attempts finish, and at run end the
//! store is consumed wholesale for classification. Appends are serialized by
//! a single lock; entries for different tests are disjoint, so one lock is
//! sufficient and keeps the ordering story simple.

use indexmap::IndexMap;
use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

/// A stable identifier for one logical test.
///
/// Identical across all attempts of the same test within one run. The
/// contents are opaque to runbeacon; hosts typically use a file path plus a
/// fully qualified test name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TestCaseId(String);

impl TestCaseId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outcome of a single execution attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptStatus {
    /// The attempt passed.
    Passed,
    /// The attempt failed.
    Failed,
    /// The attempt was skipped.
    Skipped,
    /// The attempt was terminated due to timeout.
    TimedOut,
}

impl AttemptStatus {
    /// Returns true if this attempt counts as a hard failure for flakiness
    /// purposes.
    pub fn is_hard_failure(self) -> bool {
        matches!(self, AttemptStatus::Failed | AttemptStatus::TimedOut)
    }
}

/// Error information captured from a failed attempt, as reported by the
/// host runner. Both fields are optional; placeholders are substituted at
/// classification time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorInfo {
    /// The error message.
    pub message: Option<String>,
    /// The stack trace.
    pub stack: Option<String>,
}

/// Source location for a test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation {
    /// The file the test is defined in.
    pub file: String,
    /// The 1-based line number.
    pub line: u32,
}

/// A single recorded execution attempt. Immutable once recorded.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    /// The outcome of this attempt.
    pub status: AttemptStatus,
    /// The host's retry counter: 0 for the initial attempt.
    ///
    /// Recorded for diagnostics only. Histories are ordered by arrival, not
    /// by this index.
    pub retry_index: u32,
    /// Error details, if the host reported any.
    pub error: Option<ErrorInfo>,
    /// Where the test is defined, if the host reported it.
    pub location: Option<SourceLocation>,
}

/// All recorded attempts for one test, in arrival order.
///
/// Guaranteed to be non-empty: a history is only created by recording its
/// first attempt.
#[derive(Clone, Debug)]
pub struct ExecutionHistory {
    title: String,
    attempts: Vec<AttemptRecord>,
}

#[allow(clippy::len_without_is_empty)] // a history is never empty
impl ExecutionHistory {
    fn new(title: &str, first: AttemptRecord) -> Self {
        Self {
            title: title.to_owned(),
            attempts: vec![first],
        }
    }

    fn push(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// The test's human-readable title, taken from the first recorded
    /// attempt.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the last-recorded attempt.
    ///
    /// This is the attempt that decides the test's final classification.
    pub fn last_attempt(&self) -> &AttemptRecord {
        self.attempts.last().expect("execution history is non-empty")
    }

    /// Returns the number of recorded attempts.
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Iterates over all attempts in arrival order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ AttemptRecord> + '_ {
        self.attempts.iter()
    }

    /// Returns true if any recorded attempt failed or timed out.
    pub fn had_hard_failure(&self) -> bool {
        self.attempts.iter().any(|a| a.status.is_hard_failure())
    }
}

/// Append-only store of execution histories, keyed by test identity.
///
/// Tolerates concurrent [`record`](Self::record) calls from parallel test
/// workers. Classification happens strictly after recording has finished:
/// [`into_histories`](Self::into_histories) consumes the store, so the type
/// system enforces the barrier.
#[derive(Debug, Default)]
pub struct AttemptStore {
    histories: Mutex<IndexMap<TestCaseId, ExecutionHistory>>,
}

impl AttemptStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `attempt` to the history for `id`, creating the history if
    /// this is the test's first recorded attempt.
    ///
    /// `title` is only consulted on creation; later attempts keep the first
    /// title seen.
    pub fn record(&self, id: TestCaseId, title: &str, attempt: AttemptRecord) {
        // Recover from poisoning: entries are plain data, and losing a
        // record over an unrelated panic would corrupt the counts.
        let mut histories = self
            .histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match histories.entry(id) {
            indexmap::map::Entry::Occupied(mut entry) => entry.get_mut().push(attempt),
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(ExecutionHistory::new(title, attempt));
            }
        }
    }

    /// Returns the number of distinct tests recorded so far.
    pub fn len(&self) -> usize {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalizes the store, yielding all histories in first-seen order.
    pub fn into_histories(self) -> IndexMap<TestCaseId, ExecutionHistory> {
        self.histories.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn attempt(status: AttemptStatus, retry_index: u32) -> AttemptRecord {
        AttemptRecord {
            status,
            retry_index,
            error: None,
            location: None,
        }
    }

    #[test]
    fn record_appends_in_arrival_order() {
        let store = AttemptStore::new();
        let id = TestCaseId::new("suite.rs::renders");
        store.record(id.clone(), "renders", attempt(AttemptStatus::Failed, 0));
        store.record(id.clone(), "renders", attempt(AttemptStatus::Passed, 1));

        let histories = store.into_histories();
        let history = &histories[&id];
        assert_eq!(history.len(), 2);
        assert_eq!(history.title(), "renders");
        assert_eq!(history.last_attempt().status, AttemptStatus::Passed);
        assert!(history.had_hard_failure());
    }

    #[test]
    fn arrival_order_wins_over_retry_index() {
        // Retry indices arriving out of order are preserved as appended.
        let store = AttemptStore::new();
        let id = TestCaseId::new("suite.rs::out_of_order");
        store.record(id.clone(), "out of order", attempt(AttemptStatus::Passed, 1));
        store.record(id.clone(), "out of order", attempt(AttemptStatus::Failed, 0));

        let histories = store.into_histories();
        let history = &histories[&id];
        assert_eq!(history.last_attempt().status, AttemptStatus::Failed);
        assert_eq!(history.last_attempt().retry_index, 0);
    }

    #[test]
    fn first_title_is_kept() {
        let store = AttemptStore::new();
        let id = TestCaseId::new("suite.rs::renamed");
        store.record(id.clone(), "original", attempt(AttemptStatus::Failed, 0));
        store.record(id.clone(), "renamed", attempt(AttemptStatus::Passed, 1));

        let histories = store.into_histories();
        assert_eq!(histories[&id].title(), "original");
    }

    #[test]
    fn histories_iterate_in_first_seen_order() {
        let store = AttemptStore::new();
        for name in ["c", "a", "b"] {
            store.record(
                TestCaseId::new(name),
                name,
                attempt(AttemptStatus::Passed, 0),
            );
        }
        let ids: Vec<_> = store
            .into_histories()
            .keys()
            .map(|id| id.as_str().to_owned())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let store = Arc::new(AttemptStore::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let id = TestCaseId::new(format!("worker-{worker}::test-{i}"));
                    store.record(id.clone(), "t", attempt(AttemptStatus::Passed, 0));
                    store.record(id, "t", attempt(AttemptStatus::Passed, 1));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        let store = Arc::into_inner(store).expect("all workers joined");
        let histories = store.into_histories();
        assert_eq!(histories.len(), 800);
        assert!(histories.values().all(|h| h.len() == 2));
    }
}
