// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::ReporterConfig,
    delivery::{DeliveryClient, DeliveryOutcome},
    errors::ConfigError,
    reporter::{RunFinishedEvent, SummaryCard, TestFinishedEvent},
    store::{AttemptRecord, AttemptStore},
    summary::RunSummary,
    time::{StopwatchStart, stopwatch},
};
use chrono::Local;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observes a test run and posts a summary card to the configured webhook
/// when it finishes.
///
/// The reporter is driven by three calls, in order: [`on_run_started`]
/// (once), [`on_test_finished`] (once per execution attempt, possibly from
/// parallel workers), and [`on_run_finished`] (once, after every attempt
/// has been recorded). Nothing in the notification path can fail the test
/// run: delivery problems are logged and reduced to a [`DeliveryOutcome`].
///
/// [`on_run_started`]: Self::on_run_started
/// [`on_test_finished`]: Self::on_test_finished
/// [`on_run_finished`]: Self::on_run_finished
pub struct WebhookReporter {
    config: ReporterConfig,
    client: Option<DeliveryClient>,
    store: AttemptStore,
    stopwatch: Option<StopwatchStart>,
}

impl WebhookReporter {
    /// Constructs a reporter that delivers over HTTP.
    ///
    /// The delivery client is only constructed when an endpoint is
    /// configured; without one the reporter records and classifies as
    /// usual but skips delivery.
    pub fn new(config: ReporterConfig) -> Result<Self, ConfigError> {
        let client = if config.webhook_url.is_some() {
            Some(DeliveryClient::new(config.delivery)?)
        } else {
            None
        };
        Ok(Self::with_delivery_client(config, client))
    }

    /// Constructs a reporter around an existing delivery client.
    ///
    /// This is the seam for tests and for hosts that bring their own
    /// transport; `None` disables delivery regardless of the configured
    /// endpoint.
    pub fn with_delivery_client(config: ReporterConfig, client: Option<DeliveryClient>) -> Self {
        Self {
            config,
            client,
            store: AttemptStore::new(),
            stopwatch: None,
        }
    }

    /// Marks the beginning of the run and captures its start time.
    pub fn on_run_started(&mut self) {
        self.stopwatch = Some(stopwatch());
        debug!("test run started");
    }

    /// Records one finished execution attempt.
    pub fn on_test_finished(&self, event: TestFinishedEvent) {
        let TestFinishedEvent {
            id,
            title,
            status,
            retry_index,
            error,
            location,
        } = event;
        debug!(test = %id, ?status, retry_index, "recording attempt");
        self.store.record(
            id,
            &title,
            AttemptRecord {
                status,
                retry_index,
                error,
                location,
            },
        );
    }

    /// Finishes the run: classifies every recorded history, builds the
    /// summary card, and delivers it.
    ///
    /// Returns `None` when no endpoint is configured (a deliberate skip,
    /// not an error), otherwise the delivery's terminal outcome. Call this
    /// at most once; the recorded attempts are consumed.
    pub async fn on_run_finished(&mut self, event: RunFinishedEvent) -> Option<DeliveryOutcome> {
        debug!(host_status = ?event.status, "test run finished");

        let (start_time, duration) = match self.stopwatch.take() {
            Some(watch) => {
                let snapshot = watch.snapshot();
                (snapshot.start_time, snapshot.duration)
            }
            // Tolerate a host that never signaled run start.
            None => (Local::now(), Duration::ZERO),
        };

        let histories = std::mem::take(&mut self.store).into_histories();
        let summary = RunSummary::new(&histories, start_time, duration);
        info!(
            total = summary.stats.total(),
            passed = summary.stats.passed,
            failed = summary.stats.failed_total(),
            flaky = summary.stats.flaky,
            skipped = summary.stats.skipped,
            status = summary.stats.status_level().as_str(),
            "run summary ready"
        );

        let (Some(endpoint), Some(client)) = (&self.config.webhook_url, &self.client) else {
            info!("no webhook endpoint configured, skipping notification");
            return None;
        };

        let card = SummaryCard::build(&self.config, &summary);
        let body = match serde_json::to_value(&card) {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "failed to serialize notification payload");
                return Some(DeliveryOutcome::Abandoned);
            }
        };

        Some(client.deliver(endpoint, &body).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvSnapshot;
    use crate::store::{AttemptStatus, TestCaseId};

    fn passing_event(name: &str) -> TestFinishedEvent {
        TestFinishedEvent {
            id: TestCaseId::new(name),
            title: name.to_owned(),
            status: AttemptStatus::Passed,
            retry_index: 0,
            error: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn no_endpoint_skips_delivery() {
        let config = ReporterConfig::from_env(&EnvSnapshot::default()).expect("valid config");
        let mut reporter = WebhookReporter::new(config).expect("reporter constructs");

        reporter.on_run_started();
        reporter.on_test_finished(passing_event("a"));
        let outcome = reporter
            .on_run_finished(RunFinishedEvent {
                status: crate::reporter::HostRunStatus::Passed,
            })
            .await;
        assert_eq!(outcome, None);
    }

    #[tokio::test]
    async fn run_finish_tolerates_missing_run_start() {
        let config = ReporterConfig::from_env(&EnvSnapshot::default()).expect("valid config");
        let mut reporter = WebhookReporter::new(config).expect("reporter constructs");

        reporter.on_test_finished(passing_event("a"));
        let outcome = reporter
            .on_run_finished(RunFinishedEvent {
                status: crate::reporter::HostRunStatus::Passed,
            })
            .await;
        assert_eq!(outcome, None);
    }
}
