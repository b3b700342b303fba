// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire format for the webhook notification.
//!
//! The payload is a MessageCard-style JSON document: a theme color, a
//! summary line, sections with facts and markdown text, and an optional
//! action link. Built once per run from the [`RunSummary`], then handed to
//! the delivery client.

use crate::{
    config::ReporterConfig,
    helpers::{format_duration, pass_rate, plural},
    summary::RunSummary,
};
use serde::Serialize;

/// Maximum number of failed tests listed in the card.
pub const MAX_FAILED_ENTRIES: usize = 10;

/// Maximum number of flaky tests listed in the card.
pub const MAX_FLAKY_ENTRIES: usize = 5;

/// The JSON document POSTed to the webhook.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryCard {
    #[serde(rename = "@type")]
    card_type: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "themeColor")]
    theme_color: &'static str,
    summary: String,
    sections: Vec<CardSection>,
    #[serde(rename = "potentialAction", skip_serializing_if = "Vec::is_empty")]
    actions: Vec<CardAction>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct CardSection {
    #[serde(rename = "activityTitle", skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "activitySubtitle", skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facts: Vec<CardFact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
struct CardFact {
    name: &'static str,
    value: String,
}

#[derive(Clone, Debug, Serialize)]
struct CardAction {
    #[serde(rename = "@type")]
    action_type: &'static str,
    name: &'static str,
    targets: Vec<ActionTarget>,
}

#[derive(Clone, Debug, Serialize)]
struct ActionTarget {
    os: &'static str,
    uri: String,
}

impl SummaryCard {
    /// Renders a finished run into the wire format.
    pub fn build(config: &ReporterConfig, summary: &RunSummary) -> Self {
        let level = summary.stats.status_level();
        let stats = &summary.stats;

        let mut facts = vec![
            CardFact {
                name: "Total tests",
                value: stats.total().to_string(),
            },
            CardFact {
                name: "Passed",
                value: stats.passed.to_string(),
            },
            CardFact {
                name: "Failed",
                value: stats.failed_total().to_string(),
            },
            CardFact {
                name: "Skipped",
                value: stats.skipped.to_string(),
            },
            CardFact {
                name: "Flaky",
                value: stats.flaky.to_string(),
            },
            CardFact {
                name: "Pass rate",
                value: pass_rate(stats.passed_total(), stats.total()),
            },
        ];
        if let Some(ci) = &config.ci {
            facts.push(CardFact {
                name: "CI",
                value: ci.system.as_str().to_owned(),
            });
            if let Some(branch) = &ci.branch {
                facts.push(CardFact {
                    name: "Branch",
                    value: branch.clone(),
                });
            }
            if let Some(commit) = &ci.commit {
                facts.push(CardFact {
                    name: "Commit",
                    value: commit.clone(),
                });
            }
            if let Some(build_number) = &ci.build_number {
                facts.push(CardFact {
                    name: "Build",
                    value: build_number.clone(),
                });
            }
        }

        let mut sections = vec![CardSection {
            title: Some(format!("{} {}", level.emoji(), config.project_name)),
            subtitle: Some(format!(
                "{} \u{2022} took {}",
                summary.start_time.format("%Y-%m-%d %H:%M:%S"),
                format_duration(summary.duration),
            )),
            facts,
            text: None,
        }];

        if !summary.failed.is_empty() {
            sections.push(failed_section(summary));
        }
        if !summary.flaky.is_empty() {
            sections.push(flaky_section(summary));
        }

        let actions = match &config.report_url {
            Some(url) => vec![CardAction {
                action_type: "OpenUri",
                name: "View full report",
                targets: vec![ActionTarget {
                    os: "default",
                    uri: url.clone(),
                }],
            }],
            None => Vec::new(),
        };

        Self {
            card_type: "MessageCard",
            context: "https://schema.org/extensions",
            theme_color: level.theme_color(),
            summary: format!("{}: {} test run", config.project_name, level.as_str()),
            sections,
            actions,
        }
    }
}

fn failed_section(summary: &RunSummary) -> CardSection {
    let mut entries: Vec<String> = summary
        .failed
        .iter()
        .take(MAX_FAILED_ENTRIES)
        .map(|detail| {
            let mut entry = format!(
                "**{}** ({})\n{}",
                detail.title, detail.location, detail.message
            );
            if let Some(stack) = &detail.stack {
                entry.push('\n');
                entry.push_str(stack);
            }
            entry
        })
        .collect();
    let hidden = summary.failed.len().saturating_sub(MAX_FAILED_ENTRIES);
    if hidden > 0 {
        entries.push(format!("+{hidden} more"));
    }

    let count = summary.stats.failed_total();
    CardSection {
        title: Some(format!(
            "Failed {} ({count})",
            plural::tests_str(count)
        )),
        text: Some(entries.join("\n\n")),
        ..CardSection::default()
    }
}

fn flaky_section(summary: &RunSummary) -> CardSection {
    let mut entries: Vec<String> = summary
        .flaky
        .iter()
        .take(MAX_FLAKY_ENTRIES)
        .map(|detail| {
            format!(
                "**{}** \u{2014} passed after {} {}",
                detail.title,
                detail.attempts,
                plural::attempts_str(detail.attempts)
            )
        })
        .collect();
    let hidden = summary.flaky.len().saturating_sub(MAX_FLAKY_ENTRIES);
    if hidden > 0 {
        entries.push(format!("+{hidden} more"));
    }

    let count = summary.flaky.len();
    CardSection {
        title: Some(format!("Flaky {} ({count})", plural::tests_str(count))),
        text: Some(entries.join("\n\n")),
        ..CardSection::default()
    }
}
