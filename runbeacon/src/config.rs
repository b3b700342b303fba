// Copyright (c) The runbeacon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporter configuration, constructed once at process start.
//!
//! All process-environment lookups happen against an [`EnvSnapshot`] taken
//! up front, so the core stays testable without environment mutation and no
//! hidden global state leaks into the reporting path.

use crate::{
    delivery::{DeliveryPolicy, MAX_DELIVERY_ATTEMPTS},
    errors::ConfigError,
};
use std::collections::BTreeMap;

/// Environment variable naming the webhook endpoint. Absent means delivery
/// is skipped for the run.
pub const WEBHOOK_URL_VAR: &str = "RUNBEACON_WEBHOOK_URL";

/// Environment variable overriding the project display name.
pub const PROJECT_NAME_VAR: &str = "RUNBEACON_PROJECT_NAME";

/// Environment variable naming the report URL used for the action link.
pub const REPORT_URL_VAR: &str = "RUNBEACON_REPORT_URL";

/// Environment variable overriding the delivery attempt count.
pub const MAX_RETRIES_VAR: &str = "RUNBEACON_MAX_RETRIES";

/// Display name used when neither the environment nor the host supplies
/// one.
pub const PROJECT_NAME_FALLBACK: &str = "(unnamed project)";

/// An owned snapshot of the process environment.
#[derive(Clone, Debug, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Builds a snapshot from explicit key-value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value for `key`. A variable set to the empty string is
    /// treated as unset, which is how CI templates usually express "off".
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A CI system recognized for metadata extraction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CiSystem {
    /// GitHub Actions.
    GitHubActions,
    /// GitLab CI.
    GitLabCi,
    /// Jenkins.
    Jenkins,
}

impl CiSystem {
    /// The system's display name.
    pub fn as_str(self) -> &'static str {
        match self {
            CiSystem::GitHubActions => "GitHub Actions",
            CiSystem::GitLabCi => "GitLab CI",
            CiSystem::Jenkins => "Jenkins",
        }
    }
}

/// CI metadata contributed to the notification's facts block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CiInfo {
    /// Which CI system was detected.
    pub system: CiSystem,
    /// The branch under test.
    pub branch: Option<String>,
    /// The short commit hash under test.
    pub commit: Option<String>,
    /// The build or pipeline number.
    pub build_number: Option<String>,
}

impl CiInfo {
    /// Detects a CI system from the environment snapshot. First match wins;
    /// returns `None` outside any recognized system.
    pub fn detect(env: &EnvSnapshot) -> Option<Self> {
        if env.get("GITHUB_ACTIONS") == Some("true") {
            return Some(Self {
                system: CiSystem::GitHubActions,
                branch: env.get("GITHUB_REF_NAME").map(str::to_owned),
                commit: env.get("GITHUB_SHA").map(short_commit),
                build_number: env.get("GITHUB_RUN_NUMBER").map(str::to_owned),
            });
        }
        if env.get("GITLAB_CI") == Some("true") {
            return Some(Self {
                system: CiSystem::GitLabCi,
                branch: env.get("CI_COMMIT_REF_NAME").map(str::to_owned),
                commit: env.get("CI_COMMIT_SHORT_SHA").map(str::to_owned),
                build_number: env.get("CI_PIPELINE_ID").map(str::to_owned),
            });
        }
        if env.get("JENKINS_URL").is_some() {
            return Some(Self {
                system: CiSystem::Jenkins,
                branch: env.get("GIT_BRANCH").map(str::to_owned),
                commit: env.get("GIT_COMMIT").map(short_commit),
                build_number: env.get("BUILD_NUMBER").map(str::to_owned),
            });
        }
        None
    }
}

/// Shortens a full commit hash to the conventional 7 characters.
fn short_commit(sha: &str) -> String {
    sha.chars().take(7).collect()
}

/// Everything the reporter needs to know, resolved once at start.
#[derive(Clone, Debug)]
pub struct ReporterConfig {
    /// The webhook endpoint. `None` disables delivery for the run.
    pub webhook_url: Option<String>,
    /// The project display name used in the card title.
    pub project_name: String,
    /// Target for the card's action link, if any.
    pub report_url: Option<String>,
    /// Retry schedule and timeouts for delivery.
    pub delivery: DeliveryPolicy,
    /// Detected CI metadata, if any.
    pub ci: Option<CiInfo>,
    project_name_from_env: bool,
}

impl ReporterConfig {
    /// Resolves configuration from an environment snapshot.
    pub fn from_env(env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let webhook_url = match env.get(WEBHOOK_URL_VAR) {
            Some(url) => Some(validate_endpoint(url)?),
            None => None,
        };

        let (project_name, project_name_from_env) = match env.get(PROJECT_NAME_VAR) {
            Some(name) => (name.to_owned(), true),
            None => (PROJECT_NAME_FALLBACK.to_owned(), false),
        };

        let mut delivery = DeliveryPolicy::default();
        if let Some(input) = env.get(MAX_RETRIES_VAR) {
            delivery.max_attempts = parse_max_retries(input)?;
        }

        Ok(Self {
            webhook_url,
            project_name,
            report_url: env.get(REPORT_URL_VAR).map(str::to_owned),
            delivery,
            ci: CiInfo::detect(env),
            project_name_from_env,
        })
    }

    /// Supplies the host's project display name.
    ///
    /// Ignored when the environment already named the project: the
    /// environment override is the operator's word, the host's metadata is
    /// a default.
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        if !self.project_name_from_env {
            self.project_name = name.into();
        }
        self
    }

    /// Supplies the host's report URL, used when the environment didn't
    /// name one.
    pub fn with_report_url(mut self, url: impl Into<String>) -> Self {
        if self.report_url.is_none() {
            self.report_url = Some(url.into());
        }
        self
    }
}

fn validate_endpoint(url: &str) -> Result<String, ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|error| ConfigError::InvalidEndpoint {
        url: url.to_owned(),
        reason: error.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint {
            url: url.to_owned(),
            reason: format!("unsupported scheme `{}`", parsed.scheme()),
        });
    }
    Ok(url.to_owned())
}

fn parse_max_retries(input: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidMaxRetries {
        input: input.to_owned(),
    };
    let count: u32 = input.parse().map_err(|_| invalid())?;
    if !(1..=MAX_DELIVERY_ATTEMPTS).contains(&count) {
        return Err(invalid());
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn empty_environment_yields_disabled_delivery() {
        let config =
            ReporterConfig::from_env(&EnvSnapshot::default()).expect("empty env is valid");
        assert_eq!(config.webhook_url, None);
        assert_eq!(config.project_name, PROJECT_NAME_FALLBACK);
        assert_eq!(config.report_url, None);
        assert_eq!(config.ci, None);
        assert_eq!(config.delivery, DeliveryPolicy::default());
    }

    #[test]
    fn endpoint_and_report_url_are_read() {
        let env = EnvSnapshot::from_pairs([
            (WEBHOOK_URL_VAR, "https://hooks.example.com/abc"),
            (REPORT_URL_VAR, "https://ci.example.com/run/42"),
        ]);
        let config = ReporterConfig::from_env(&env).expect("config is valid");
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.example.com/abc")
        );
        assert_eq!(
            config.report_url.as_deref(),
            Some("https://ci.example.com/run/42")
        );
    }

    #[test_case("not a url" ; "not a url at all")]
    #[test_case("ftp://example.com/hook" ; "unsupported scheme")]
    fn invalid_endpoints_are_rejected(url: &str) {
        let env = EnvSnapshot::from_pairs([(WEBHOOK_URL_VAR, url)]);
        let error = ReporterConfig::from_env(&env).expect_err("endpoint must be rejected");
        assert!(matches!(error, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn empty_webhook_var_counts_as_unset() {
        let env = EnvSnapshot::from_pairs([(WEBHOOK_URL_VAR, "")]);
        let config = ReporterConfig::from_env(&env).expect("config is valid");
        assert_eq!(config.webhook_url, None);
    }

    #[test]
    fn max_retries_override_is_applied() {
        let env = EnvSnapshot::from_pairs([(MAX_RETRIES_VAR, "5")]);
        let config = ReporterConfig::from_env(&env).expect("config is valid");
        assert_eq!(config.delivery.max_attempts, 5);
    }

    #[test_case("0" ; "zero attempts")]
    #[test_case("11" ; "above the cap")]
    #[test_case("three" ; "not a number")]
    #[test_case("-1" ; "negative")]
    fn invalid_max_retries_is_rejected(input: &str) {
        let env = EnvSnapshot::from_pairs([(MAX_RETRIES_VAR, input)]);
        let error = ReporterConfig::from_env(&env).expect_err("override must be rejected");
        assert!(matches!(error, ConfigError::InvalidMaxRetries { .. }));
    }

    #[test]
    fn project_name_env_beats_host_metadata() {
        let env = EnvSnapshot::from_pairs([(PROJECT_NAME_VAR, "Payments")]);
        let config = ReporterConfig::from_env(&env)
            .expect("config is valid")
            .with_project_name("from-package-json");
        assert_eq!(config.project_name, "Payments");

        let config = ReporterConfig::from_env(&EnvSnapshot::default())
            .expect("config is valid")
            .with_project_name("from-package-json");
        assert_eq!(config.project_name, "from-package-json");
    }

    #[test]
    fn github_actions_is_detected() {
        let env = EnvSnapshot::from_pairs([
            ("GITHUB_ACTIONS", "true"),
            ("GITHUB_REF_NAME", "main"),
            ("GITHUB_SHA", "0123456789abcdef0123456789abcdef01234567"),
            ("GITHUB_RUN_NUMBER", "128"),
        ]);
        assert_eq!(
            CiInfo::detect(&env),
            Some(CiInfo {
                system: CiSystem::GitHubActions,
                branch: Some("main".to_owned()),
                commit: Some("0123456".to_owned()),
                build_number: Some("128".to_owned()),
            })
        );
    }

    #[test]
    fn gitlab_ci_is_detected() {
        let env = EnvSnapshot::from_pairs([
            ("GITLAB_CI", "true"),
            ("CI_COMMIT_REF_NAME", "release/1.4"),
            ("CI_COMMIT_SHORT_SHA", "89abcde"),
            ("CI_PIPELINE_ID", "5512"),
        ]);
        assert_eq!(
            CiInfo::detect(&env),
            Some(CiInfo {
                system: CiSystem::GitLabCi,
                branch: Some("release/1.4".to_owned()),
                commit: Some("89abcde".to_owned()),
                build_number: Some("5512".to_owned()),
            })
        );
    }

    #[test]
    fn jenkins_is_detected_with_partial_metadata() {
        let env = EnvSnapshot::from_pairs([
            ("JENKINS_URL", "https://jenkins.example.com/"),
            ("BUILD_NUMBER", "77"),
        ]);
        assert_eq!(
            CiInfo::detect(&env),
            Some(CiInfo {
                system: CiSystem::Jenkins,
                branch: None,
                commit: None,
                build_number: Some("77".to_owned()),
            })
        );
    }

    #[test]
    fn first_matching_ci_system_wins() {
        let env = EnvSnapshot::from_pairs([
            ("GITHUB_ACTIONS", "true"),
            ("GITLAB_CI", "true"),
        ]);
        let info = CiInfo::detect(&env).expect("a system is detected");
        assert_eq!(info.system, CiSystem::GitHubActions);
    }

    #[test]
    fn no_ci_outside_recognized_systems() {
        let env = EnvSnapshot::from_pairs([("CI", "true")]);
        assert_eq!(CiInfo::detect(&env), None);
    }
}
