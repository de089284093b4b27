//! ThreadFix REST client: connectivity probe and finding submission.
//!
//! Deliberately thin — only the two operations the pipeline needs. Every
//! call is a single attempt with an explicit request timeout; retrying is
//! the caller's decision. Duplicate submissions are not deduplicated here
//! (the ThreadFix API accepts them; a known limitation).

use std::time::Duration;

use thiserror::Error;

use crate::error::{DepgateError, Result};
use crate::model::Warning;

/// Fixed vulnerability category submitted with every finding.
pub const VULN_TYPE: &str =
    "OWASP Top Ten 2013 Category A9 - Using Components with Known Vulnerabilities";

/// Request timeout for every tracker call. The upstream API contract
/// specifies none; a bounded timeout keeps a hung tracker from stalling a
/// build indefinitely.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a single tracker call failed. Submission failures stay values (one
/// per warning) so that a failing item can never abort the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("ThreadFix returned HTTP {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl TrackerError {
    /// The HTTP status carried by this error, if it got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Status(code) => Some(*code),
            TrackerError::Transport(_) => None,
        }
    }
}

/// Immutable connection settings, validated eagerly and copied by value into
/// each pipeline run. The API key never appears in logs or Debug output.
#[derive(Clone)]
pub struct TrackerConfig {
    base_url: String,
    api_key: String,
}

impl TrackerConfig {
    /// Build a config, rejecting a malformed base URL before it can reach
    /// the pipeline.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        validate_base_url(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a config from `THREADFIX_URL` and `THREADFIX_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("THREADFIX_URL")
            .map_err(|_| DepgateError::Config("THREADFIX_URL environment variable is required".into()))?;
        let api_key = std::env::var("THREADFIX_API_KEY")
            .map_err(|_| DepgateError::Config("THREADFIX_API_KEY environment variable is required".into()))?;
        Self::new(&base_url, &api_key)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Check that a tracker URL is well formed: http/https scheme with a
/// non-empty host. Anything else is a configuration error surfaced to the
/// administrator, not a runtime failure.
pub fn validate_base_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            DepgateError::Config(format!(
                "Invalid ThreadFix URL '{}': expected http:// or https://",
                url
            ))
        })?;
    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(DepgateError::Config(format!(
            "Invalid ThreadFix URL '{}': missing host",
            url
        )));
    }
    Ok(())
}

/// The two tracker operations, as a trait so the submission loop can be
/// exercised against stubs.
pub trait FindingTracker {
    /// Probe connectivity. Success iff the teams listing answers HTTP 200;
    /// any other status or transport failure is an error carrying the
    /// detail. Single attempt, no retry.
    fn check_connection(&self) -> std::result::Result<(), TrackerError>;

    /// Register one finding under the given application id. Success iff the
    /// response status is in [200, 300).
    fn submit_finding(&self, app_id: &str, warning: &Warning)
        -> std::result::Result<(), TrackerError>;
}

/// HTTP implementation of [`FindingTracker`].
pub struct Client {
    agent: ureq::Agent,
    config: TrackerConfig,
}

impl Client {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self { agent, config }
    }
}

impl FindingTracker for Client {
    fn check_connection(&self) -> std::result::Result<(), TrackerError> {
        let url = format!(
            "{}/rest/teams?apiKey={}",
            self.config.base_url, self.config.api_key
        );
        let resp = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .call();
        match resp {
            Ok(resp) if resp.status() == 200 => Ok(()),
            Ok(resp) => Err(TrackerError::Status(resp.status())),
            Err(ureq::Error::Status(code, _)) => Err(TrackerError::Status(code)),
            Err(e) => Err(TrackerError::Transport(e.to_string())),
        }
    }

    fn submit_finding(
        &self,
        app_id: &str,
        warning: &Warning,
    ) -> std::result::Result<(), TrackerError> {
        let url = format!(
            "{}/rest/applications/{}/addFinding?apiKey={}",
            self.config.base_url, app_id, self.config.api_key
        );
        let resp = self.agent.post(&url).send_form(&[
            ("isStatic", "true"),
            ("vulnType", VULN_TYPE),
            ("longDescription", &warning.message),
            ("severity", warning.severity.as_str()),
            ("filePath", &warning.file_path),
        ]);
        // Success iff status in [200, 300). A historical client inverted
        // this check and reported every accepted finding as a failure; that
        // polarity is a defect, pinned by the regression tests.
        match resp {
            Ok(resp) if (200..300).contains(&resp.status()) => Ok(()),
            Ok(resp) => Err(TrackerError::Status(resp.status())),
            Err(ureq::Error::Status(code, _)) => Err(TrackerError::Status(code)),
            Err(e) => Err(TrackerError::Transport(e.to_string())),
        }
    }
}
