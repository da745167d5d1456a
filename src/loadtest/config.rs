//! TOML-based run configuration.
//!
//! Defines [`RunConfig`], the immutable input of one load test run, and its
//! optional [`RunSettings`] block.
//!
//! # Example TOML
//!
//! ```toml
//! url = "http://localhost:8080/health"
//! method = "GET"
//! total_requests = 200
//! concurrency = 20
//! label = "smoke"
//!
//! [settings]
//! timeout_ms = 10000
//! snapshot_interval_ms = 500
//! success_status_ceiling = 400
//! ```
//!
//! Bounds are enforced by [`RunConfig::validate`], never inside the
//! dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// Largest request budget accepted for a single run.
pub const MAX_TOTAL_REQUESTS: u32 = 1000;

/// Largest number of simultaneous in-flight requests accepted for a run.
pub const MAX_CONCURRENCY: u32 = 200;

/// HTTP methods a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    /// Returns the canonical upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Converts to the reqwest method type.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(LoadTestError::validation(format!(
                "Unsupported HTTP method '{other}'"
            ))),
        }
    }
}

/// Immutable description of one load test run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunConfig {
    /// Target URL; must be `http` or `https`.
    pub url: String,
    /// HTTP method used for every request.
    #[serde(default)]
    pub method: HttpMethod,
    /// Number of requests to issue in total.
    pub total_requests: u32,
    /// Maximum number of simultaneous in-flight requests.
    pub concurrency: u32,
    /// Free-form label shown in history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Execution parameters.
    #[serde(default)]
    pub settings: RunSettings,
}

/// Execution parameters with defaults suitable for most targets.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunSettings {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Cadence of progress snapshots in milliseconds.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// Exclusive upper bound of the success status range (lower bound is 200).
    #[serde(default = "default_success_status_ceiling")]
    pub success_status_ceiling: u16,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_snapshot_interval_ms() -> u64 {
    500
}

pub(crate) fn default_success_status_ceiling() -> u16 {
    400
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            success_status_ceiling: default_success_status_ceiling(),
        }
    }
}

impl RunSettings {
    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Convert the `snapshot_interval_ms` field to a [`Duration`].
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

impl RunConfig {
    /// Creates a config with default settings and no label.
    pub fn new(
        url: impl Into<String>,
        method: HttpMethod,
        total_requests: u32,
        concurrency: u32,
    ) -> Self {
        Self {
            url: url.into(),
            method,
            total_requests,
            concurrency,
            label: None,
            settings: RunSettings::default(),
        }
    }

    /// Sets the run label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Replaces the execution settings.
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Parse a TOML string without validating it.
    ///
    /// Use this when values are still to be overridden; call
    /// [`validate`](Self::validate) on the effective config.
    pub fn parse_toml(content: &str) -> Result<Self, LoadTestError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a TOML string into a validated [`RunConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config = Self::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a [`RunConfig`] from a file path without validating it.
    pub fn read(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::parse_toml(&content)
    }

    /// Load and validate a [`RunConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - URL parses and uses `http` or `https`
    /// - `total_requests` is at most [`MAX_TOTAL_REQUESTS`] (0 is allowed)
    /// - `concurrency` is in `1..=MAX_CONCURRENCY`
    /// - timeout and snapshot interval are positive
    /// - success ceiling is in `200..=600`
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let parsed = url::Url::parse(&self.url).map_err(|e| {
            LoadTestError::validation(format!("Invalid target URL '{}': {e}", self.url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoadTestError::validation(format!(
                "Target URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if self.total_requests > MAX_TOTAL_REQUESTS {
            return Err(LoadTestError::validation(format!(
                "total_requests={} exceeds the maximum of {MAX_TOTAL_REQUESTS}",
                self.total_requests
            )));
        }

        if self.concurrency == 0 {
            return Err(LoadTestError::validation("concurrency must be at least 1"));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(LoadTestError::validation(format!(
                "concurrency={} exceeds the maximum of {MAX_CONCURRENCY}",
                self.concurrency
            )));
        }

        if self.settings.timeout_ms == 0 {
            return Err(LoadTestError::validation("settings.timeout_ms must be positive"));
        }
        if self.settings.snapshot_interval_ms == 0 {
            return Err(LoadTestError::validation(
                "settings.snapshot_interval_ms must be positive",
            ));
        }
        if !(200..=600).contains(&self.settings.success_status_ceiling) {
            return Err(LoadTestError::validation(format!(
                "settings.success_status_ceiling={} must be between 200 and 600",
                self.settings.success_status_ceiling
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunConfig {
        RunConfig::new("http://localhost:8080/health", HttpMethod::Get, 50, 10)
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
url = "https://example.com/api"
method = "POST"
total_requests = 100
concurrency = 20
label = "checkout"

[settings]
timeout_ms = 2500
snapshot_interval_ms = 250
success_status_ceiling = 300
"#;
        let config = RunConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.url, "https://example.com/api");
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.total_requests, 100);
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.label.as_deref(), Some("checkout"));
        assert_eq!(config.settings.timeout_ms, 2500);
        assert_eq!(config.settings.snapshot_interval_ms, 250);
        assert_eq!(config.settings.success_status_ceiling, 300);
    }

    #[test]
    fn test_settings_and_method_default() {
        let toml_str = r#"
url = "http://localhost:3000"
total_requests = 10
concurrency = 2
"#;
        let config = RunConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.method, HttpMethod::Get);
        assert_eq!(config.settings, RunSettings::default());
        assert_eq!(config.settings.timeout_as_duration(), Duration::from_secs(10));
        assert_eq!(config.settings.snapshot_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = RunConfig::from_toml("url = ").unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_method_rejected_in_toml() {
        let toml_str = r#"
url = "http://localhost:3000"
method = "BREW"
total_requests = 10
concurrency = 2
"#;
        assert!(RunConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = valid();
        config.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrency must be at least 1"));
    }

    #[test]
    fn test_concurrency_above_max_rejected() {
        let mut config = valid();
        config.concurrency = MAX_CONCURRENCY + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_total_above_max_rejected() {
        let mut config = valid();
        config.total_requests = MAX_TOTAL_REQUESTS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_total_is_valid() {
        let mut config = valid();
        config.total_requests = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RunConfig::new("not a url", HttpMethod::Get, 1, 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid target URL"));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let config = RunConfig::new("ftp://example.com/file", HttpMethod::Get, 1, 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = valid();
        config.settings.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_snapshot_interval_rejected() {
        let mut config = valid();
        config.settings.snapshot_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ceiling_bounds() {
        let mut config = valid();
        config.settings.success_status_ceiling = 199;
        assert!(config.validate().is_err());
        config.settings.success_status_ceiling = 200;
        assert!(config.validate().is_ok());
        config.settings.success_status_ceiling = 600;
        assert!(config.validate().is_ok());
        config.settings.success_status_ceiling = 601;
        assert!(config.validate().is_err());
        config.settings.success_status_ceiling = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_defers_validation() {
        let toml_str = r#"
url = "http://localhost:3000"
total_requests = 5000
concurrency = 0
"#;
        let config = RunConfig::parse_toml(toml_str).unwrap();
        assert_eq!(config.total_requests, 5000);
        assert!(config.validate().is_err());
        assert!(matches!(
            RunConfig::from_toml(toml_str).unwrap_err(),
            LoadTestError::ConfigValidation { .. }
        ));
    }

    #[test]
    fn test_method_from_str_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = RunConfig::load(Path::new("/nonexistent/stresslab.toml")).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigIo { .. }));
    }

    #[test]
    fn test_builder_helpers() {
        let settings = RunSettings {
            timeout_ms: 100,
            ..RunSettings::default()
        };
        let config = valid().with_label("nightly").with_settings(settings.clone());
        assert_eq!(config.label.as_deref(), Some("nightly"));
        assert_eq!(config.settings, settings);
    }
}
