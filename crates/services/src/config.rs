use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const API_URL_VAR: &str = "EXAM_API_URL";
pub const API_TOKEN_VAR: &str = "EXAM_API_TOKEN";
pub const REQUEST_TIMEOUT_VAR: &str = "EXAM_REQUEST_TIMEOUT_SECS";
pub const TICK_MILLIS_VAR: &str = "EXAM_TICK_MILLIS";
pub const AUTO_SUBMIT_ATTEMPTS_VAR: &str = "EXAM_AUTO_SUBMIT_ATTEMPTS";
pub const DRAFTS_DB_VAR: &str = "EXAM_DRAFTS_DB";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_TICK_MILLIS: u64 = 1_000;
pub const DEFAULT_AUTO_SUBMIT_ATTEMPTS: usize = 3;

/// Settings for talking to the exam service.
#[derive(Clone)]
pub struct ExamClientConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub tick_interval: Duration,
    pub auto_submit_attempts: usize,
    pub drafts_db: Option<String>,
}

impl ExamClientConfig {
    /// Defaults for everything but the service location.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MILLIS),
            auto_submit_attempts: DEFAULT_AUTO_SUBMIT_ATTEMPTS,
            drafts_db: None,
        }
    }

    /// Read the configuration from `EXAM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `EXAM_API_URL` is missing or any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let raw_url = value(API_URL_VAR).ok_or(ConfigError::Missing(API_URL_VAR))?;
        let mut config = Self::new(parse_base_url(&raw_url)?);
        config.api_token = value(API_TOKEN_VAR);
        config.drafts_db = value(DRAFTS_DB_VAR);

        if let Some(raw) = value(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = Duration::from_secs(parse_positive(REQUEST_TIMEOUT_VAR, &raw)?);
        }
        if let Some(raw) = value(TICK_MILLIS_VAR) {
            config.tick_interval = Duration::from_millis(parse_positive(TICK_MILLIS_VAR, &raw)?);
        }
        if let Some(raw) = value(AUTO_SUBMIT_ATTEMPTS_VAR) {
            let attempts = parse_positive(AUTO_SUBMIT_ATTEMPTS_VAR, &raw)?;
            config.auto_submit_attempts =
                usize::try_from(attempts).map_err(|_| ConfigError::Invalid {
                    name: AUTO_SUBMIT_ATTEMPTS_VAR,
                    reason: format!("{attempts} is too large"),
                })?;
        }

        Ok(config)
    }
}

impl fmt::Debug for ExamClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("tick_interval", &self.tick_interval)
            .field("auto_submit_attempts", &self.auto_submit_attempts)
            .field("drafts_db", &self.drafts_db)
            .finish()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: API_URL_VAR,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name: API_URL_VAR,
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config =
            ExamClientConfig::from_lookup(lookup(&[(API_URL_VAR, "http://localhost:8000")]))
                .unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.tick_interval, Duration::from_millis(1_000));
        assert_eq!(config.auto_submit_attempts, 3);
        assert!(config.api_token.is_none());
        assert!(config.drafts_db.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = ExamClientConfig::from_lookup(lookup(&[
            (API_URL_VAR, "https://exams.example.com/"),
            (API_TOKEN_VAR, "secret"),
            (REQUEST_TIMEOUT_VAR, "5"),
            (TICK_MILLIS_VAR, "250"),
            (AUTO_SUBMIT_ATTEMPTS_VAR, "5"),
            (DRAFTS_DB_VAR, "sqlite:drafts.db"),
        ]))
        .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.auto_submit_attempts, 5);
        assert_eq!(config.drafts_db.as_deref(), Some("sqlite:drafts.db"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = ExamClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(API_URL_VAR)));
    }

    #[test]
    fn rejects_non_http_scheme_and_zero_values() {
        let err = ExamClientConfig::from_lookup(lookup(&[(API_URL_VAR, "ftp://exams")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: API_URL_VAR, .. }));

        let err = ExamClientConfig::from_lookup(lookup(&[
            (API_URL_VAR, "http://localhost"),
            (AUTO_SUBMIT_ATTEMPTS_VAR, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: AUTO_SUBMIT_ATTEMPTS_VAR,
                ..
            }
        ));
    }
}
