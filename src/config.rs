//! Lookup configuration: endpoint, credentials, timeout and retry policy.

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use reqwest::Url;
use std::env::VarError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::Runtime;

/// Base URL of the geolocation service.
pub const API_URL_VAR: &str = "LOCATION_API_URL";
/// API token sent as the `token` query parameter.
pub const API_KEY_VAR: &str = "LOCATION_API_KEY";
pub const MAX_ATTEMPTS_VAR: &str = "LOCATION_MAX_ATTEMPTS";
pub const RETRY_DELAY_MS_VAR: &str = "LOCATION_RETRY_DELAY_MS";
pub const TIMEOUT_SECS_VAR: &str = "LOCATION_TIMEOUT_SECS";

/// Total number of HTTP attempts per lookup, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed pause between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Total timeout of a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded attempts with a fixed delay in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Everything a lookup needs, resolved once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct LocationConfig {
    pub base_url: String,
    pub api_key: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

// Hand-written so the key never ends up in logs.
impl fmt::Debug for LocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_token(&self.api_key))
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Values given on the command line. Each one wins over its environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl LocationConfig {
    /// Creates a config with the default timeout and retry policy.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads the configuration from environment variables only.
    pub fn from_runtime<R: Runtime>(runtime: &R) -> Result<Self> {
        Self::resolve(runtime, &ConfigOverrides::default())
    }

    /// Resolves every setting from `overrides` first, then the environment,
    /// then the built-in default. URL and key have no default.
    #[tracing::instrument(skip(runtime, overrides))]
    pub fn resolve<R: Runtime>(runtime: &R, overrides: &ConfigOverrides) -> Result<Self> {
        let base_url = match &overrides.base_url {
            Some(url) => url.clone(),
            None => required_var(runtime, API_URL_VAR)?,
        };
        Url::parse(&base_url).with_context(|| format!("Invalid API URL: {:?}", base_url))?;

        let api_key = match &overrides.api_key {
            Some(key) => key.clone(),
            None => required_var(runtime, API_KEY_VAR)?,
        };

        let max_attempts = match overrides.max_attempts {
            Some(n) => n,
            None => optional_var(runtime, MAX_ATTEMPTS_VAR)?.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        };
        if max_attempts == 0 {
            bail!("Max attempts must be at least 1");
        }

        let delay = match overrides.retry_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => optional_var::<_, u64>(runtime, RETRY_DELAY_MS_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        };

        let timeout = match overrides.timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => optional_var::<_, u64>(runtime, TIMEOUT_SECS_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        };
        if timeout.is_zero() {
            bail!("Request timeout must be greater than zero");
        }

        let config = Self {
            base_url,
            api_key,
            retry: RetryPolicy::new(max_attempts, delay),
            timeout,
        };
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

fn required_var<R: Runtime>(runtime: &R, key: &str) -> Result<String> {
    match runtime.env_var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Err(VarError::NotUnicode(_)) => Err(anyhow!("{} is not valid UTF-8", key)),
        _ => Err(anyhow!("{} is not set", key)),
    }
}

fn optional_var<R: Runtime, T>(runtime: &R, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match runtime.env_var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let parsed = value
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, value))?;
            Ok(Some(parsed))
        }
        Err(VarError::NotUnicode(_)) => Err(anyhow!("{} is not valid UTF-8", key)),
        _ => Ok(None),
    }
}

/// Masks a secret for logging, keeping the first and last four characters
/// when the secret is long enough for that to reveal little.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::collections::HashMap;

    fn runtime_with(vars: &[(&str, &str)]) -> MockRuntime {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(move |key| {
            vars.get(key)
                .cloned()
                .ok_or(std::env::VarError::NotPresent)
        });
        runtime
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = LocationConfig::new("https://geo.example/api", "K1");
        assert_eq!(config.base_url, "https://geo.example/api");
        assert_eq!(config.api_key, "K1");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builders_override_defaults() {
        let config = LocationConfig::new("https://geo.example/api", "k")
            .with_retry_policy(RetryPolicy::new(5, Duration::ZERO))
            .with_timeout(Duration::from_secs(1));
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::ZERO));
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_runtime_required_only() {
        let runtime = runtime_with(&[
            (API_URL_VAR, "https://geo.example/api"),
            (API_KEY_VAR, "K1"),
        ]);

        let config = LocationConfig::from_runtime(&runtime).unwrap();
        assert_eq!(config, LocationConfig::new("https://geo.example/api", "K1"));
    }

    #[test]
    fn test_from_runtime_all_values() {
        let runtime = runtime_with(&[
            (API_URL_VAR, "https://geo.example/api"),
            (API_KEY_VAR, "K1"),
            (MAX_ATTEMPTS_VAR, "5"),
            (RETRY_DELAY_MS_VAR, "250"),
            (TIMEOUT_SECS_VAR, " 3 "),
        ]);

        let config = LocationConfig::from_runtime(&runtime).unwrap();
        assert_eq!(
            config.retry,
            RetryPolicy::new(5, Duration::from_millis(250))
        );
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_runtime_missing_url() {
        let runtime = runtime_with(&[(API_KEY_VAR, "K1")]);

        let err = LocationConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(API_URL_VAR));
    }

    #[test]
    fn test_from_runtime_blank_key_is_missing() {
        let runtime = runtime_with(&[(API_URL_VAR, "https://geo.example/api"), (API_KEY_VAR, "  ")]);

        let err = LocationConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn test_from_runtime_invalid_number() {
        let runtime = runtime_with(&[
            (API_URL_VAR, "https://geo.example/api"),
            (API_KEY_VAR, "K1"),
            (MAX_ATTEMPTS_VAR, "three"),
        ]);

        let err = LocationConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(MAX_ATTEMPTS_VAR));
    }

    #[test]
    fn test_non_unicode_variable_reported() {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(|key| match key {
            API_URL_VAR => Err(VarError::NotUnicode(std::ffi::OsString::from("bad"))),
            _ => Ok("K1".to_string()),
        });

        let err = LocationConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert!(err.to_string().contains(API_URL_VAR));
    }

    #[test]
    fn test_non_unicode_optional_variable_reported() {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(|key| match key {
            API_URL_VAR => Ok("https://geo.example/api".to_string()),
            TIMEOUT_SECS_VAR => Err(VarError::NotUnicode(std::ffi::OsString::from("bad"))),
            _ => Err(VarError::NotPresent),
        });

        let err = LocationConfig::resolve(
            &runtime,
            &ConfigOverrides {
                api_key: Some("K1".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains(TIMEOUT_SECS_VAR));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let runtime = runtime_with(&[(API_URL_VAR, "not-a-url"), (API_KEY_VAR, "K1")]);

        let err = LocationConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains("Invalid API URL"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let runtime = runtime_with(&[
            (API_URL_VAR, "https://geo.example/api"),
            (API_KEY_VAR, "K1"),
            (MAX_ATTEMPTS_VAR, "0"),
        ]);

        assert!(LocationConfig::from_runtime(&runtime).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let runtime = runtime_with(&[]);
        let overrides = ConfigOverrides {
            base_url: Some("https://geo.example/api".to_string()),
            api_key: Some("k".to_string()),
            timeout_secs: Some(0),
            ..Default::default()
        };

        assert!(LocationConfig::resolve(&runtime, &overrides).is_err());
    }

    #[test]
    fn test_overrides_win_over_environment() {
        let runtime = runtime_with(&[
            (API_URL_VAR, "https://env.example/api"),
            (API_KEY_VAR, "ENV_KEY"),
            (MAX_ATTEMPTS_VAR, "7"),
        ]);
        let overrides = ConfigOverrides {
            base_url: Some("https://flag.example/api".to_string()),
            max_attempts: Some(2),
            retry_delay_ms: Some(0),
            ..Default::default()
        };

        let config = LocationConfig::resolve(&runtime, &overrides).unwrap();
        assert_eq!(config.base_url, "https://flag.example/api");
        assert_eq!(config.api_key, "ENV_KEY");
        assert_eq!(config.retry, RetryPolicy::new(2, Duration::ZERO));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcdefghijklmnop"), "abcd*********mnop");
        assert_eq!(mask_token("K1"), "*********");
        assert_eq!(mask_token(""), "*********");
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let config = LocationConfig::new("https://geo.example/api", "supersecretkey1234");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("supersecretkey1234"));
        assert!(debug.contains("supe*********1234"));
    }
}
