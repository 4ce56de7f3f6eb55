use std::time::Duration;

use texgen_core::subscription::SubscriptionPlan;

use crate::auth_api::LoginCredentials;
use crate::poller::PollSettings;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}='{value}' is invalid: expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("TEXGEN_EMAIL and TEXGEN_PASSWORD must be set together")]
    Incomplete,
}

/// Client configuration loaded from environment variables.
///
/// Defaults target a backend running locally.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the generation backend.
    pub api_url: String,
    /// Per-request HTTP timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub poll: PollSettings,
    /// Plan assumed until the backend reports the user's real one.
    pub plan: SubscriptionPlan,
    /// Sign in with these before running a command.
    pub credentials: Option<LoginCredentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            request_timeout_secs: 30,
            poll: PollSettings::default(),
            plan: SubscriptionPlan::default(),
            credentials: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default                 |
    /// |--------------------------------------|-------------------------|
    /// | `TEXGEN_API_URL`                     | `http://localhost:8000` |
    /// | `TEXGEN_REQUEST_TIMEOUT_SECS`        | `30`                    |
    /// | `TEXGEN_POLL_INTERVAL_SECS`          | `10`                    |
    /// | `TEXGEN_FINALIZE_POLL_INTERVAL_SECS` | `3`                     |
    /// | `TEXGEN_MAX_POLL_ATTEMPTS`           | `360` (`0` = unbounded) |
    /// | `TEXGEN_PLAN`                        | `free`                  |
    /// | `TEXGEN_EMAIL` / `TEXGEN_PASSWORD`   | unset                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = var("TEXGEN_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let request_timeout_secs = parse_secs(
            "TEXGEN_REQUEST_TIMEOUT_SECS",
            var("TEXGEN_REQUEST_TIMEOUT_SECS"),
            defaults.request_timeout_secs,
        )?;

        let interval = parse_secs(
            "TEXGEN_POLL_INTERVAL_SECS",
            var("TEXGEN_POLL_INTERVAL_SECS"),
            defaults.poll.interval.as_secs(),
        )?;
        let finalize_interval = parse_secs(
            "TEXGEN_FINALIZE_POLL_INTERVAL_SECS",
            var("TEXGEN_FINALIZE_POLL_INTERVAL_SECS"),
            defaults.poll.finalize_interval.as_secs(),
        )?;

        let max_attempts = match var("TEXGEN_MAX_POLL_ATTEMPTS") {
            None => defaults.poll.max_attempts,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        var: "TEXGEN_MAX_POLL_ATTEMPTS",
                        value: raw,
                        expected: "a non-negative integer",
                    })
                }
            },
        };

        let plan = match var("TEXGEN_PLAN") {
            None => defaults.plan,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "TEXGEN_PLAN",
                value: raw,
                expected: "free or pro",
            })?,
        };

        let credentials = match (var("TEXGEN_EMAIL"), lookup("TEXGEN_PASSWORD")) {
            (Some(email), Some(password)) if !password.is_empty() => {
                Some(LoginCredentials::new(email.trim(), password))
            }
            (None, None) => None,
            (None, Some(password)) if password.is_empty() => None,
            _ => return Err(ConfigError::Incomplete),
        };

        Ok(Self {
            api_url,
            request_timeout_secs,
            poll: PollSettings {
                interval: Duration::from_secs(interval),
                finalize_interval: Duration::from_secs(finalize_interval),
                max_attempts,
            },
            plan,
            credentials,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Whole seconds, at least one.
fn parse_secs(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            expected: "a positive number of seconds",
        }),
    }
}
