//! Process configuration, resolved once at startup.
//!
//! Three layers, later ones winning:
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config`),
//! 3. environment variables (a `.env` file is loaded by the binary first).
//!
//! The result is an immutable [`IngestConfig`] handed to each component by
//! reference.
//!
//! | variable                  | file key                  | default                     |
//! |---------------------------|---------------------------|-----------------------------|
//! | `SLOT_START`              | `start`                   | `1950-01-01 00:00:00`       |
//! | `SLOT_END`                | `end`                     | `2050-12-31 23:00:00`       |
//! | `SLOT_STEP_HOURS`         | `step_hours`              | `2`                         |
//! | `BASE_DELAY_MS`           | `base_delay_ms`           | `2500`                      |
//! | `JITTER_DELAY_MS`         | `jitter_delay_ms`         | `3000`                      |
//! | `RATE_LIMIT_COOLDOWN_MS`  | `rate_limit_cooldown_ms`  | `60000`                     |
//! | `TRANSIENT_COOLDOWN_MS`   | `transient_cooldown_ms`   | `5000`                      |
//! | `MAX_SLOT_RETRY_SECS`     | `max_slot_retry_secs`     | unlimited                   |
//! | `REQUEST_TIMEOUT_MS`      | `request_timeout_ms`      | `10000`                     |
//! | `MAX_REQUESTS_PER_MINUTE` | `max_requests_per_minute` | `30` (`0` disables)         |
//! | `CALC_API_URL`            | `api_url`                 | the public endpoint         |
//! | `DATABASE_URL`            | `database_url`            | `sqlite://slot_sync.db`     |
//! | `DB_TABLE`                | `table`                   | `slot_records`              |
//!
//! The file additionally accepts `user_agents` (list), `heartbeat_secs` and a
//! `[request]` table overriding individual request body defaults.

use std::{num::NonZeroU32, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use calc_client::{
    RequestDefaults,
    identity::{DEFAULT_USER_AGENTS, IdentityPool},
    pacing::Pacing,
    providers::http::{DEFAULT_ENDPOINT, HttpSettings},
};
use nonzero_ext::nonzero;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use shared_utils::{
    config::ConfigError,
    env::{optional_env_var, parse_optional},
};

use crate::{
    grid::{SlotKey, TimeGrid},
    ingest::IngestSettings,
};

/// The only table the embedded migrations create.
pub const SLOT_TABLE: &str = "slot_records";

const DEFAULT_STEP_HOURS: NonZeroU32 = nonzero!(2u32);

/// Default database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://slot_sync.db";

/// Optional overrides read from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// First slot.
    pub start: Option<SlotKey>,
    /// Last slot bound (inclusive).
    pub end: Option<SlotKey>,
    /// Grid step.
    pub step_hours: Option<NonZeroU32>,
    /// Base pacing delay.
    pub base_delay_ms: Option<u64>,
    /// Pacing jitter bound.
    pub jitter_delay_ms: Option<u64>,
    /// Base wait after rate limiting.
    pub rate_limit_cooldown_ms: Option<u64>,
    /// Wait after other failures.
    pub transient_cooldown_ms: Option<u64>,
    /// Per-slot retry budget.
    pub max_slot_retry_secs: Option<u64>,
    /// Per-request timeout.
    pub request_timeout_ms: Option<u64>,
    /// Hard call ceiling; `0` disables.
    pub max_requests_per_minute: Option<u32>,
    /// Remote endpoint.
    pub api_url: Option<String>,
    /// Store location.
    pub database_url: Option<String>,
    /// Table name, validated against [`SLOT_TABLE`].
    pub table: Option<String>,
    /// Client identity pool.
    pub user_agents: Option<Vec<String>>,
    /// Idle heartbeat interval.
    pub heartbeat_secs: Option<u64>,
    /// Request body overrides.
    pub request: Option<RequestDefaults>,
}

impl ConfigFile {
    /// Parse the TOML text of a config file.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("failed to parse config TOML")
    }

    /// Read and parse a config file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// First slot.
    pub start: SlotKey,
    /// Last slot bound (inclusive).
    pub end: SlotKey,
    /// Grid step in hours.
    pub step_hours: NonZeroU32,
    /// Base pacing delay.
    pub base_delay: Duration,
    /// Pacing jitter bound.
    pub jitter: Duration,
    /// Base wait after rate limiting.
    pub rate_limit_cooldown: Duration,
    /// Wait after other failures.
    pub transient_cooldown: Duration,
    /// Per-slot retry budget; `None` retries forever.
    pub max_slot_retry: Option<Duration>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Hard call ceiling.
    pub max_requests_per_minute: Option<NonZeroU32>,
    /// Remote endpoint.
    pub api_url: String,
    /// Store location; kept out of logs.
    pub database_url: SecretString,
    /// Validated table name.
    pub table: String,
    /// Client identity pool.
    pub user_agents: IdentityPool,
    /// Idle heartbeat interval.
    pub heartbeat: Duration,
    /// Request body defaults.
    pub request_defaults: RequestDefaults,
}

fn env_value<T>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_optional(name, env(name))
}

fn invalid(name: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn millis(layered: Option<u64>, default_ms: u64) -> Duration {
    Duration::from_millis(layered.unwrap_or(default_ms))
}

impl IngestConfig {
    /// Resolve from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => ConfigFile::from_path(p)?,
            None => ConfigFile::default(),
        };
        Ok(Self::resolve(file, &optional_env_var)?)
    }

    /// Layer `env` over `file` over the defaults, then validate.
    ///
    /// `env` maps a variable name to its trimmed, non-blank value.
    pub fn resolve(
        file: ConfigFile,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_start = SlotKey::from_ymd_h(1950, 1, 1, 0)
            .ok_or_else(|| invalid("SLOT_START", "1950-01-01", "bad built-in default"))?;
        let default_end = SlotKey::from_ymd_h(2050, 12, 31, 23)
            .ok_or_else(|| invalid("SLOT_END", "2050-12-31", "bad built-in default"))?;

        let start = env_value(env, "SLOT_START")?
            .or(file.start)
            .unwrap_or(default_start);
        let end = env_value(env, "SLOT_END")?.or(file.end).unwrap_or(default_end);
        if start > end {
            return Err(invalid("SLOT_END", end, format!("must not be before {start}")));
        }

        let step_hours = env_value(env, "SLOT_STEP_HOURS")?
            .or(file.step_hours)
            .unwrap_or(DEFAULT_STEP_HOURS);

        let base_delay = millis(env_value(env, "BASE_DELAY_MS")?.or(file.base_delay_ms), 2500);
        let jitter = millis(env_value(env, "JITTER_DELAY_MS")?.or(file.jitter_delay_ms), 3000);
        let rate_limit_cooldown = millis(
            env_value(env, "RATE_LIMIT_COOLDOWN_MS")?.or(file.rate_limit_cooldown_ms),
            60_000,
        );
        let transient_cooldown = millis(
            env_value(env, "TRANSIENT_COOLDOWN_MS")?.or(file.transient_cooldown_ms),
            5_000,
        );
        let max_slot_retry = env_value::<u64>(env, "MAX_SLOT_RETRY_SECS")?
            .or(file.max_slot_retry_secs)
            .map(Duration::from_secs);
        let request_timeout = millis(
            env_value(env, "REQUEST_TIMEOUT_MS")?.or(file.request_timeout_ms),
            10_000,
        );
        if request_timeout.is_zero() {
            return Err(invalid("REQUEST_TIMEOUT_MS", 0, "must be positive"));
        }
        let max_requests_per_minute = NonZeroU32::new(
            env_value(env, "MAX_REQUESTS_PER_MINUTE")?
                .or(file.max_requests_per_minute)
                .unwrap_or(30),
        );

        let api_url = env("CALC_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let database_url = env("DATABASE_URL")
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let table = env("DB_TABLE")
            .or(file.table)
            .unwrap_or_else(|| SLOT_TABLE.to_string());
        if table != SLOT_TABLE {
            return Err(invalid(
                "DB_TABLE",
                &table,
                format!("the store only provides `{SLOT_TABLE}`"),
            ));
        }

        let user_agents = match file.user_agents {
            Some(list) => IdentityPool::new(list)
                .ok_or_else(|| invalid("user_agents", "[]", "needs at least one entry"))?,
            None => IdentityPool::new(DEFAULT_USER_AGENTS.iter().copied())
                .ok_or_else(|| invalid("user_agents", "[]", "bad built-in default"))?,
        };

        Ok(Self {
            start,
            end,
            step_hours,
            base_delay,
            jitter,
            rate_limit_cooldown,
            transient_cooldown,
            max_slot_retry,
            request_timeout,
            max_requests_per_minute,
            api_url,
            database_url: SecretString::from(database_url),
            table,
            user_agents,
            heartbeat: Duration::from_secs(file.heartbeat_secs.unwrap_or(300).max(1)),
            request_defaults: file.request.unwrap_or_default(),
        })
    }

    /// The slot grid to ingest.
    pub fn grid(&self) -> anyhow::Result<TimeGrid> {
        TimeGrid::new(self.start, self.end, self.step_hours)
    }

    /// Delay between successful calls.
    pub fn pacing(&self) -> Pacing {
        Pacing::new(self.base_delay, self.jitter)
    }

    /// Settings for the HTTP provider.
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            endpoint: self.api_url.clone(),
            timeout: self.request_timeout,
            identities: self.user_agents.clone(),
            max_requests_per_minute: self.max_requests_per_minute,
        }
    }

    /// Settings for the ingestion loop.
    pub fn ingest_settings(&self, idle_when_drained: bool) -> IngestSettings {
        IngestSettings {
            rate_limit_cooldown: self.rate_limit_cooldown,
            transient_cooldown: self.transient_cooldown,
            max_slot_retry: self.max_slot_retry,
            idle_when_drained,
            heartbeat: self.heartbeat,
        }
    }

    /// The database URL.
    pub fn database_url(&self) -> &str {
        self.database_url.expose_secret()
    }
}
