use std::{fmt::Display, str::FromStr};

use crate::config::ConfigError;

/// Reads an environment variable, treating unset and blank values the same way.
pub fn optional_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses an optional raw setting into `T`.
///
/// `None` stays `None`; a present value that fails to parse is reported with
/// the setting name so operators can find the offending variable.
pub fn parse_optional<T>(name: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: e.to_string(),
                value,
            }),
    }
}
