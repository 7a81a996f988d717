use thiserror::Error;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting was present but could not be parsed into the expected type.
    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        /// Name of the setting (environment variable or config key).
        name: String,
        /// The raw value that failed to parse.
        value: String,
        /// Parser error message.
        reason: String,
    },
}
