use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse settings RON: {0}")]
    ParseError(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}
