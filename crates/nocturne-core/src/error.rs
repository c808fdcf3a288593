use std::fmt;

/// Misconfiguration. Raised only while building tables or validating config,
/// never while compiling a preamble.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownDimension(String),
    MalformedBands(String),
    InvalidSetting(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownDimension(key) => write!(f, "unknown dimension: {key}"),
            ConfigError::MalformedBands(msg) => write!(f, "malformed band table: {msg}"),
            ConfigError::InvalidSetting(msg) => write!(f, "invalid setting: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Transient failure of a state backend. Recovered locally by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    Unavailable(String),
    Corrupt(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable(msg) => write!(f, "backend unavailable: {msg}"),
            BackendError::Corrupt(msg) => write!(f, "backend returned corrupt data: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
