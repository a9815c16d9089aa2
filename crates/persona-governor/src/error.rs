//! Error types for the governor, the karma ledger, and configuration loading.

use thiserror::Error;

use crate::governor::GovernorState;

/// Result type alias for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Misuse of the lifecycle state machine. Never fatal to the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernorError {
    #[error("governor is not active (state: {state}); call genesis first")]
    NotActive { state: GovernorState },

    #[error("governor already active for persona '{persona}'; end the session before a new genesis")]
    AlreadyActive { persona: String },
}

/// Errors surfaced by the karma ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The durable append failed; the cache was left untouched.
    #[error("karma entry for '{persona}' not persisted: {source}")]
    NotPersisted {
        persona: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the log (replay) or writing a rendered listing failed.
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    /// Adding `persona` would exceed the cache bound on distinct personas.
    #[error("karma cache capacity exceeded ({capacity} personas); cannot track '{persona}'")]
    CapacityExceeded { persona: String, capacity: usize },

    #[error("invalid ledger field {field}: {detail}")]
    InvalidField { field: &'static str, detail: String },
}

/// Errors from loading or saving [`crate::GovernorConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsed, but the values cannot drive the governor.
    #[error("invalid config {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}
