use std::fmt;

use thiserror::Error;

use crate::logging::LoggingError;

/// Unified result type for the counter tokens crate.
pub type Result<T> = std::result::Result<T, CounterTokenError>;

/// What a `NotFound` / `DuplicateName` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Counter,
    TokenGroup,
    Surface,
    Instance,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Counter => "counter",
            EntityKind::TokenGroup => "token group",
            EntityKind::Surface => "surface",
            EntityKind::Instance => "instance",
        };
        f.write_str(label)
    }
}

/// Errors reported to the invoking operator context.
#[derive(Debug, Error)]
pub enum CounterTokenError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{kind} `{name}` does not exist")]
    NotFound { kind: EntityKind, name: String },
    #[error("{kind} `{name}` already exists")]
    DuplicateName { kind: EntityKind, name: String },
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("canvas out of sync: {0}")]
    ExternalStateInconsistent(String),
    #[error("state lock poisoned: {0}")]
    Poisoned(&'static str),
    #[error("operation cannot run from inside a synchronization handler")]
    GateUnavailable,
    #[error("logging failure: {0}")]
    Logging(#[from] LoggingError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CounterTokenError {
    pub fn counter_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: EntityKind::Counter,
            name: name.into(),
        }
    }

    pub fn group_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: EntityKind::TokenGroup,
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for errors the operator caused, as opposed to environment failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::NotFound { .. }
                | Self::DuplicateName { .. }
                | Self::OutOfRange(_)
        )
    }
}
