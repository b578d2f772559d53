//! Error taxonomy for the decision engine, audit ledger, and backtest.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, LendingError>;

/// Every failure the core can surface to a caller.
///
/// Nothing here is retried automatically: `decide` and `append` are not
/// idempotent, so retry policy belongs to whoever holds the request.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("[VR-1001] invalid application: {field} {reason}")]
    InvalidApplication { field: &'static str, reason: String },

    #[error("[VR-2001] scoring unavailable: {details}")]
    ScoringUnavailable { details: String },

    #[error("[VR-2002] simulation unavailable: {details}")]
    SimulationUnavailable { details: String },

    #[error("[VR-2003] insufficient sample: requested {requested} rows, corpus has {available}")]
    InsufficientSample { requested: usize, available: usize },

    #[error("[VR-3001] audit ledger failure in {context}: {details}")]
    Persistence {
        context: &'static str,
        details: String,
    },

    #[error("[VR-4001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[VR-4002] configuration parse failure in {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("[VR-4003] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LendingError {
    /// Stable machine-parseable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidApplication { .. } => "VR-1001",
            Self::ScoringUnavailable { .. } => "VR-2001",
            Self::SimulationUnavailable { .. } => "VR-2002",
            Self::InsufficientSample { .. } => "VR-2003",
            Self::Persistence { .. } => "VR-3001",
            Self::InvalidConfig { .. } => "VR-4001",
            Self::ConfigParse { .. } => "VR-4002",
            Self::Io { .. } => "VR-4003",
        }
    }

    /// Caller supplied bad input; nothing was scored or written.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidApplication { .. } | Self::InsufficientSample { .. }
        )
    }

    /// An upstream collaborator (scorer, corpus) could not serve the request.
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ScoringUnavailable { .. } | Self::SimulationUnavailable { .. }
        )
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidApplication {
            field,
            reason: reason.into(),
        }
    }

    pub fn scoring(details: impl Into<String>) -> Self {
        Self::ScoringUnavailable {
            details: details.into(),
        }
    }

    pub fn simulation(details: impl Into<String>) -> Self {
        Self::SimulationUnavailable {
            details: details.into(),
        }
    }

    pub fn persistence(context: &'static str, details: impl ToString) -> Self {
        Self::Persistence {
            context,
            details: details.to_string(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for LendingError {
    fn from(value: rusqlite::Error) -> Self {
        Self::persistence("rusqlite", value)
    }
}
