//! Error types for ensembler

use std::path::PathBuf;
use thiserror::Error;

/// Result type for ensemble operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ensemble initialization and use.
///
/// Every variant is fatal to the process that hits it: the split protocol
/// has no rollback, so callers are expected to report and exit.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing path argument, bad descriptor shape or invalid rank ranges
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configuration source could not be read or parsed
    #[error("configuration error: failed to parse {}: {message}", path.display())]
    Parse {
        /// Source that failed to parse (`<inline>` for in-memory sources)
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },

    /// A split or release on the process group failed
    #[error("collective operation error: {operation} failed: {message}")]
    Collective {
        /// Primitive that failed (`split`, `release`, `rank`, ...)
        operation: &'static str,
        /// Human-readable description reported by the substrate
        message: String,
    },

    /// An output/error file could not be opened, or stream redirection failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or stream involved
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Session used outside its `init`..`finalize` window
    #[error("resource state error: {0}")]
    ResourceState(String),

    /// The calling rank is not covered by any ensemble descriptor
    #[error("rank {rank} does not belong to any ensemble")]
    NotMember {
        /// Rank of the caller in the parent group
        rank: i32,
    },
}

impl Error {
    /// Create a collective-operation error.
    pub fn collective(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Collective {
            operation,
            message: message.into(),
        }
    }

    /// Create an I/O error tagged with the path involved.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error belongs to the configuration kind (including parse failures).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::Parse { .. })
    }

    /// Short name of the error kind, as used in fatal messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) | Error::Parse { .. } => "ConfigurationError",
            Error::Collective { .. } => "CollectiveOperationError",
            Error::Io { .. } => "IOError",
            Error::ResourceState(_) => "ResourceStateError",
            Error::NotMember { .. } => "NotMemberError",
        }
    }
}
