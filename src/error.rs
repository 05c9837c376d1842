//! Error types for TLS provisioning

use thiserror::Error;

use crate::pki::PkiError;
use crate::provision::Stage;
use crate::store::PersistenceError;

/// Main error type for provisioning operations
///
/// Stage failures name the stage they happened in, so a caller sees e.g.
/// `prepare TLS secrets failed: persist server secret: secret ... already exists`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Creating the CA or issuing/assembling a certificate failed
    #[error("prepare TLS secrets failed: {stage}: {source}")]
    Pki {
        /// Stage that failed
        stage: Stage,
        /// Underlying PKI error
        #[source]
        source: PkiError,
    },

    /// The secret store rejected a bundle
    #[error("prepare TLS secrets failed: {stage}: {source}")]
    Persistence {
        /// Stage that failed
        stage: Stage,
        /// Underlying store error
        #[source]
        source: PersistenceError,
    },

    /// Invalid provisioner configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach a stage to a PKI failure
    pub fn pki(stage: Stage, source: PkiError) -> Self {
        Self::Pki { stage, source }
    }

    /// Attach a stage to a persistence failure
    pub fn persistence(stage: Stage, source: PersistenceError) -> Self {
        Self::Persistence { stage, source }
    }

    /// Stage the error happened in, if it came from a run
    pub fn stage(&self) -> Option<&Stage> {
        match self {
            Self::Pki { stage, .. } | Self::Persistence { stage, .. } => Some(stage),
            Self::Config(_) => None,
        }
    }
}
