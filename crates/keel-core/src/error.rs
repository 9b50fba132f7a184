use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Artifact '{artifact}' references '{reference}', which has no deployment yet")]
    UnresolvedReference { artifact: String, reference: String },

    #[error("Deployment of '{artifact}' failed: {reason}")]
    Deployment { artifact: String, reason: String },

    #[error("Transaction {tx_hash} deploying '{artifact}' was not confirmed in time")]
    ConfirmationTimeout { artifact: String, tx_hash: String },

    #[error("Still pending: {0}")]
    Pending(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Contract {0} is not indexed by the verification service yet")]
    NotIndexed(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn deployment(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::Deployment {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    /// Transient failures worth another attempt. Malformed input never is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Pending(_) | Error::Rpc(_) | Error::Timeout(_) | Error::NotIndexed(_)
        )
    }

    /// Registry or argument problems detected before anything was sent.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::UnresolvedReference { .. }
        )
    }
}
