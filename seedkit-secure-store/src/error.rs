//! Error types for secret storage operations.

use thiserror::Error;

/// Result alias for secret storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a [`SecretStore`](crate::SecretStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No secret exists under the requested key.
    #[error("secret not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },

    /// The local authentication challenge was denied or cancelled by the
    /// user. Durable state is unchanged; the read may be retried.
    #[error("local authentication failed or was cancelled")]
    AuthenticationFailed,

    /// The backing storage facility cannot be reached. Possibly transient.
    #[error("secure storage unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// A structured record could not be encoded, or a stored value is not
    /// a valid encoding of the requested record type.
    #[error("record serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Creates a [`StoreError::NotFound`] for `key`.
    #[must_use]
    pub fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_owned(),
        }
    }

    /// Creates a [`StoreError::Unavailable`] with the given reason.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}
