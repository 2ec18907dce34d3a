//! Top-level error type for [`WalletKit`](crate::lifecycle::WalletKit)
//! operations.

use seedkit_secure_store::StoreError;
use thiserror::Error;

use crate::derivation::DerivationError;
use crate::migrations::MigrationError;
use crate::repository::RepositoryError;

/// Any failure of a wallet lifecycle operation.
///
/// The layer-specific errors are surfaced transparently so callers can
/// match on the underlying cause; `SelectionRequired` is the one
/// lifecycle-level condition with no lower-layer counterpart.
#[derive(Debug, Error)]
pub enum WalletKitError {
    /// Seed-material classification or key derivation failed.
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// The secret store failed or a required authentication challenge
    /// was denied.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A wallet bookkeeping invariant was violated.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A storage migration failed; the wallet state must not be trusted.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// No wallet is selected. Raised after the selected wallet was
    /// deleted, or on a device with no wallets; the caller must create,
    /// import, or select a wallet before retrying.
    #[error("no wallet is selected")]
    SelectionRequired,
}
