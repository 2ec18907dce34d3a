//! Wallet key-management core for a mobile cryptocurrency wallet.
//!
//! This crate owns the security-critical half of the wallet: generation
//! and hierarchical-deterministic (BIP-39/BIP-44) derivation of key
//! material, durable multi-wallet/multi-account bookkeeping, and the
//! ordered migration pipeline that upgrades on-device storage between
//! schema versions without losing or corrupting funds-controlling
//! secrets.
//!
//! The entry point is [`WalletKit`]. All public operations are
//! asynchronous and serialized through a single in-process writer; see
//! the module docs of [`lifecycle`] for the concurrency contract.
//!
//! ```ignore
//! let kit = WalletKit::new(store, DeviceCapabilities::secure_device());
//! let address = kit.initialize(None, None, None).await?;
//! let account = kit.add_account(&kit.get_selected().await?.wallet_id).await?;
//! ```

pub mod derivation;
pub mod keys;
pub mod lifecycle;
pub mod migrations;
pub mod repository;
pub mod types;

mod error;

pub use derivation::{DerivationError, KeyPair, SeedMaterial};
pub use error::WalletKitError;
pub use lifecycle::WalletKit;
pub use migrations::{MigrationError, MigrationRunner};
pub use repository::{RepositoryError, WalletRepository};
pub use types::{Account, SelectedPointer, Wallet, WalletCollection, WalletId, WalletType};
