//! Secret-store key schema and versioned record types.
//!
//! Every structured record carries an explicit `version` field so callers
//! can detect stale formats without running a full migration. The
//! composite keys (`{address}_wallet_private_key`,
//! `{wallet_id}_wallet_seed_phrase`) are the current per-wallet scheme;
//! the bare constants also name the legacy flat locations consumed by
//! [`migrations`](crate::migrations).

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{SelectedPointer, WalletCollection};

/// Current version written into every structured record.
pub const RECORD_VERSION: u32 = 1;

/// Legacy flat seed-phrase location (single-wallet era); also the suffix
/// of the current per-wallet key.
pub const SEED_PHRASE_KEY: &str = "wallet_seed_phrase";

/// Legacy flat private-key location; also the suffix of the current
/// per-address key.
pub const PRIVATE_KEY_KEY: &str = "wallet_private_key";

/// The (public) address of the legacy single wallet.
pub const ADDRESS_KEY: &str = "wallet_address";

/// The selected-wallet pointer record.
pub const SELECTED_WALLET_KEY: &str = "selected_wallet";

/// The all-wallets collection record.
pub const ALL_WALLETS_KEY: &str = "all_wallets";

/// Flag set once flat secrets have been re-keyed per wallet; account
/// derivation skips the migration shim when it is present.
pub const SEED_MIGRATED_KEY: &str = "seed_phrase_migrated";

/// Highest fully-applied migration index, stored as a decimal string.
pub const MIGRATION_VERSION_KEY: &str = "migration_version";

/// Legacy flat profiles table (pre-HD multi-profile era).
pub const PROFILES_KEY: &str = "user_profiles";

/// Key of the private-key record for `address`.
#[must_use]
pub fn private_key_key(address: &str) -> String {
    format!("{address}_{PRIVATE_KEY_KEY}")
}

/// Key of the seed-phrase record for the wallet `id`.
#[must_use]
pub fn seed_phrase_key(id: &str) -> String {
    format!("{id}_{SEED_PHRASE_KEY}")
}

/// Stored private key for one account. Funds-controlling secret; saved
/// under the user-presence policy and zeroized on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeyRecord {
    /// The account address the key controls.
    pub address: String,
    /// `0x`-prefixed hex private key.
    pub private_key: String,
    /// Record format version.
    pub version: u32,
}

/// Stored seed material for one wallet. Funds-controlling secret; saved
/// under the user-presence policy and zeroized on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SeedPhraseRecord {
    /// Owning wallet id.
    pub id: String,
    /// Canonical seed material: mnemonic phrase, hex seed, or hex
    /// private key.
    pub seed_phrase: String,
    /// Record format version.
    pub version: u32,
}

/// Stored wallet collection. Bookkeeping only; contains no secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllWalletsRecord {
    /// Record format version.
    pub version: u32,
    /// The wallet collection.
    pub wallets: WalletCollection,
}

/// Stored selected-wallet pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedWalletRecord {
    /// Record format version.
    pub version: u32,
    /// The active (wallet, address) pair.
    pub selected: SelectedPointer,
}
