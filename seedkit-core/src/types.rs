//! Core wallet data model: accounts, wallets, the wallet collection, and
//! the selected-wallet pointer.
//!
//! This is the only shape the rest of the system ever sees; legacy
//! storage layouts are modeled as snapshot types inside
//! [`migrations`](crate::migrations) and never escape it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of entries in the wallet color palette. Colors are palette
/// indices in `0..WALLET_COLOR_COUNT`.
pub const WALLET_COLOR_COUNT: u8 = 8;

/// Opaque, time-ordered unique wallet identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WalletId(String);

impl WalletId {
    /// Generates a fresh identifier. UUIDv7 keeps ids time-ordered, so a
    /// collection listing follows creation order.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("wallet_{}", Uuid::now_v7().as_simple()))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WalletId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for WalletId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// How a wallet's key material was provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    /// A raw secp256k1 private key; exactly one account, no derivation.
    PrivateKey,
    /// A BIP-39 mnemonic phrase.
    Mnemonic,
    /// Opaque seed bytes.
    Seed,
}

/// A derived account within a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// EIP-55 checksummed address, derived from (seed, index).
    pub address: String,
    /// Derivation index. Monotonic per wallet; never reused after
    /// deletion.
    pub index: u32,
    /// User-assigned label; empty by default.
    pub label: String,
    /// Whether the account is shown in wallet listings.
    pub visible: bool,
}

impl Account {
    /// Creates the account entry for a freshly derived address.
    #[must_use]
    pub fn new(address: String, index: u32) -> Self {
        Self {
            address,
            index,
            label: String::new(),
            visible: true,
        }
    }
}

/// A wallet: one unit of seed material plus its derived accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Opaque unique identifier.
    pub id: WalletId,
    /// Display name.
    pub name: String,
    /// Palette color index in `0..WALLET_COLOR_COUNT`.
    pub color: u8,
    /// Kind of seed material backing the wallet.
    #[serde(rename = "type")]
    pub kind: WalletType,
    /// Whether the wallet was imported rather than generated on-device.
    pub imported: bool,
    /// Derived accounts, ordered by creation. Non-empty for any persisted
    /// wallet; the first entry always has index 0.
    pub addresses: Vec<Account>,
}

impl Wallet {
    /// The next derivation index: `max(existing indices) + 1`, or 0 for
    /// an (unpersisted) empty wallet. Indices are never reused, even
    /// after an account is removed.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        self.addresses
            .iter()
            .map(|account| account.index)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Whether any account in this wallet has the given address.
    #[must_use]
    pub fn contains_address(&self, address: &str) -> bool {
        self.addresses
            .iter()
            .any(|account| account.address == address)
    }
}

/// The durable mapping from wallet id to wallet.
///
/// Invariant: every address is globally unique across the whole
/// collection; no address is shared by two wallets. Enforced by
/// [`WalletRepository`](crate::repository::WalletRepository).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletCollection {
    wallets: BTreeMap<WalletId, Wallet>,
}

impl WalletCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a wallet by id.
    pub fn insert(&mut self, wallet: Wallet) {
        self.wallets.insert(wallet.id.clone(), wallet);
    }

    /// Looks up a wallet by id.
    #[must_use]
    pub fn get(&self, id: &WalletId) -> Option<&Wallet> {
        self.wallets.get(id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &WalletId) -> Option<&mut Wallet> {
        self.wallets.get_mut(id)
    }

    /// Removes a wallet, returning it if present.
    pub fn remove(&mut self, id: &WalletId) -> Option<Wallet> {
        self.wallets.remove(id)
    }

    /// Number of wallets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// Whether the collection holds no wallets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Iterates wallets in id order (creation order, ids being
    /// time-ordered).
    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    /// The first wallet in id order, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Wallet> {
        self.wallets.values().next()
    }

    /// The wallet owning `address`, if any.
    #[must_use]
    pub fn owner_of(&self, address: &str) -> Option<&Wallet> {
        self.wallets
            .values()
            .find(|wallet| wallet.contains_address(address))
    }

    /// Whether `address` appears anywhere in the collection.
    #[must_use]
    pub fn contains_address(&self, address: &str) -> bool {
        self.owner_of(address).is_some()
    }
}

/// Identifies which wallet and which of its accounts is active for the
/// rest of the application.
///
/// Invariant: always references an existing wallet and an address that is
/// a member of that wallet. Never left dangling; if the referenced wallet
/// is deleted the pointer is cleared and a new selection is required
/// before dependent operations proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPointer {
    /// Id of the selected wallet.
    pub wallet_id: WalletId,
    /// Address of the selected account within that wallet.
    pub address: String,
}
