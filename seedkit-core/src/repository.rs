//! Durable wallet/account bookkeeping.
//!
//! [`WalletRepository`] owns the wallet collection and the selected
//! pointer: it caches both in memory and writes them through to the
//! secret store on every mutation (read-modify-write under the
//! single-writer discipline enforced by
//! [`WalletKit`](crate::lifecycle::WalletKit)).

use std::sync::Arc;

use seedkit_secure_store::{
    load_record, save_record, AccessPolicy, SecretStore, StoreError,
};
use thiserror::Error;
use tracing::warn;

use crate::keys::{
    AllWalletsRecord, SelectedWalletRecord, ALL_WALLETS_KEY, RECORD_VERSION,
    SELECTED_WALLET_KEY,
};
use crate::types::{Account, SelectedPointer, Wallet, WalletCollection, WalletId};

/// Errors from repository operations. `DuplicateAddress`, `InvalidPointer`
/// and `EmptyWallet` are invariant violations: they should never occur in
/// correct callers and are fatal to the operation but not to the process.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The address already exists somewhere in the collection.
    #[error("address already present in the collection: {address}")]
    DuplicateAddress {
        /// The colliding address.
        address: String,
    },

    /// The pointer does not reference an existing wallet and a member
    /// address of that wallet.
    #[error("selected pointer does not reference a wallet account")]
    InvalidPointer,

    /// No wallet exists under the given id.
    #[error("unknown wallet: {id}")]
    UnknownWallet {
        /// The id that was requested.
        id: WalletId,
    },

    /// A wallet must hold at least one account before it is persisted.
    #[error("refusing to persist a wallet with no accounts: {id}")]
    EmptyWallet {
        /// The offending wallet id.
        id: WalletId,
    },

    /// The backing secret store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The durable collection of wallets and the selected-wallet pointer.
pub struct WalletRepository {
    store: Arc<dyn SecretStore>,
    wallets: WalletCollection,
    selected: Option<SelectedPointer>,
}

impl WalletRepository {
    /// Loads the repository from the store. Absent records mean an empty
    /// collection; this is the fresh-install case, not an error.
    ///
    /// Callers must run [`MigrationRunner`](crate::migrations::MigrationRunner)
    /// to completion before the loaded state is trusted.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than [`StoreError::NotFound`].
    pub fn load(store: Arc<dyn SecretStore>) -> Result<Self, RepositoryError> {
        let wallets = match load_record::<AllWalletsRecord>(&*store, ALL_WALLETS_KEY) {
            Ok(record) => record.wallets,
            Err(StoreError::NotFound { .. }) => WalletCollection::new(),
            Err(err) => return Err(err.into()),
        };
        let selected = match load_record::<SelectedWalletRecord>(&*store, SELECTED_WALLET_KEY) {
            Ok(record) => Some(record.selected),
            Err(StoreError::NotFound { .. }) => None,
            Err(err) => return Err(err.into()),
        };

        // A dangling pointer cannot be acted on; drop it rather than let
        // dependent operations read a deleted wallet.
        let selected = selected.filter(|pointer| {
            let valid = wallets
                .get(&pointer.wallet_id)
                .is_some_and(|wallet| wallet.contains_address(&pointer.address));
            if !valid {
                warn!(wallet_id = %pointer.wallet_id, "discarding dangling selected pointer");
            }
            valid
        });

        Ok(Self {
            store,
            wallets,
            selected,
        })
    }

    /// The current wallet collection.
    #[must_use]
    pub fn list(&self) -> &WalletCollection {
        &self.wallets
    }

    /// Inserts or fully replaces a wallet by id.
    ///
    /// The mutation is persisted before the in-memory collection is
    /// updated; on a store failure the cached state is unchanged and no
    /// phantom wallet is visible.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::EmptyWallet`] for a wallet with no
    /// accounts and [`RepositoryError::DuplicateAddress`] if any of its
    /// addresses already belongs to a different wallet.
    pub fn upsert_wallet(&mut self, wallet: Wallet) -> Result<(), RepositoryError> {
        if wallet.addresses.is_empty() {
            return Err(RepositoryError::EmptyWallet { id: wallet.id });
        }
        for account in &wallet.addresses {
            if let Some(owner) = self.wallets.owner_of(&account.address) {
                if owner.id != wallet.id {
                    return Err(RepositoryError::DuplicateAddress {
                        address: account.address.clone(),
                    });
                }
            }
        }
        let mut next = self.wallets.clone();
        next.insert(wallet);
        self.persist_wallets(&next)?;
        self.wallets = next;
        Ok(())
    }

    /// Appends an account to a wallet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet
    /// and [`RepositoryError::DuplicateAddress`] if the address exists
    /// anywhere in the collection.
    pub fn add_account(
        &mut self,
        wallet_id: &WalletId,
        account: Account,
    ) -> Result<(), RepositoryError> {
        if self.wallets.contains_address(&account.address) {
            return Err(RepositoryError::DuplicateAddress {
                address: account.address,
            });
        }
        let mut next = self.wallets.clone();
        let wallet = next
            .get_mut(wallet_id)
            .ok_or_else(|| RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            })?;
        wallet.addresses.push(account);
        self.persist_wallets(&next)?;
        self.wallets = next;
        Ok(())
    }

    /// Removes a wallet and returns the addresses whose secret-store
    /// entries must be purged by the caller.
    ///
    /// If the selected pointer referenced the removed wallet it is
    /// cleared; the caller must establish a new selection before
    /// dependent operations proceed.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet.
    pub fn remove_wallet(&mut self, wallet_id: &WalletId) -> Result<Vec<String>, RepositoryError> {
        let mut next = self.wallets.clone();
        let wallet = next
            .remove(wallet_id)
            .ok_or_else(|| RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            })?;
        let purge: Vec<String> = wallet
            .addresses
            .iter()
            .map(|account| account.address.clone())
            .collect();

        let clears_selection = self
            .selected
            .as_ref()
            .is_some_and(|pointer| pointer.wallet_id == *wallet_id);
        if clears_selection {
            self.persist_pointer(None)?;
        }
        self.persist_wallets(&next)?;
        self.wallets = next;
        if clears_selection {
            self.selected = None;
        }
        Ok(purge)
    }

    /// The selected pointer, if a valid selection exists.
    #[must_use]
    pub fn get_selected(&self) -> Option<&SelectedPointer> {
        self.selected.as_ref()
    }

    /// Sets the selected pointer.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidPointer`] unless the pointer
    /// references an existing wallet and a member address of it.
    pub fn set_selected(&mut self, pointer: SelectedPointer) -> Result<(), RepositoryError> {
        let valid = self
            .wallets
            .get(&pointer.wallet_id)
            .is_some_and(|wallet| wallet.contains_address(&pointer.address));
        if !valid {
            return Err(RepositoryError::InvalidPointer);
        }
        self.persist_pointer(Some(&pointer))?;
        self.selected = Some(pointer);
        Ok(())
    }

    /// Renames a wallet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet.
    pub fn rename_wallet(
        &mut self,
        wallet_id: &WalletId,
        name: String,
    ) -> Result<(), RepositoryError> {
        self.with_wallet(wallet_id, |wallet| wallet.name = name)
    }

    /// Changes a wallet's palette color index.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet.
    pub fn set_wallet_color(
        &mut self,
        wallet_id: &WalletId,
        color: u8,
    ) -> Result<(), RepositoryError> {
        self.with_wallet(wallet_id, |wallet| {
            wallet.color = color % crate::types::WALLET_COLOR_COUNT;
        })
    }

    /// Sets the label of one account in a wallet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet
    /// and [`RepositoryError::InvalidPointer`] for an address that is not
    /// a member of it.
    pub fn set_account_label(
        &mut self,
        wallet_id: &WalletId,
        address: &str,
        label: String,
    ) -> Result<(), RepositoryError> {
        self.with_account(wallet_id, address, |account| account.label = label)
    }

    /// Shows or hides one account in a wallet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::UnknownWallet`] for a missing wallet
    /// and [`RepositoryError::InvalidPointer`] for an address that is not
    /// a member of it.
    pub fn set_account_visibility(
        &mut self,
        wallet_id: &WalletId,
        address: &str,
        visible: bool,
    ) -> Result<(), RepositoryError> {
        self.with_account(wallet_id, address, |account| account.visible = visible)
    }

    fn with_wallet(
        &mut self,
        wallet_id: &WalletId,
        mutate: impl FnOnce(&mut Wallet),
    ) -> Result<(), RepositoryError> {
        let mut next = self.wallets.clone();
        let wallet = next
            .get_mut(wallet_id)
            .ok_or_else(|| RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            })?;
        mutate(wallet);
        self.persist_wallets(&next)?;
        self.wallets = next;
        Ok(())
    }

    fn with_account(
        &mut self,
        wallet_id: &WalletId,
        address: &str,
        mutate: impl FnOnce(&mut Account),
    ) -> Result<(), RepositoryError> {
        let mut next = self.wallets.clone();
        let wallet = next
            .get_mut(wallet_id)
            .ok_or_else(|| RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            })?;
        let account = wallet
            .addresses
            .iter_mut()
            .find(|account| account.address == address)
            .ok_or(RepositoryError::InvalidPointer)?;
        mutate(account);
        self.persist_wallets(&next)?;
        self.wallets = next;
        Ok(())
    }

    fn persist_wallets(&self, wallets: &WalletCollection) -> Result<(), RepositoryError> {
        let record = AllWalletsRecord {
            version: RECORD_VERSION,
            wallets: wallets.clone(),
        };
        save_record(&*self.store, ALL_WALLETS_KEY, &record, AccessPolicy::PUBLIC)?;
        Ok(())
    }

    fn persist_pointer(&self, pointer: Option<&SelectedPointer>) -> Result<(), RepositoryError> {
        match pointer {
            Some(pointer) => {
                let record = SelectedWalletRecord {
                    version: RECORD_VERSION,
                    selected: pointer.clone(),
                };
                save_record(
                    &*self.store,
                    SELECTED_WALLET_KEY,
                    &record,
                    AccessPolicy::PUBLIC,
                )?;
            }
            None => match self.store.delete(SELECTED_WALLET_KEY) {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }
}

impl std::fmt::Debug for WalletRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRepository")
            .field("wallets", &self.wallets.len())
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WalletType;
    use seedkit_secure_store::MemoryStore;

    fn repository() -> WalletRepository {
        WalletRepository::load(Arc::new(MemoryStore::new())).expect("load")
    }

    fn wallet(id: &str, addresses: &[&str]) -> Wallet {
        Wallet {
            id: WalletId::from(id),
            name: "My Wallet".to_owned(),
            color: 0,
            kind: WalletType::Mnemonic,
            imported: false,
            addresses: addresses
                .iter()
                .enumerate()
                .map(|(index, address)| {
                    Account::new((*address).to_owned(), u32::try_from(index).expect("index"))
                })
                .collect(),
        }
    }

    #[test]
    fn test_upsert_and_list() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");
        assert_eq!(repo.list().len(), 1);

        // Replacing by id is allowed, including its own addresses.
        repo.upsert_wallet(wallet("w1", &["0xA", "0xB"]))
            .expect("replace");
        assert_eq!(
            repo.list().get(&WalletId::from("w1")).expect("wallet").addresses.len(),
            2
        );
    }

    #[test]
    fn test_upsert_rejects_empty_wallet() {
        let mut repo = repository();
        assert!(matches!(
            repo.upsert_wallet(wallet("w1", &[])),
            Err(RepositoryError::EmptyWallet { .. })
        ));
    }

    #[test]
    fn test_upsert_rejects_cross_wallet_duplicate() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");
        assert!(matches!(
            repo.upsert_wallet(wallet("w2", &["0xA"])),
            Err(RepositoryError::DuplicateAddress { .. })
        ));
    }

    #[test]
    fn test_add_account_enforces_global_uniqueness() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");
        repo.upsert_wallet(wallet("w2", &["0xB"])).expect("upsert");

        // Duplicate across wallets.
        assert!(matches!(
            repo.add_account(&WalletId::from("w2"), Account::new("0xA".to_owned(), 1)),
            Err(RepositoryError::DuplicateAddress { .. })
        ));
        // Duplicate within the same wallet.
        assert!(matches!(
            repo.add_account(&WalletId::from("w1"), Account::new("0xA".to_owned(), 1)),
            Err(RepositoryError::DuplicateAddress { .. })
        ));

        repo.add_account(&WalletId::from("w1"), Account::new("0xC".to_owned(), 1))
            .expect("add");
    }

    #[test]
    fn test_set_selected_validates_membership() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");

        assert!(matches!(
            repo.set_selected(SelectedPointer {
                wallet_id: WalletId::from("w1"),
                address: "0xB".to_owned(),
            }),
            Err(RepositoryError::InvalidPointer)
        ));
        assert!(matches!(
            repo.set_selected(SelectedPointer {
                wallet_id: WalletId::from("w2"),
                address: "0xA".to_owned(),
            }),
            Err(RepositoryError::InvalidPointer)
        ));

        repo.set_selected(SelectedPointer {
            wallet_id: WalletId::from("w1"),
            address: "0xA".to_owned(),
        })
        .expect("select");
        assert!(repo.get_selected().is_some());
    }

    #[test]
    fn test_remove_wallet_returns_purge_list_and_clears_selection() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA", "0xB"])).expect("upsert");
        repo.set_selected(SelectedPointer {
            wallet_id: WalletId::from("w1"),
            address: "0xA".to_owned(),
        })
        .expect("select");

        let purge = repo.remove_wallet(&WalletId::from("w1")).expect("remove");
        assert_eq!(purge, vec!["0xA".to_owned(), "0xB".to_owned()]);
        assert!(repo.get_selected().is_none());
        assert!(repo.list().is_empty());
    }

    #[test]
    fn test_state_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut repo = WalletRepository::load(Arc::clone(&store) as Arc<dyn SecretStore>)
                .expect("load");
            repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");
            repo.set_selected(SelectedPointer {
                wallet_id: WalletId::from("w1"),
                address: "0xA".to_owned(),
            })
            .expect("select");
        }

        let repo =
            WalletRepository::load(Arc::clone(&store) as Arc<dyn SecretStore>).expect("reload");
        assert_eq!(repo.list().len(), 1);
        assert_eq!(
            repo.get_selected().map(|pointer| pointer.address.clone()),
            Some("0xA".to_owned())
        );
    }

    #[test]
    fn test_rename_and_recolor() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");

        repo.rename_wallet(&WalletId::from("w1"), "Savings".to_owned())
            .expect("rename");
        repo.set_wallet_color(&WalletId::from("w1"), 200).expect("recolor");
        let stored = repo.list().get(&WalletId::from("w1")).expect("wallet");
        assert_eq!(stored.name, "Savings");
        // Out-of-palette indices wrap.
        assert!(stored.color < crate::types::WALLET_COLOR_COUNT);
    }

    /// Delegates to a [`MemoryStore`] but fails saves of one key once a
    /// budget of successful writes is spent, simulating keychain write
    /// failures mid-session.
    struct FailingStore {
        inner: MemoryStore,
        fail_key: &'static str,
        allowed_saves: std::sync::atomic::AtomicUsize,
    }

    impl FailingStore {
        fn failing_after(fail_key: &'static str, allowed_saves: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_key,
                allowed_saves: std::sync::atomic::AtomicUsize::new(allowed_saves),
            }
        }
    }

    impl SecretStore for FailingStore {
        fn save_string(
            &self,
            key: &str,
            value: &str,
            policy: AccessPolicy,
        ) -> seedkit_secure_store::StoreResult<()> {
            use std::sync::atomic::Ordering;
            if key == self.fail_key
                && self
                    .allowed_saves
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_err()
            {
                return Err(StoreError::unavailable("injected save failure"));
            }
            self.inner.save_string(key, value, policy)
        }

        fn load_string(&self, key: &str) -> seedkit_secure_store::StoreResult<String> {
            self.inner.load_string(key)
        }

        fn delete(&self, key: &str) -> seedkit_secure_store::StoreResult<()> {
            self.inner.delete(key)
        }

        fn contains(&self, key: &str) -> seedkit_secure_store::StoreResult<bool> {
            self.inner.contains(key)
        }
    }

    #[test]
    fn test_failed_persist_leaves_no_phantom_wallet() {
        let store = Arc::new(FailingStore::failing_after(ALL_WALLETS_KEY, 0));
        let mut repo =
            WalletRepository::load(Arc::clone(&store) as Arc<dyn SecretStore>).expect("load");

        let result = repo.upsert_wallet(wallet("w1", &["0xA"]));
        assert!(matches!(
            result,
            Err(RepositoryError::Store(StoreError::Unavailable { .. }))
        ));
        // The failed wallet never becomes visible.
        assert!(repo.list().is_empty());
    }

    #[test]
    fn test_failed_persist_rolls_back_account_append() {
        let store = Arc::new(FailingStore::failing_after(ALL_WALLETS_KEY, 1));
        let mut repo =
            WalletRepository::load(Arc::clone(&store) as Arc<dyn SecretStore>).expect("load");
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");

        let result = repo.add_account(&WalletId::from("w1"), Account::new("0xB".to_owned(), 1));
        assert!(matches!(
            result,
            Err(RepositoryError::Store(StoreError::Unavailable { .. }))
        ));
        assert_eq!(
            repo.list()
                .get(&WalletId::from("w1"))
                .expect("wallet")
                .addresses
                .len(),
            1
        );
    }

    #[test]
    fn test_account_label_and_visibility() {
        let mut repo = repository();
        repo.upsert_wallet(wallet("w1", &["0xA"])).expect("upsert");

        repo.set_account_label(&WalletId::from("w1"), "0xA", "Cold".to_owned())
            .expect("label");
        repo.set_account_visibility(&WalletId::from("w1"), "0xA", false)
            .expect("hide");

        let account = &repo.list().get(&WalletId::from("w1")).expect("wallet").addresses[0];
        assert_eq!(account.label, "Cold");
        assert!(!account.visible);

        assert!(matches!(
            repo.set_account_label(&WalletId::from("w1"), "0xZ", String::new()),
            Err(RepositoryError::InvalidPointer)
        ));
    }
}
