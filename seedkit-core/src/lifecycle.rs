//! The wallet lifecycle facade.
//!
//! [`WalletKit`] is the single entry point for the host application:
//! startup initialization, wallet creation and import, account
//! derivation, selection, and deletion. All operations are async and
//! serialized through one internal lock, so every mutation observes the
//! result of the previous one; there is exactly one writer per process.
//!
//! On first use the kit runs all outstanding storage migrations and then
//! loads the wallet repository. Until that succeeds no operation touches
//! wallet state.

use std::sync::Arc;

use seedkit_secure_store::{
    load_record, save_record, AccessPolicy, DeviceCapabilities, SecretStore, StoreError,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::derivation::{self, KeyPair, SeedMaterial};
use crate::error::WalletKitError;
use crate::keys::{
    self, PrivateKeyRecord, SeedPhraseRecord, ADDRESS_KEY, PRIVATE_KEY_KEY, RECORD_VERSION,
    SEED_MIGRATED_KEY, SEED_PHRASE_KEY,
};
use crate::migrations::MigrationRunner;
use crate::repository::{RepositoryError, WalletRepository};
use crate::types::{
    Account, SelectedPointer, Wallet, WalletCollection, WalletId, WalletType,
    WALLET_COLOR_COUNT,
};

/// Default display name for a wallet generated on-device.
const DEFAULT_WALLET_NAME: &str = "My Wallet";

/// Default display name for an imported wallet.
const DEFAULT_IMPORT_NAME: &str = "Imported Wallet";

struct Session {
    repository: WalletRepository,
    // Decrypted key pair of the selected account, held for the life of
    // the session so repeated signing does not re-prompt. Invalidated on
    // selection change and wallet deletion.
    cached_pair: Option<KeyPair>,
}

/// The wallet key-management facade.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct WalletKit {
    store: Arc<dyn SecretStore>,
    capabilities: DeviceCapabilities,
    state: Mutex<Option<Session>>,
}

impl WalletKit {
    /// Creates a kit over a secret store. No storage is touched until the
    /// first operation runs.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, capabilities: DeviceCapabilities) -> Self {
        Self {
            store,
            capabilities,
            state: Mutex::new(None),
        }
    }

    /// Brings the device to a usable state and returns the active
    /// account's address.
    ///
    /// With `seed` provided, imports that material as a new wallet. On a
    /// device with no wallets, generates a fresh mnemonic wallet.
    /// Otherwise returns the currently selected address.
    ///
    /// # Errors
    ///
    /// Propagates migration, derivation, store, and repository failures;
    /// returns [`WalletKitError::SelectionRequired`] when wallets exist
    /// but none is selected.
    pub async fn initialize(
        &self,
        seed: Option<&str>,
        name: Option<&str>,
        color: Option<u8>,
    ) -> Result<String, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;

        if let Some(input) = seed {
            let (material, pair) = derivation::wallet_from_seed_material(input)?;
            return self.create_from_material(session, material, pair, name, color, true);
        }
        if session.repository.list().is_empty() {
            let material = SeedMaterial::classify(&derivation::generate_mnemonic())?;
            let pair = derivation::derive_account(&material, 0)?;
            return self.create_from_material(session, material, pair, name, color, false);
        }
        session
            .repository
            .get_selected()
            .map(|pointer| pointer.address.clone())
            .ok_or(WalletKitError::SelectionRequired)
    }

    /// Generates a brand-new mnemonic wallet and returns its first
    /// account's address.
    ///
    /// # Errors
    ///
    /// Propagates migration, derivation, store, and repository failures.
    pub async fn create_wallet(
        &self,
        name: Option<&str>,
        color: Option<u8>,
    ) -> Result<String, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        let material = SeedMaterial::classify(&derivation::generate_mnemonic())?;
        let pair = derivation::derive_account(&material, 0)?;
        self.create_from_material(session, material, pair, name, color, false)
    }

    /// Imports seed material (private key, mnemonic, or hex seed) as a
    /// new wallet and returns its first account's address.
    ///
    /// # Errors
    ///
    /// Returns a derivation error for unrecognizable material and a
    /// duplicate-address repository error when the material resolves to
    /// an account that already exists on this device.
    pub async fn import_wallet(
        &self,
        input: &str,
        name: Option<&str>,
        color: Option<u8>,
    ) -> Result<String, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        let (material, pair) = derivation::wallet_from_seed_material(input)?;
        self.create_from_material(session, material, pair, name, color, true)
    }

    /// Derives the next account of a wallet and returns its address.
    ///
    /// # Errors
    ///
    /// Returns an index-out-of-range derivation error for a private-key
    /// wallet and a duplicate-address repository error if the derived
    /// address already exists.
    pub async fn add_account(&self, wallet_id: &WalletId) -> Result<String, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;

        let wallet = session
            .repository
            .list()
            .get(wallet_id)
            .ok_or_else(|| RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            })?;
        let index = wallet.next_index();
        if wallet.kind == WalletType::PrivateKey {
            return Err(crate::derivation::DerivationError::IndexOutOfRange { index }.into());
        }

        let material = self.load_seed_material(wallet_id)?;
        let pair = derivation::derive_account(&material, index)?;
        self.save_private_key(&pair)?;
        session
            .repository
            .add_account(wallet_id, Account::new(pair.address().to_owned(), index))?;
        info!(wallet_id = %wallet_id, index, address = pair.address(), "derived account");
        Ok(pair.address().to_owned())
    }

    /// Deletes a wallet and purges all of its secrets from the store.
    ///
    /// If the deleted wallet was selected the selection is cleared;
    /// dependent operations fail with
    /// [`WalletKitError::SelectionRequired`] until a new wallet is
    /// selected, created, or imported.
    ///
    /// # Errors
    ///
    /// Returns an unknown-wallet repository error for a missing wallet.
    pub async fn delete_wallet(&self, wallet_id: &WalletId) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;

        let purge = session.repository.remove_wallet(wallet_id)?;
        for address in &purge {
            self.delete_ignoring_missing(&keys::private_key_key(address))?;
            if session
                .cached_pair
                .as_ref()
                .is_some_and(|pair| pair.address() == address)
            {
                session.cached_pair = None;
            }
        }
        self.delete_ignoring_missing(&keys::seed_phrase_key(wallet_id.as_str()))?;

        // A wallet that predates per-wallet keying still owns the flat
        // legacy secrets; they go with it.
        match self.store.load_string(ADDRESS_KEY) {
            Ok(flat_address) if purge.contains(&flat_address) => {
                self.delete_ignoring_missing(SEED_PHRASE_KEY)?;
                self.delete_ignoring_missing(PRIVATE_KEY_KEY)?;
                self.delete_ignoring_missing(ADDRESS_KEY)?;
            }
            Ok(_) | Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        info!(wallet_id = %wallet_id, accounts = purge.len(), "deleted wallet");
        Ok(())
    }

    /// The selected (wallet, account) pointer.
    ///
    /// # Errors
    ///
    /// Returns [`WalletKitError::SelectionRequired`] when no valid
    /// selection exists.
    pub async fn get_selected(&self) -> Result<SelectedPointer, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        session
            .repository
            .get_selected()
            .cloned()
            .ok_or(WalletKitError::SelectionRequired)
    }

    /// Selects the account with the given address.
    ///
    /// # Errors
    ///
    /// Returns an invalid-pointer repository error when no wallet owns
    /// the address.
    pub async fn select_wallet(&self, address: &str) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;

        let wallet_id = session
            .repository
            .list()
            .owner_of(address)
            .map(|wallet| wallet.id.clone())
            .ok_or(RepositoryError::InvalidPointer)?;
        session.repository.set_selected(SelectedPointer {
            wallet_id: wallet_id.clone(),
            address: address.to_owned(),
        })?;
        session.cached_pair = None;
        debug!(wallet_id = %wallet_id, address, "selection changed");
        Ok(())
    }

    /// The key pair of the selected account, decrypting it from the
    /// store (behind a local authentication challenge) on first use and
    /// caching it for the session.
    ///
    /// # Errors
    ///
    /// Returns [`WalletKitError::SelectionRequired`] with no selection
    /// and an authentication-failed store error when the challenge is
    /// denied.
    pub async fn selected_key_pair(&self) -> Result<KeyPair, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        let pointer = session
            .repository
            .get_selected()
            .cloned()
            .ok_or(WalletKitError::SelectionRequired)?;

        if let Some(pair) = session
            .cached_pair
            .as_ref()
            .filter(|pair| pair.address() == pointer.address)
        {
            return Ok(pair.clone());
        }

        let record: PrivateKeyRecord =
            load_record(&*self.store, &keys::private_key_key(&pointer.address))?;
        let pair = KeyPair::from_parts(record.address.clone(), record.private_key.clone());
        session.cached_pair = Some(pair.clone());
        Ok(pair)
    }

    /// The stored seed material of a wallet, for the user-facing backup
    /// flow. Reading it triggers a local authentication challenge.
    ///
    /// # Errors
    ///
    /// Returns an unknown-wallet repository error for a missing wallet
    /// and an authentication-failed store error when the challenge is
    /// denied.
    pub async fn reveal_seed_phrase(&self, wallet_id: &WalletId) -> Result<String, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        if session.repository.list().get(wallet_id).is_none() {
            return Err(RepositoryError::UnknownWallet {
                id: wallet_id.clone(),
            }
            .into());
        }
        let material = self.load_seed_material(wallet_id)?;
        Ok(material.to_stored_string())
    }

    /// A snapshot of the wallet collection.
    ///
    /// # Errors
    ///
    /// Propagates migration and store failures from first-use loading.
    pub async fn wallets(&self) -> Result<WalletCollection, WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        Ok(session.repository.list().clone())
    }

    /// Renames a wallet.
    ///
    /// # Errors
    ///
    /// Returns an unknown-wallet repository error for a missing wallet.
    pub async fn rename_wallet(
        &self,
        wallet_id: &WalletId,
        name: String,
    ) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        session.repository.rename_wallet(wallet_id, name)?;
        Ok(())
    }

    /// Changes a wallet's palette color index.
    ///
    /// # Errors
    ///
    /// Returns an unknown-wallet repository error for a missing wallet.
    pub async fn set_wallet_color(
        &self,
        wallet_id: &WalletId,
        color: u8,
    ) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        session.repository.set_wallet_color(wallet_id, color)?;
        Ok(())
    }

    /// Sets the label of one account.
    ///
    /// # Errors
    ///
    /// Returns repository errors for a missing wallet or non-member
    /// address.
    pub async fn set_account_label(
        &self,
        wallet_id: &WalletId,
        address: &str,
        label: String,
    ) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        session
            .repository
            .set_account_label(wallet_id, address, label)?;
        Ok(())
    }

    /// Shows or hides one account in wallet listings.
    ///
    /// # Errors
    ///
    /// Returns repository errors for a missing wallet or non-member
    /// address.
    pub async fn set_account_visibility(
        &self,
        wallet_id: &WalletId,
        address: &str,
        visible: bool,
    ) -> Result<(), WalletKitError> {
        let mut state = self.state.lock().await;
        let session = self.ensure_session(&mut state)?;
        session
            .repository
            .set_account_visibility(wallet_id, address, visible)?;
        Ok(())
    }

    /// Runs migrations and loads the repository on first use.
    fn ensure_session<'a>(
        &self,
        state: &'a mut Option<Session>,
    ) -> Result<&'a mut Session, WalletKitError> {
        if state.is_none() {
            MigrationRunner::new(&*self.store, self.capabilities).run()?;
            let repository = WalletRepository::load(Arc::clone(&self.store))?;
            return Ok(state.insert(Session {
                repository,
                cached_pair: None,
            }));
        }
        match state.as_mut() {
            Some(session) => Ok(session),
            // Unreachable: populated above for the whole session.
            None => Err(StoreError::unavailable("wallet session not initialized").into()),
        }
    }

    /// Persists a new wallet built from classified material: secrets
    /// first, bookkeeping second, selection last (and only when no
    /// selection exists yet).
    fn create_from_material(
        &self,
        session: &mut Session,
        material: SeedMaterial,
        pair: KeyPair,
        name: Option<&str>,
        color: Option<u8>,
        imported: bool,
    ) -> Result<String, WalletKitError> {
        if session.repository.list().contains_address(pair.address()) {
            return Err(RepositoryError::DuplicateAddress {
                address: pair.address().to_owned(),
            }
            .into());
        }

        let id = WalletId::generate();
        self.save_private_key(&pair)?;
        save_record(
            &*self.store,
            &keys::seed_phrase_key(id.as_str()),
            &SeedPhraseRecord {
                id: id.as_str().to_owned(),
                seed_phrase: material.to_stored_string(),
                version: RECORD_VERSION,
            },
            AccessPolicy::PRIVATE.effective(&self.capabilities),
        )?;
        // A lingering flat seed phrase means some wallet still awaits the
        // lazy re-keying; the done flag would cut off its fallback path.
        if !self.store.contains(SEED_PHRASE_KEY)? {
            self.store
                .save_string(SEED_MIGRATED_KEY, "true", AccessPolicy::PUBLIC)?;
        }

        let kind = match material {
            SeedMaterial::PrivateKey(_) => WalletType::PrivateKey,
            SeedMaterial::Mnemonic(_) => WalletType::Mnemonic,
            SeedMaterial::Seed(_) => WalletType::Seed,
        };
        let default_name = if imported {
            DEFAULT_IMPORT_NAME
        } else {
            DEFAULT_WALLET_NAME
        };
        let wallet = Wallet {
            id: id.clone(),
            name: name.unwrap_or(default_name).to_owned(),
            color: color.unwrap_or(0) % WALLET_COLOR_COUNT,
            kind,
            imported,
            addresses: vec![Account::new(pair.address().to_owned(), 0)],
        };
        session.repository.upsert_wallet(wallet)?;

        if session.repository.get_selected().is_none() {
            session.repository.set_selected(SelectedPointer {
                wallet_id: id.clone(),
                address: pair.address().to_owned(),
            })?;
        }
        info!(wallet_id = %id, address = pair.address(), imported, "created wallet");
        Ok(pair.address().to_owned())
    }

    fn save_private_key(&self, pair: &KeyPair) -> Result<(), WalletKitError> {
        save_record(
            &*self.store,
            &keys::private_key_key(pair.address()),
            &PrivateKeyRecord {
                address: pair.address().to_owned(),
                private_key: pair.private_key().to_owned(),
                version: RECORD_VERSION,
            },
            AccessPolicy::PRIVATE.effective(&self.capabilities),
        )?;
        Ok(())
    }

    /// Loads a wallet's seed material. On a device whose secrets predate
    /// per-wallet keying (migrated flag unset), a missing per-wallet
    /// record falls back to re-keying the flat seed phrase on first
    /// touch; once the flag is set, absence is a real error.
    fn load_seed_material(&self, wallet_id: &WalletId) -> Result<SeedMaterial, WalletKitError> {
        let migrated = match self.store.load_string(SEED_MIGRATED_KEY) {
            Ok(flag) => flag == "true",
            Err(StoreError::NotFound { .. }) => false,
            Err(err) => return Err(err.into()),
        };
        let key = keys::seed_phrase_key(wallet_id.as_str());
        let stored = if migrated {
            load_record::<SeedPhraseRecord>(&*self.store, &key)?
                .seed_phrase
                .clone()
        } else {
            match load_record::<SeedPhraseRecord>(&*self.store, &key) {
                Ok(record) => record.seed_phrase.clone(),
                Err(StoreError::NotFound { .. }) => self.rekey_flat_seed(wallet_id)?,
                Err(err) => return Err(err.into()),
            }
        };
        Ok(SeedMaterial::classify(&stored)?)
    }

    /// The lazy half of the legacy migration: moves the flat seed phrase
    /// under the wallet's own key, regenerates and saves the canonical
    /// index-0 private key, marks the re-keying done, and retires the
    /// flat copies so no secret stays duplicated across storage keys.
    fn rekey_flat_seed(&self, wallet_id: &WalletId) -> Result<String, WalletKitError> {
        let phrase = self.store.load_string(SEED_PHRASE_KEY)?;
        let material = SeedMaterial::classify(&phrase)?;
        let pair = derivation::derive_account(&material, 0)?;

        save_record(
            &*self.store,
            &keys::seed_phrase_key(wallet_id.as_str()),
            &SeedPhraseRecord {
                id: wallet_id.as_str().to_owned(),
                seed_phrase: phrase.clone(),
                version: RECORD_VERSION,
            },
            AccessPolicy::PRIVATE.effective(&self.capabilities),
        )?;
        self.save_private_key(&pair)?;
        self.store
            .save_string(SEED_MIGRATED_KEY, "true", AccessPolicy::PUBLIC)?;

        // The per-wallet keys are canonical from here on.
        self.delete_ignoring_missing(SEED_PHRASE_KEY)?;
        self.delete_ignoring_missing(PRIVATE_KEY_KEY)?;
        self.delete_ignoring_missing(ADDRESS_KEY)?;
        debug!(wallet_id = %wallet_id, "re-keyed legacy flat secrets");
        Ok(phrase)
    }

    fn delete_ignoring_missing(&self, key: &str) -> Result<(), WalletKitError> {
        match self.store.delete(key) {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for WalletKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKit")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
