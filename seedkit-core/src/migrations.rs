//! Ordered, idempotent, versioned storage migrations.
//!
//! On every cold start the [`MigrationRunner`] runs before the wallet
//! repository is trusted. It reads the persisted migration state (the
//! highest fully-applied step index, 0 when absent), applies the
//! remaining steps in strictly ascending order, and persists the new
//! state after each step. Every step is safe to re-run: a crash between
//! applying a step and persisting the state must not corrupt or
//! duplicate data on retry.
//!
//! Legacy storage layouts are modeled here as snapshot types and consumed
//! by exactly one step each; the rest of the system only ever sees the
//! current schema.

use serde::{Deserialize, Serialize};
use seedkit_secure_store::{
    load_record, save_record, AccessPolicy, DeviceCapabilities, SecretStore, StoreError,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::derivation::{self, DerivationError, SeedMaterial};
use crate::keys::{
    self, AllWalletsRecord, PrivateKeyRecord, SeedPhraseRecord, SelectedWalletRecord,
    ADDRESS_KEY, ALL_WALLETS_KEY, MIGRATION_VERSION_KEY, PROFILES_KEY, RECORD_VERSION,
    SEED_MIGRATED_KEY, SEED_PHRASE_KEY, SELECTED_WALLET_KEY,
};
use crate::types::{
    Account, SelectedPointer, Wallet, WalletCollection, WalletId, WalletType,
    WALLET_COLOR_COUNT,
};

/// Failure of a single migration step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The secret store failed mid-step.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Legacy key material could not be re-derived.
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    /// A legacy record did not have the expected shape.
    #[error("corrupt legacy record: {0}")]
    CorruptRecord(String),
}

/// Errors from the migration run. Any step failure is fatal to startup:
/// the application must not proceed with secrets in an inconsistent
/// intermediate state.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A step failed; the persisted state still names this step as the
    /// next one to run.
    #[error("migration step {index} ({name}) failed: {source}")]
    Step {
        /// Index of the failing step.
        index: u32,
        /// Name of the failing step.
        name: &'static str,
        /// The underlying failure.
        #[source]
        source: StepError,
    },

    /// The persisted migration state is not a decimal integer.
    #[error("stored migration state is not an integer: {0}")]
    CorruptState(String),

    /// Reading or persisting the migration state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct MigrationContext<'a> {
    store: &'a dyn SecretStore,
    capabilities: DeviceCapabilities,
}

struct MigrationStep {
    name: &'static str,
    apply: fn(&MigrationContext<'_>) -> Result<(), StepError>,
}

/// The registered migrations, in application order. A step must never be
/// renumbered or removed once it has shipped; new steps are appended.
const STEPS: &[MigrationStep] = &[
    MigrationStep {
        name: "public_address_policy",
        apply: migrate_address_policy,
    },
    MigrationStep {
        name: "single_wallet_collection",
        apply: migrate_single_wallet,
    },
    MigrationStep {
        name: "profiles_to_wallets",
        apply: migrate_profiles,
    },
];

/// Runs the registered migrations against a secret store.
pub struct MigrationRunner<'a> {
    store: &'a dyn SecretStore,
    capabilities: DeviceCapabilities,
}

impl<'a> MigrationRunner<'a> {
    /// Creates a runner over `store`.
    #[must_use]
    pub const fn new(store: &'a dyn SecretStore, capabilities: DeviceCapabilities) -> Self {
        Self {
            store,
            capabilities,
        }
    }

    /// Number of registered migration steps; the terminal state value.
    #[must_use]
    pub const fn step_count() -> u32 {
        STEPS.len() as u32
    }

    /// Applies all outstanding migrations.
    ///
    /// The common case (state already terminal) returns without running
    /// any step. On a step failure the state is not advanced past that
    /// step and the run fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Step`] wrapping the first failing step,
    /// or a state read/write failure.
    pub fn run(&self) -> Result<(), MigrationError> {
        let current = self.read_state()?;
        let total = Self::step_count();

        if current >= total {
            if current > total {
                // State written by a newer app version; nothing this
                // binary can or should do about it.
                warn!(current, total, "migration state ahead of registered steps");
            }
            debug!("migrations up to date, nothing to run");
            return Ok(());
        }

        info!(current, total, "running storage migrations");
        let context = MigrationContext {
            store: self.store,
            capabilities: self.capabilities,
        };
        for index in current..total {
            let step = &STEPS[index as usize];
            info!(index, name = step.name, "applying migration step");
            (step.apply)(&context).map_err(|source| MigrationError::Step {
                index,
                name: step.name,
                source,
            })?;
            self.write_state(index + 1)?;
            info!(index, name = step.name, "migration step completed");
        }
        Ok(())
    }

    fn read_state(&self) -> Result<u32, MigrationError> {
        match self.store.load_string(MIGRATION_VERSION_KEY) {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| MigrationError::CorruptState(raw)),
            Err(StoreError::NotFound { .. }) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn write_state(&self, state: u32) -> Result<(), MigrationError> {
        self.store
            .save_string(MIGRATION_VERSION_KEY, &state.to_string(), AccessPolicy::PUBLIC)?;
        Ok(())
    }
}

impl std::fmt::Debug for MigrationRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner").finish_non_exhaustive()
    }
}

/// One entry of the legacy flat profiles table: no HD derivation, one
/// address per profile, secrets inline.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct LegacyProfile {
    name: String,
    color: u8,
    address: String,
    private_key: String,
    seed_phrase: Option<String>,
}

/// Step 0: addresses are public, not secret. Re-save the legacy flat
/// address under a policy with no user-presence requirement so reading it
/// never triggers an authentication prompt.
fn migrate_address_policy(context: &MigrationContext<'_>) -> Result<(), StepError> {
    match context.store.load_string(ADDRESS_KEY) {
        Ok(address) => {
            context
                .store
                .save_string(ADDRESS_KEY, &address, AccessPolicy::PUBLIC)?;
            Ok(())
        }
        Err(StoreError::NotFound { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Step 1: synthesize a wallet collection from the legacy single-wallet
/// flat layout (bare address/seed/privateKey keys) and select it. The
/// flat secrets stay in place; they are re-keyed per wallet lazily by the
/// account-derivation shim or eagerly by step 2.
fn migrate_single_wallet(context: &MigrationContext<'_>) -> Result<(), StepError> {
    if context.store.contains(ALL_WALLETS_KEY)? {
        return Ok(());
    }
    let address = match context.store.load_string(ADDRESS_KEY) {
        Ok(address) => address,
        // Fresh device; the lifecycle creates the first wallet.
        Err(StoreError::NotFound { .. }) => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let kind = match context.store.load_string(SEED_PHRASE_KEY) {
        Ok(stored_seed) => match SeedMaterial::classify(&stored_seed)? {
            SeedMaterial::PrivateKey(_) => WalletType::PrivateKey,
            SeedMaterial::Mnemonic(_) => WalletType::Mnemonic,
            SeedMaterial::Seed(_) => WalletType::Seed,
        },
        Err(StoreError::NotFound { .. }) => WalletType::PrivateKey,
        Err(err) => return Err(err.into()),
    };

    let wallet = Wallet {
        id: WalletId::generate(),
        name: "My Wallet".to_owned(),
        color: 0,
        kind,
        imported: false,
        addresses: vec![Account::new(address.clone(), 0)],
    };
    let pointer = SelectedPointer {
        wallet_id: wallet.id.clone(),
        address,
    };

    let mut wallets = WalletCollection::new();
    wallets.insert(wallet);
    save_record(
        context.store,
        ALL_WALLETS_KEY,
        &AllWalletsRecord {
            version: RECORD_VERSION,
            wallets,
        },
        AccessPolicy::PUBLIC,
    )?;
    save_record(
        context.store,
        SELECTED_WALLET_KEY,
        &SelectedWalletRecord {
            version: RECORD_VERSION,
            selected: pointer,
        },
        AccessPolicy::PUBLIC,
    )?;
    Ok(())
}

/// Step 2: migrate the legacy flat profiles table to per-wallet keying.
/// Each profile's canonical account is regenerated at derivation index 0
/// from its seed phrase; secrets are re-saved under the per-wallet
/// scheme, and the migration flag is set so account derivation skips the
/// lazy shim. The profiles record is deleted only after everything else
/// is durably written.
fn migrate_profiles(context: &MigrationContext<'_>) -> Result<(), StepError> {
    let profiles: Vec<LegacyProfile> = match load_record(context.store, PROFILES_KEY) {
        Ok(profiles) => profiles,
        Err(StoreError::NotFound { .. }) => return Ok(()),
        Err(StoreError::Serialization(message)) => {
            return Err(StepError::CorruptRecord(message));
        }
        Err(err) => return Err(err.into()),
    };

    let mut wallets = match load_record::<AllWalletsRecord>(context.store, ALL_WALLETS_KEY) {
        Ok(record) => record.wallets,
        Err(StoreError::NotFound { .. }) => WalletCollection::new(),
        Err(err) => return Err(err.into()),
    };
    let private_policy = AccessPolicy::PRIVATE.effective(&context.capabilities);

    for profile in &profiles {
        let material_input = profile
            .seed_phrase
            .as_deref()
            .unwrap_or(profile.private_key.as_str());
        let material = SeedMaterial::classify(material_input)?;
        let pair = derivation::derive_account(&material, 0)?;

        // Already in the collection: a crash replay, or a wallet the
        // single-wallet step synthesized from the same flat secrets.
        // Make sure its per-wallet secrets exist, then move on.
        if let Some(owner) = wallets.owner_of(pair.address()) {
            let seed_key = keys::seed_phrase_key(owner.id.as_str());
            if !context.store.contains(&seed_key)? {
                save_record(
                    context.store,
                    &seed_key,
                    &SeedPhraseRecord {
                        id: owner.id.as_str().to_owned(),
                        seed_phrase: material.to_stored_string(),
                        version: RECORD_VERSION,
                    },
                    private_policy,
                )?;
            }
            let pk_key = keys::private_key_key(pair.address());
            if !context.store.contains(&pk_key)? {
                save_record(
                    context.store,
                    &pk_key,
                    &PrivateKeyRecord {
                        address: pair.address().to_owned(),
                        private_key: pair.private_key().to_owned(),
                        version: RECORD_VERSION,
                    },
                    private_policy,
                )?;
            }
            continue;
        }

        let id = WalletId::generate();
        save_record(
            context.store,
            &keys::private_key_key(pair.address()),
            &PrivateKeyRecord {
                address: pair.address().to_owned(),
                private_key: pair.private_key().to_owned(),
                version: RECORD_VERSION,
            },
            private_policy,
        )?;
        save_record(
            context.store,
            &keys::seed_phrase_key(id.as_str()),
            &SeedPhraseRecord {
                id: id.as_str().to_owned(),
                seed_phrase: material.to_stored_string(),
                version: RECORD_VERSION,
            },
            private_policy,
        )?;

        let kind = match material {
            SeedMaterial::PrivateKey(_) => WalletType::PrivateKey,
            SeedMaterial::Mnemonic(_) => WalletType::Mnemonic,
            SeedMaterial::Seed(_) => WalletType::Seed,
        };
        wallets.insert(Wallet {
            id,
            name: profile.name.clone(),
            color: profile.color % WALLET_COLOR_COUNT,
            kind,
            imported: false,
            addresses: vec![Account::new(pair.address().to_owned(), 0)],
        });
    }

    save_record(
        context.store,
        ALL_WALLETS_KEY,
        &AllWalletsRecord {
            version: RECORD_VERSION,
            wallets: wallets.clone(),
        },
        AccessPolicy::PUBLIC,
    )?;
    context
        .store
        .save_string(SEED_MIGRATED_KEY, "true", AccessPolicy::PUBLIC)?;

    if !context.store.contains(SELECTED_WALLET_KEY)? {
        if let Some(first) = wallets.first() {
            save_record(
                context.store,
                SELECTED_WALLET_KEY,
                &SelectedWalletRecord {
                    version: RECORD_VERSION,
                    selected: SelectedPointer {
                        wallet_id: first.id.clone(),
                        address: first.addresses[0].address.clone(),
                    },
                },
                AccessPolicy::PUBLIC,
            )?;
        }
    }

    // Secrets must never stay duplicated across storage keys; drop the
    // legacy table last so a crash above replays the step harmlessly.
    match context.store.delete(PROFILES_KEY) {
        Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
