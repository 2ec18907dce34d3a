//! End-to-end lifecycle flows against the in-memory secret store,
//! including cold starts over legacy storage layouts and simulated
//! process restarts.

use std::sync::Arc;

use seedkit_core::keys::{
    self, ADDRESS_KEY, PRIVATE_KEY_KEY, PROFILES_KEY, SEED_MIGRATED_KEY, SEED_PHRASE_KEY,
};
use seedkit_core::{
    RepositoryError, WalletKit, WalletKitError, WalletType,
};
use seedkit_secure_store::{
    AccessPolicy, AuthenticationGate, DeviceCapabilities, MemoryStore, SecretStore, StoreError,
};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const TEST_ADDRESS_0: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

fn kit_over(store: Arc<MemoryStore>) -> WalletKit {
    WalletKit::new(store as Arc<dyn SecretStore>, DeviceCapabilities::simulator())
}

#[tokio::test]
async fn test_fresh_device_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let kit = kit_over(Arc::clone(&store));

    let address = kit.initialize(None, None, None).await.expect("initialize");

    let wallets = kit.wallets().await.expect("wallets");
    assert_eq!(wallets.len(), 1);
    let wallet = wallets.first().expect("wallet");
    assert_eq!(wallet.name, "My Wallet");
    assert_eq!(wallet.kind, WalletType::Mnemonic);
    assert_eq!(wallet.addresses[0].index, 0);
    assert_eq!(kit.get_selected().await.expect("selected").address, address);

    // Secrets landed under the per-wallet scheme; no legacy flat keys
    // are ever written for a wallet born on the current layout.
    assert!(store
        .contains(&keys::private_key_key(&address))
        .expect("contains"));
    assert!(store
        .contains(&keys::seed_phrase_key(wallet.id.as_str()))
        .expect("contains"));
    assert!(!store.contains(ADDRESS_KEY).expect("contains"));
    assert!(!store.contains(SEED_PHRASE_KEY).expect("contains"));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let store = Arc::new(MemoryStore::new());
    let address = {
        let kit = kit_over(Arc::clone(&store));
        let address = kit
            .initialize(Some(TEST_MNEMONIC), Some("Main"), Some(2))
            .await
            .expect("initialize");
        let wallet_id = kit.get_selected().await.expect("selected").wallet_id;
        kit.add_account(&wallet_id).await.expect("add");
        address
    };
    let snapshot = store.snapshot().expect("snapshot");
    drop(store);

    let kit = kit_over(Arc::new(MemoryStore::from_snapshot(snapshot)));
    let wallets = kit.wallets().await.expect("wallets");
    let wallet = wallets.first().expect("wallet");
    assert_eq!(wallet.name, "Main");
    assert_eq!(wallet.color, 2);
    assert_eq!(wallet.addresses.len(), 2);
    assert_eq!(kit.get_selected().await.expect("selected").address, address);
    assert_eq!(address, TEST_ADDRESS_0);
}

#[tokio::test]
async fn test_legacy_flat_layout_migrates_on_cold_start() {
    let store = Arc::new(MemoryStore::new());
    // Single-wallet era: bare address and seed phrase keys, no collection.
    store
        .save_string(ADDRESS_KEY, TEST_ADDRESS_0, AccessPolicy::PRIVATE)
        .expect("seed address");
    store
        .save_string(SEED_PHRASE_KEY, TEST_MNEMONIC, AccessPolicy::PRIVATE)
        .expect("seed phrase");

    let kit = kit_over(Arc::clone(&store));
    let address = kit.initialize(None, None, None).await.expect("initialize");
    assert_eq!(address, TEST_ADDRESS_0);

    let wallets = kit.wallets().await.expect("wallets");
    assert_eq!(wallets.len(), 1);
    let wallet = wallets.first().expect("wallet");
    assert_eq!(wallet.name, "My Wallet");
    assert_eq!(wallet.kind, WalletType::Mnemonic);
    assert_eq!(wallet.addresses[0].address, TEST_ADDRESS_0);

    // Deriving the next account re-keys the flat secrets lazily.
    let second = kit.add_account(&wallet.id).await.expect("add");
    assert_ne!(second, TEST_ADDRESS_0);
    assert!(store
        .contains(&keys::seed_phrase_key(wallet.id.as_str()))
        .expect("contains"));
    assert_eq!(
        store.load_string(SEED_MIGRATED_KEY).expect("flag"),
        "true"
    );

    // The canonical index-0 private key is immediately usable.
    let pair = kit.selected_key_pair().await.expect("pair");
    assert_eq!(pair.address(), TEST_ADDRESS_0);
    assert!(store
        .contains(&keys::private_key_key(TEST_ADDRESS_0))
        .expect("contains"));

    // The flat copies are retired; the phrase lives under exactly one key.
    assert!(!store.contains(SEED_PHRASE_KEY).expect("contains"));
    assert!(!store.contains(PRIVATE_KEY_KEY).expect("contains"));
    assert!(!store.contains(ADDRESS_KEY).expect("contains"));
}

#[tokio::test]
async fn test_deleting_legacy_wallet_purges_flat_secrets() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_string(ADDRESS_KEY, TEST_ADDRESS_0, AccessPolicy::PRIVATE)
        .expect("seed address");
    store
        .save_string(SEED_PHRASE_KEY, TEST_MNEMONIC, AccessPolicy::PRIVATE)
        .expect("seed phrase");

    let kit = kit_over(Arc::clone(&store));
    kit.initialize(None, None, None).await.expect("initialize");
    let wallet_id = kit.get_selected().await.expect("selected").wallet_id;

    // Deleted before any derivation ever re-keys the flat secrets.
    kit.delete_wallet(&wallet_id).await.expect("delete");

    assert!(!store.contains(SEED_PHRASE_KEY).expect("contains"));
    assert!(!store.contains(PRIVATE_KEY_KEY).expect("contains"));
    assert!(!store.contains(ADDRESS_KEY).expect("contains"));
    assert!(kit.wallets().await.expect("wallets").is_empty());
}

#[tokio::test]
async fn test_legacy_profiles_migrate_on_cold_start() {
    let store = Arc::new(MemoryStore::new());
    let profiles = format!(
        "[{{\"name\":\"Old Profile\",\"color\":3,\"address\":\"{}\",\
         \"private_key\":\"\",\"seed_phrase\":\"{TEST_MNEMONIC}\"}}]",
        TEST_ADDRESS_0.to_lowercase()
    );
    store
        .save_string(PROFILES_KEY, &profiles, AccessPolicy::PRIVATE)
        .expect("seed profiles");

    let kit = kit_over(Arc::clone(&store));
    let address = kit.initialize(None, None, None).await.expect("initialize");
    // Canonical account regenerated at index 0, checksummed.
    assert_eq!(address, TEST_ADDRESS_0);

    let wallets = kit.wallets().await.expect("wallets");
    let wallet = wallets.first().expect("wallet");
    assert_eq!(wallet.name, "Old Profile");
    assert_eq!(wallet.color, 3);
    assert!(!store.contains(PROFILES_KEY).expect("contains"));

    // The migrated wallet is fully operational.
    kit.add_account(&wallet.id).await.expect("add");
    let pair = kit.selected_key_pair().await.expect("pair");
    assert_eq!(pair.address(), TEST_ADDRESS_0);
}

#[tokio::test]
async fn test_migrations_idempotent_across_restarts() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_string(ADDRESS_KEY, TEST_ADDRESS_0, AccessPolicy::PRIVATE)
        .expect("seed address");
    store
        .save_string(SEED_PHRASE_KEY, TEST_MNEMONIC, AccessPolicy::PRIVATE)
        .expect("seed phrase");

    let kit = kit_over(Arc::clone(&store));
    kit.initialize(None, None, None).await.expect("first start");
    let snapshot = store.snapshot().expect("snapshot");
    drop(store);

    // Second cold start over the already-migrated layout.
    let kit = kit_over(Arc::new(MemoryStore::from_snapshot(snapshot)));
    kit.initialize(None, None, None).await.expect("second start");
    assert_eq!(kit.wallets().await.expect("wallets").len(), 1);
}

#[tokio::test]
async fn test_delete_selected_wallet_purges_and_blocks() {
    let store = Arc::new(MemoryStore::new());
    let kit = kit_over(Arc::clone(&store));

    let first = kit
        .initialize(Some(TEST_MNEMONIC), None, None)
        .await
        .expect("initialize");
    let second = kit.create_wallet(None, None).await.expect("create");
    let first_id = kit.get_selected().await.expect("selected").wallet_id;

    kit.delete_wallet(&first_id).await.expect("delete");

    assert!(!store
        .contains(&keys::private_key_key(&first))
        .expect("contains"));
    assert!(!store
        .contains(&keys::seed_phrase_key(first_id.as_str()))
        .expect("contains"));
    assert!(matches!(
        kit.get_selected().await,
        Err(WalletKitError::SelectionRequired)
    ));

    // The other wallet is intact and selectable.
    kit.select_wallet(&second).await.expect("select");
    assert_eq!(kit.get_selected().await.expect("selected").address, second);
}

#[tokio::test]
async fn test_duplicate_import_leaves_store_clean() {
    let store = Arc::new(MemoryStore::new());
    let kit = kit_over(Arc::clone(&store));

    kit.import_wallet(TEST_MNEMONIC, None, None)
        .await
        .expect("import");
    let result = kit.import_wallet(TEST_MNEMONIC, None, None).await;
    assert!(matches!(
        result,
        Err(WalletKitError::Repository(
            RepositoryError::DuplicateAddress { .. }
        ))
    ));
    assert_eq!(kit.wallets().await.expect("wallets").len(), 1);
}

struct DenyAll;

impl AuthenticationGate for DenyAll {
    fn authenticate(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_denied_authentication_surfaces_and_preserves_state() {
    // Build the wallet with prompts allowed, then restart behind a gate
    // that denies every challenge.
    let store = Arc::new(MemoryStore::new());
    let kit = WalletKit::new(
        Arc::clone(&store) as Arc<dyn SecretStore>,
        DeviceCapabilities::secure_device(),
    );
    kit.initialize(Some(TEST_MNEMONIC), None, None)
        .await
        .expect("initialize");
    let snapshot = store.snapshot().expect("snapshot");
    drop(store);

    let store = Arc::new(MemoryStore::from_snapshot_with_gate(
        snapshot,
        Arc::new(DenyAll),
    ));
    let kit = WalletKit::new(
        Arc::clone(&store) as Arc<dyn SecretStore>,
        DeviceCapabilities::secure_device(),
    );

    // Bookkeeping stays readable without a challenge.
    let wallets = kit.wallets().await.expect("wallets");
    assert_eq!(wallets.len(), 1);
    let selected = kit.get_selected().await.expect("selected");
    assert_eq!(selected.address, TEST_ADDRESS_0);

    // The secret itself does not come out.
    assert!(matches!(
        kit.selected_key_pair().await,
        Err(WalletKitError::Store(StoreError::AuthenticationFailed))
    ));
}
