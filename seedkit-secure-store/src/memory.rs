//! In-memory [`SecretStore`] implementation for tests and simulators.
//!
//! This implementation provides no real confidentiality. It exists to test
//! the wallet core's interaction with a secret store, including denied
//! authentication prompts and simulated process restarts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use zeroize::Zeroize;

use crate::{AccessPolicy, SecretStore, StoreError, StoreResult};

/// Decides the outcome of a local authentication challenge.
///
/// Production stores delegate to the platform's biometric/passcode prompt;
/// tests plug in a gate that allows or denies deterministically.
pub trait AuthenticationGate: Send + Sync {
    /// Returns whether the challenge succeeded.
    fn authenticate(&self) -> bool;
}

/// Gate that accepts every challenge.
struct AlwaysAllow;

impl AuthenticationGate for AlwaysAllow {
    fn authenticate(&self) -> bool {
        true
    }
}

#[derive(Clone)]
struct StoredEntry {
    value: String,
    policy: AccessPolicy,
}

impl Drop for StoredEntry {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// A point-in-time copy of a [`MemoryStore`]'s contents, used to simulate
/// a process restart in tests.
pub struct MemorySnapshot {
    entries: HashMap<String, StoredEntry>,
}

/// In-memory secret store. **FOR TESTING ONLY** — values live in process
/// memory with no encryption; secrets are merely zeroized on drop.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    gate: Arc<dyn AuthenticationGate>,
}

impl MemoryStore {
    /// Creates an empty store whose authentication prompts always succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_gate(Arc::new(AlwaysAllow))
    }

    /// Creates an empty store with a custom authentication gate.
    #[must_use]
    pub fn with_gate(gate: Arc<dyn AuthenticationGate>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gate,
        }
    }

    /// Restores a store from a snapshot, simulating a process restart.
    #[must_use]
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            entries: RwLock::new(snapshot.entries),
            gate: Arc::new(AlwaysAllow),
        }
    }

    /// Restores a store from a snapshot with a custom authentication
    /// gate, simulating a restart on a device that now denies prompts.
    #[must_use]
    pub fn from_snapshot_with_gate(
        snapshot: MemorySnapshot,
        gate: Arc<dyn AuthenticationGate>,
    ) -> Self {
        Self {
            entries: RwLock::new(snapshot.entries),
            gate,
        }
    }

    /// Captures the current contents for a later
    /// [`from_snapshot`](Self::from_snapshot).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store's lock is poisoned.
    pub fn snapshot(&self) -> StoreResult<MemorySnapshot> {
        let entries = self.read_entries()?;
        Ok(MemorySnapshot {
            entries: entries.clone(),
        })
    }

    fn read_entries(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries
            .read()
            .map_err(|_| StoreError::unavailable("store lock poisoned"))
    }

    fn write_entries(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries
            .write()
            .map_err(|_| StoreError::unavailable("store lock poisoned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemoryStore {
    fn save_string(&self, key: &str, value: &str, policy: AccessPolicy) -> StoreResult<()> {
        let mut entries = self.write_entries()?;
        entries.insert(
            key.to_owned(),
            StoredEntry {
                value: value.to_owned(),
                policy,
            },
        );
        Ok(())
    }

    fn load_string(&self, key: &str) -> StoreResult<String> {
        let entries = self.read_entries()?;
        let entry = entries.get(key).ok_or_else(|| StoreError::not_found(key))?;
        if entry.policy.require_user_presence && !self.gate.authenticate() {
            return Err(StoreError::AuthenticationFailed);
        }
        Ok(entry.value.clone())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.write_entries()?;
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(key))
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read_entries()?.contains_key(key))
    }
}
