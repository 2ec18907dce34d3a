//! Secure on-device secret storage for seedkit.
//!
//! This crate defines the [`SecretStore`] trait: a thin, named-secret
//! abstraction over a platform secure-storage facility (iOS Keychain,
//! Android Keystore, or an in-memory stand-in for tests and simulators).
//!
//! Values are either opaque strings or structured JSON records. Structured
//! records carry an explicit `version` field so callers can detect stale
//! formats without running a full migration.
//!
//! Platform implementations should back this trait with hardware-protected
//! storage where available. [`MemoryStore`] is provided for tests and for
//! environments with no secure enclave.

use serde::{de::DeserializeOwned, Serialize};

mod error;
mod memory;
mod policy;

pub use error::{StoreError, StoreResult};
pub use memory::{AuthenticationGate, MemorySnapshot, MemoryStore};
pub use policy::{AccessPolicy, DeviceCapabilities};

/// Named secret storage under platform access-control policies.
///
/// A secret saved with [`AccessPolicy::require_user_presence`] can only be
/// read back after a successful local authentication challenge (biometric or
/// device passcode). Implementations must surface a dismissed or failed
/// prompt as [`StoreError::AuthenticationFailed`] and leave all durable
/// state exactly as it was before the call.
pub trait SecretStore: Send + Sync {
    /// Stores `value` under `key` with the given access policy, replacing
    /// any previous value (and its policy).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing facility cannot
    /// be reached.
    fn save_string(&self, key: &str, value: &str, policy: AccessPolicy) -> StoreResult<()>;

    /// Loads the value stored under `key`, performing a local
    /// authentication challenge first when the stored policy requires
    /// user presence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no value exists under `key`,
    /// [`StoreError::AuthenticationFailed`] when the challenge is denied
    /// or cancelled, and [`StoreError::Unavailable`] when the backing
    /// facility cannot be reached.
    fn load_string(&self, key: &str) -> StoreResult<String>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no value exists under `key`.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Returns whether a value exists under `key`, without triggering an
    /// authentication challenge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backing facility cannot
    /// be reached.
    fn contains(&self, key: &str) -> StoreResult<bool>;
}

/// Stores a structured record under `key` as a JSON object.
///
/// Record types are expected to carry an explicit `version` field.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the record cannot be encoded,
/// otherwise propagates errors from [`SecretStore::save_string`].
pub fn save_record<T: Serialize>(
    store: &dyn SecretStore,
    key: &str,
    record: &T,
    policy: AccessPolicy,
) -> StoreResult<()> {
    let json = serde_json::to_string(record)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;
    store.save_string(key, &json, policy)
}

/// Loads a structured record stored under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the stored value is not a valid
/// encoding of `T`, otherwise propagates errors from
/// [`SecretStore::load_string`].
pub fn load_record<T: DeserializeOwned>(store: &dyn SecretStore, key: &str) -> StoreResult<T> {
    let json = store.load_string(key)?;
    serde_json::from_str(&json).map_err(|err| StoreError::Serialization(err.to_string()))
}
