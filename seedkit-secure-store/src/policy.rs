//! Access-control policies for stored secrets.

/// Access-control options for a stored secret.
///
/// Mirrors the platform keychain options the policies compile down to:
/// a user-presence requirement (biometric or device passcode challenge on
/// read) and device-local accessibility (never synced or restored onto
/// another device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    /// Reads require a successful local authentication challenge.
    pub require_user_presence: bool,
    /// The secret is only accessible while the device is unlocked and is
    /// never migrated to another device.
    pub when_unlocked_this_device_only: bool,
}

impl AccessPolicy {
    /// Policy for non-secret, device-local values (addresses, indexes,
    /// bookkeeping records). No authentication challenge on read.
    pub const PUBLIC: Self = Self {
        require_user_presence: false,
        when_unlocked_this_device_only: true,
    };

    /// Policy for funds-controlling secrets (seed phrases, private keys).
    pub const PRIVATE: Self = Self {
        require_user_presence: true,
        when_unlocked_this_device_only: true,
    };

    /// Resolves the policy against the capabilities of the current device.
    ///
    /// A device with no authentication capability, or a simulator, cannot
    /// satisfy a user-presence requirement; the requirement is dropped
    /// there. This is a deliberate policy branch, not a silent fallback:
    /// callers always go through this method before saving private
    /// material.
    #[must_use]
    pub const fn effective(self, device: &DeviceCapabilities) -> Self {
        if device.can_authenticate && !device.is_simulator {
            self
        } else {
            Self {
                require_user_presence: false,
                when_unlocked_this_device_only: self.when_unlocked_this_device_only,
            }
        }
    }
}

/// Authentication capabilities of the device the store runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// The device can present a biometric or passcode challenge.
    pub can_authenticate: bool,
    /// The process runs in a simulator with no secure enclave.
    pub is_simulator: bool,
}

impl DeviceCapabilities {
    /// A physical device with a working authentication facility.
    #[must_use]
    pub const fn secure_device() -> Self {
        Self {
            can_authenticate: true,
            is_simulator: false,
        }
    }

    /// A simulator or other environment with no secure enclave.
    #[must_use]
    pub const fn simulator() -> Self {
        Self {
            can_authenticate: false,
            is_simulator: true,
        }
    }
}
