//! Pure algorithmic layer: mnemonic generation, seed-material
//! classification, and hierarchical-deterministic account derivation.
//!
//! Accounts are derived on the Ethereum-style BIP-44 path
//! `m/44'/60'/0'/0/{index}`. Derivation is deterministic byte-for-byte:
//! the same seed material and index always yield the same address and
//! private key. This determinism is the core correctness property of the
//! whole subsystem.

use alloy_primitives::{keccak256, Address};
use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Entropy for a freshly generated mnemonic: 128 bits, 12 words.
const MNEMONIC_WORD_COUNT: usize = 12;

/// Hex length of a raw secp256k1 private key, without `0x`.
const RAW_PRIVATE_KEY_HEX_LEN: usize = 64;

/// Errors from seed-material classification and account derivation.
#[derive(Debug, Error)]
pub enum DerivationError {
    /// The input is neither a raw private key, a valid mnemonic phrase,
    /// nor hex seed bytes. User input error; recoverable by re-prompting.
    #[error("seed material is not a private key, mnemonic, or seed")]
    InvalidMaterial,

    /// A raw-private-key wallet has exactly one account; derivation
    /// indices past 0 do not exist for it.
    #[error("account index {index} out of range for a private-key wallet")]
    IndexOutOfRange {
        /// The requested index.
        index: u32,
    },

    /// The HD derivation itself failed (e.g. seed bytes outside the
    /// BIP-32 accepted length range).
    #[error("hd derivation failed: {0}")]
    Derivation(String),
}

/// A derived account key pair.
///
/// The private key is hex-encoded with a `0x` prefix and zeroized when the
/// pair is dropped. Signing against a blockchain endpoint is an external
/// concern; this type only hands the material to that primitive.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    address: String,
    private_key: String,
}

impl KeyPair {
    /// The EIP-55 checksummed account address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The `0x`-prefixed hex private key. Funds-controlling secret.
    #[must_use]
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Reassembles a pair from stored parts.
    #[must_use]
    pub fn from_parts(address: String, private_key: String) -> Self {
        Self {
            address,
            private_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private key.
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Classified wallet seed material. Exactly one representation is
/// canonical per wallet.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum SeedMaterial {
    /// A raw 32-byte secp256k1 private key.
    PrivateKey([u8; 32]),
    /// A BIP-39 mnemonic phrase, stored in normalized form.
    Mnemonic(String),
    /// Opaque seed bytes fed directly into BIP-32.
    Seed(Vec<u8>),
}

impl SeedMaterial {
    /// Classifies user-supplied seed material, in priority order:
    /// raw private key (64 hex chars, `0x` optional), then valid BIP-39
    /// mnemonic phrase, then hex seed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DerivationError::InvalidMaterial`] when the input
    /// matches none of the three recognized forms.
    pub fn classify(input: &str) -> Result<Self, DerivationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DerivationError::InvalidMaterial);
        }

        let unprefixed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if unprefixed.len() == RAW_PRIVATE_KEY_HEX_LEN {
            if let Ok(bytes) = hex::decode(unprefixed) {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                // Reject hex strings that are not valid scalars.
                if SigningKey::from_slice(&key).is_ok() {
                    return Ok(Self::PrivateKey(key));
                }
                return Err(DerivationError::InvalidMaterial);
            }
        }

        if let Ok(mnemonic) = Mnemonic::parse_in_normalized(Language::English, trimmed) {
            return Ok(Self::Mnemonic(mnemonic.to_string()));
        }

        if let Ok(seed) = hex::decode(unprefixed) {
            if !seed.is_empty() {
                return Ok(Self::Seed(seed));
            }
        }

        Err(DerivationError::InvalidMaterial)
    }

    /// The canonical string form, as persisted in the secret store.
    #[must_use]
    pub fn to_stored_string(&self) -> String {
        match self {
            Self::PrivateKey(bytes) => format!("0x{}", hex::encode(bytes)),
            Self::Mnemonic(phrase) => phrase.clone(),
            Self::Seed(bytes) => hex::encode(bytes),
        }
    }

    /// Whether this material supports derivation indices past 0.
    #[must_use]
    pub const fn is_hierarchical(&self) -> bool {
        !matches!(self, Self::PrivateKey(_))
    }
}

impl std::fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::PrivateKey(_) => "PrivateKey",
            Self::Mnemonic(_) => "Mnemonic",
            Self::Seed(_) => "Seed",
        };
        f.write_str(kind)
    }
}

/// Generates a fresh 12-word mnemonic from 128 bits of OS entropy.
///
/// # Panics
///
/// Panics if the operating system's random number generator fails, which
/// leaves no safe way to produce key material.
#[must_use]
pub fn generate_mnemonic() -> String {
    Mnemonic::generate_in_with(&mut OsRng, Language::English, MNEMONIC_WORD_COUNT)
        .expect("mnemonic generation from OS entropy")
        .to_string()
}

/// Derives the account key pair at `index` from classified seed material.
///
/// Mnemonic and seed inputs derive on `m/44'/60'/0'/0/{index}`. Raw
/// private keys admit only index 0.
///
/// # Errors
///
/// Returns [`DerivationError::IndexOutOfRange`] for a non-zero index on a
/// raw private key, and [`DerivationError::Derivation`] when BIP-32
/// rejects the seed bytes.
pub fn derive_account(material: &SeedMaterial, index: u32) -> Result<KeyPair, DerivationError> {
    let signing_key = match material {
        SeedMaterial::PrivateKey(bytes) => {
            if index != 0 {
                return Err(DerivationError::IndexOutOfRange { index });
            }
            SigningKey::from_slice(bytes)
                .map_err(|_| DerivationError::InvalidMaterial)?
        }
        SeedMaterial::Mnemonic(phrase) => {
            let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
                .map_err(|_| DerivationError::InvalidMaterial)?;
            let seed = mnemonic.to_seed("");
            derive_from_seed(&seed, index)?
        }
        SeedMaterial::Seed(bytes) => derive_from_seed(bytes, index)?,
    };
    Ok(key_pair_from_signing_key(&signing_key))
}

/// Classifies `input` and derives its first account (index 0).
///
/// This is the import path: private key, mnemonic, and seed inputs all
/// resolve to the wallet's canonical account here.
///
/// # Errors
///
/// Propagates classification and derivation failures.
pub fn wallet_from_seed_material(input: &str) -> Result<(SeedMaterial, KeyPair), DerivationError> {
    let material = SeedMaterial::classify(input)?;
    let pair = derive_account(&material, 0)?;
    Ok((material, pair))
}

fn derive_from_seed(seed: &[u8], index: u32) -> Result<SigningKey, DerivationError> {
    let path: DerivationPath = format!("m/44'/60'/0'/0/{index}")
        .parse()
        .map_err(|_| DerivationError::Derivation("invalid derivation path".to_owned()))?;
    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|err| DerivationError::Derivation(err.to_string()))?;
    Ok(xprv.private_key().clone())
}

fn key_pair_from_signing_key(signing_key: &SigningKey) -> KeyPair {
    let public = signing_key.verifying_key().to_encoded_point(false);
    // Ethereum address: low 20 bytes of keccak256 over the uncompressed
    // public key without the 0x04 tag.
    let digest = keccak256(&public.as_bytes()[1..]);
    let address = Address::from_slice(&digest[12..]);
    KeyPair {
        address: address.to_checksum(None),
        private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
    }
}
