//! Hashing for Config Identity and the Spin Ledger
//!
//! Provides deterministic SHA-256 hashing with domain separation for:
//! - Identifying the exact wheel configuration a spin ran against
//! - Chaining spin records so history cannot be rewritten silently

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type Digest32 = [u8; 32];

/// All-zero hash, used as the predecessor of the first spin record.
pub const ZERO_HASH: Digest32 = [0u8; 32];

/// Domain separator for wheel configuration hashes.
pub const CONFIG_DOMAIN: &[u8] = b"SPINSERVE_CONFIG_V1";

/// Domain separator for spin record hashes.
pub const SPIN_DOMAIN: &[u8] = b"SPINSERVE_SPIN_V1";

/// Deterministic hasher.
///
/// Wraps SHA-256 with length-prefixed helpers so that adjacent variable-size
/// fields cannot be confused. Order of updates is part of the format.
pub struct LedgerHasher {
    hasher: Sha256,
}

impl LedgerHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for a wheel configuration.
    pub fn for_config() -> Self {
        Self::new(CONFIG_DOMAIN)
    }

    /// Create hasher for a spin record.
    pub fn for_spin() -> Self {
        Self::new(SPIN_DOMAIN)
    }

    /// Update with raw bytes (fixed-size fields only).
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with an optional u64 (presence flag first).
    #[inline]
    pub fn update_opt_u64(&mut self, value: Option<u64>) {
        match value {
            Some(v) => {
                self.update_bool(true);
                self.update_u64(v);
            }
            None => self.update_bool(false),
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Digest32 {
        self.hasher.finalize().into()
    }
}

/// Short hex prefix of an id or hash, for log lines.
pub fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(4)])
}

// =============================================================================
// TESTS
// =============================================================================
