//! Core deterministic primitives.
//!
//! Exact money, reproducible randomness, and hashing. Nothing in here knows
//! about sessions or wheels.

pub mod money;
pub mod rng;
pub mod hash;

// Re-export core types
pub use money::Money;
pub use rng::{DeterministicRng, RandomSource, SeedSource, OsEntropy};
pub use hash::{Digest32, LedgerHasher};
