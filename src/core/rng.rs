//! Random Sources for Wheel Draws
//!
//! Every spin consumes exactly one uniform integer from a [`RandomSource`].
//!
//! - [`DeterministicRng`] - Xorshift128+ seeded through SplitMix64. Given the
//!   same seed it yields the same draws on every platform, which is what makes
//!   a recorded spin replayable.
//! - [`OsEntropy`] - the operating system CSPRNG. Production spins take a fresh
//!   seed from here, so outcomes cannot be predicted by the client.
//! - [`ScriptedDraws`] - a fixed list of draws for tests and replays.

use std::collections::VecDeque;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Serialize, Deserialize};

/// A source of uniformly distributed integers.
pub trait RandomSource {
    /// Next raw 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Uniform integer in `[0, bound)`.
    ///
    /// Uses rejection sampling so every value is equally likely regardless of
    /// `bound`. Returns 0 when `bound` is 0.
    fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let bound = bound as u64;
        // Values under `threshold` would over-represent the low residues.
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let value = self.next_u64();
            if value >= threshold {
                return (value % bound) as u32;
            }
        }
    }
}

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use spinserve::core::rng::DeterministicRng;
/// use spinserve::core::rng::RandomSource;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }
}

impl RandomSource for DeterministicRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// SEED SOURCES
// =============================================================================

/// Where the engine gets the seed for each production spin.
pub trait SeedSource: Send + Sync {
    /// A fresh seed. Must not be predictable by diners.
    fn next_seed(&self) -> u64;
}

/// Operating-system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl SeedSource for OsEntropy {
    fn next_seed(&self) -> u64 {
        OsRng.next_u64()
    }
}

impl RandomSource for OsEntropy {
    fn next_u64(&mut self) -> u64 {
        OsRng.next_u64()
    }
}

/// Always hands out the same seed. Test and replay use only.
#[derive(Clone, Copy, Debug)]
pub struct FixedSeed(pub u64);

impl SeedSource for FixedSeed {
    fn next_seed(&self) -> u64 {
        self.0
    }
}

// =============================================================================
// SCRIPTED DRAWS
// =============================================================================

/// Replays a fixed sequence of draws.
///
/// `next_below` returns the scripted value reduced modulo `bound`, so a script
/// of `[70]` makes the next wheel draw exactly 70. An exhausted script yields 0.
#[derive(Clone, Debug, Default)]
pub struct ScriptedDraws {
    draws: VecDeque<u64>,
}

impl ScriptedDraws {
    /// Script the given draws in order.
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self { draws: draws.into_iter().collect() }
    }

    /// Draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RandomSource for ScriptedDraws {
    fn next_u64(&mut self) -> u64 {
        self.draws.pop_front().unwrap_or(0)
    }

    fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        (self.next_u64() % bound as u64) as u32
    }
}

// =============================================================================
// TESTS
// =============================================================================
