//! Probability Table
//!
//! Turns the slot list staff configured into a [`NormalizedTable`]: each slot
//! owns a half-open interval of the integer draw domain `[0, 100)`.
//!
//! ```text
//! slots:      Try Again (60)     10% Off (40)
//! intervals:  [0, 60)            [60, 100)
//! bounds:     60                 100          (exclusive upper bounds)
//! ```
//!
//! Validation never corrects anything. A table that does not sum to exactly
//! 100 is rejected outright, and staff must fix it before the wheel can spin.

use serde::{Serialize, Deserialize};

use crate::wheel::config::{MenuItemId, MenuSnapshot};
use crate::wheel::reward::Reward;

/// Size of the draw domain. Probabilities are whole percentage points.
pub const DRAW_DOMAIN: u32 = 100;

/// One wedge of the prize wheel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Text on the wedge.
    pub label: String,
    /// Chance in whole percentage points (0..=100).
    pub probability: u32,
    /// Prize, or `None` for "try again".
    #[serde(default)]
    pub reward: Option<Reward>,
}

impl Slot {
    /// Slot with a prize.
    pub fn prize(label: impl Into<String>, probability: u32, reward: Reward) -> Self {
        Self { label: label.into(), probability, reward: Some(reward) }
    }

    /// Slot without a prize.
    pub fn empty(label: impl Into<String>, probability: u32) -> Self {
        Self { label: label.into(), probability, reward: None }
    }
}

/// Configuration errors. These block saving a wheel; they are never coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No slots at all.
    #[error("wheel has no slots")]
    Empty,

    /// Probabilities do not add up to exactly 100.
    #[error("slot probabilities sum to {sum}, expected exactly 100")]
    ProbabilitySumInvalid {
        /// Actual sum.
        sum: u64,
    },

    /// A free-item reward points at something not on the menu.
    #[error("slot {slot} rewards menu item '{item}' which is not on the menu")]
    DanglingItemReference {
        /// Slot index.
        slot: usize,
        /// Unresolved item.
        item: MenuItemId,
    },

    /// A single probability above 100.
    #[error("slot {slot} has probability {probability}, must be 0..=100")]
    ProbabilityOutOfRange {
        /// Slot index.
        slot: usize,
        /// Configured value.
        probability: u32,
    },

    /// Blank wedge label.
    #[error("slot {slot} has an empty label")]
    EmptyLabel {
        /// Slot index.
        slot: usize,
    },

    /// Unlock threshold or increment below zero.
    #[error("unlock thresholds cannot be negative")]
    NegativeThreshold,
}

/// A validated table with precomputed cumulative bounds.
///
/// Only [`ProbabilityTable::validate`] can build one, so holding a
/// `NormalizedTable` means the slots sum to exactly [`DRAW_DOMAIN`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedTable {
    slots: Vec<Slot>,
    /// `bounds[i]` is the exclusive upper end of slot `i`'s interval.
    bounds: Vec<u32>,
}

impl NormalizedTable {
    /// Slots in declaration order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Half-open interval `[start, end)` owned by slot `index`.
    pub fn interval(&self, index: usize) -> Option<(u32, u32)> {
        let end = *self.bounds.get(index)?;
        let start = if index == 0 { 0 } else { self.bounds[index - 1] };
        Some((start, end))
    }

    /// Slot whose interval contains `draw`. `None` if `draw >= DRAW_DOMAIN`.
    ///
    /// Binary search over the bounds. Zero-width intervals are skipped, and
    /// because intervals are half-open no draw belongs to two slots.
    pub fn slot_for(&self, draw: u32) -> Option<usize> {
        if draw >= DRAW_DOMAIN {
            return None;
        }
        Some(self.bounds.partition_point(|&upper| upper <= draw))
    }
}

/// Validation entry point.
pub struct ProbabilityTable;

impl ProbabilityTable {
    /// Validate and normalize a slot list.
    ///
    /// Checks, in order: non-empty, per-slot label and range, exact sum of
    /// 100, and that every free-item reward resolves against `menu`.
    pub fn validate(slots: &[Slot], menu: &MenuSnapshot) -> Result<NormalizedTable, ConfigError> {
        if slots.is_empty() {
            return Err(ConfigError::Empty);
        }

        for (index, slot) in slots.iter().enumerate() {
            if slot.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel { slot: index });
            }
            if slot.probability > DRAW_DOMAIN {
                return Err(ConfigError::ProbabilityOutOfRange {
                    slot: index,
                    probability: slot.probability,
                });
            }
        }

        let sum: u64 = slots.iter().map(|s| s.probability as u64).sum();
        if sum != DRAW_DOMAIN as u64 {
            return Err(ConfigError::ProbabilitySumInvalid { sum });
        }

        for (index, slot) in slots.iter().enumerate() {
            if let Some(item) = slot.reward.as_ref().and_then(Reward::item) {
                if !menu.resolves(item) {
                    return Err(ConfigError::DanglingItemReference {
                        slot: index,
                        item: item.clone(),
                    });
                }
            }
        }

        let mut bounds = Vec::with_capacity(slots.len());
        let mut cumulative = 0u32;
        for slot in slots {
            cumulative += slot.probability;
            bounds.push(cumulative);
        }

        Ok(NormalizedTable { slots: slots.to_vec(), bounds })
    }
}

// =============================================================================
// TESTS
// =============================================================================
