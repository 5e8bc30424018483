//! Restaurant Game Configuration
//!
//! The thresholds and wheel a restaurant's staff configure, plus the menu
//! snapshot used to check free-item rewards. The engine only ever reads a
//! [`ValidatedConfig`]; raw configs never reach a spin.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::hash::{Digest32, LedgerHasher};
use crate::core::money::Money;
use crate::wheel::table::{ConfigError, NormalizedTable, ProbabilityTable, Slot};

// =============================================================================
// IDS
// =============================================================================

/// Restaurant identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(String);

impl RestaurantId {
    /// Wrap a string id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Menu item identifier, owned by the menu collaborator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuItemId(String);

impl MenuItemId {
    /// Wrap a string id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MenuItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// MENU SNAPSHOT
// =============================================================================

/// Point-in-time view of a restaurant's menu: item ids and whether each
/// can currently be served.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuSnapshot {
    items: BTreeMap<MenuItemId, bool>,
}

impl MenuSnapshot {
    /// Add an available item.
    pub fn insert(&mut self, id: MenuItemId) {
        self.items.insert(id, true);
    }

    /// Mark an item (un)available. Returns false if unknown.
    pub fn set_available(&mut self, id: &MenuItemId, available: bool) -> bool {
        match self.items.get_mut(id) {
            Some(entry) => {
                *entry = available;
                true
            }
            None => false,
        }
    }

    /// True if the item exists and can be served.
    pub fn resolves(&self, id: &MenuItemId) -> bool {
        self.items.get(id).copied().unwrap_or(false)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// GAME CONFIG
// =============================================================================

/// Thresholds and wheel for one restaurant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantGameConfig {
    /// Spend that unlocks the first puzzle.
    pub unlock_initial: Money,
    /// Extra spend for every further cycle.
    pub unlock_increment: Money,
    /// Wheel definition in display order.
    pub slots: Vec<Slot>,
}

impl RestaurantGameConfig {
    /// Validate thresholds and slots.
    pub fn validate(&self, menu: &MenuSnapshot) -> Result<NormalizedTable, ConfigError> {
        if self.unlock_initial.is_negative() || self.unlock_increment.is_negative() {
            return Err(ConfigError::NegativeThreshold);
        }
        ProbabilityTable::validate(&self.slots, menu)
    }

    /// Spend needed to unlock the cycle after `spin_count` completed ones.
    ///
    /// `unlock_initial + spin_count * unlock_increment`, saturating at the
    /// maximum amount (an unreachable threshold) rather than wrapping.
    pub fn threshold_for(&self, spin_count: u32) -> Money {
        self.unlock_increment
            .checked_mul(spin_count)
            .and_then(|extra| self.unlock_initial.checked_add(extra))
            .unwrap_or(Money::from_minor(i64::MAX))
    }

    /// Content hash identifying this exact configuration.
    pub fn content_hash(&self) -> Digest32 {
        let mut hasher = LedgerHasher::for_config();
        hasher.update_i64(self.unlock_initial.minor());
        hasher.update_i64(self.unlock_increment.minor());
        hasher.update_u64(self.slots.len() as u64);
        for slot in &self.slots {
            hasher.update_str(&slot.label);
            hasher.update_u32(slot.probability);
            match &slot.reward {
                Some(reward) => {
                    hasher.update_bool(true);
                    reward.hash_into(&mut hasher);
                }
                None => hasher.update_bool(false),
            }
        }
        hasher.finalize()
    }
}

/// A config that passed validation, as held by the config store.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    /// Owning restaurant.
    pub restaurant_id: RestaurantId,
    /// The raw configuration.
    pub config: RestaurantGameConfig,
    /// Normalized wheel.
    pub table: NormalizedTable,
    /// Store version, bumped on every save.
    pub version: u64,
    /// Content hash of `config`.
    pub hash: Digest32,
}

impl ValidatedConfig {
    /// Validate `config` and wrap it at `version`.
    pub fn new(
        restaurant_id: RestaurantId,
        config: RestaurantGameConfig,
        menu: &MenuSnapshot,
        version: u64,
    ) -> Result<Self, ConfigError> {
        let table = config.validate(menu)?;
        let hash = config.content_hash();
        Ok(Self { restaurant_id, config, table, version, hash })
    }

    /// Threshold for the cycle after `spin_count` completed ones.
    pub fn threshold_for(&self, spin_count: u32) -> Money {
        self.config.threshold_for(spin_count)
    }
}

// =============================================================================
// TESTS
// =============================================================================
