//! Config Store
//!
//! Versioned wheel configuration per restaurant. A config is validated when
//! saved and again whenever the menu changes; only a currently valid config
//! can drive a spin. A failed save never replaces what is stored.
//!
//! ```text
//! set_game_config ──validate──► Active(v+1)
//!                        └─err─► rejected, store unchanged
//! revalidate(menu) ─────────────► Active(v) | Invalid(v+1)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::hash::short_hex;
use crate::engine::GameError;
use crate::wheel::config::{MenuSnapshot, RestaurantGameConfig, RestaurantId, ValidatedConfig};
use crate::wheel::table::ConfigError;

/// Stored state for one restaurant.
#[derive(Clone, Debug)]
enum ConfigEntry {
    /// Valid and spinnable.
    Active(Arc<ValidatedConfig>),
    /// Saved once, but no longer valid against the current menu.
    Invalid {
        config: RestaurantGameConfig,
        error: ConfigError,
        version: u64,
    },
}

impl ConfigEntry {
    fn version(&self) -> u64 {
        match self {
            Self::Active(validated) => validated.version,
            Self::Invalid { version, .. } => *version,
        }
    }
}

/// What staff see when they open the wheel editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigView {
    /// Restaurant.
    pub restaurant_id: RestaurantId,
    /// Stored configuration.
    pub config: RestaurantGameConfig,
    /// Store version.
    pub version: u64,
    /// Content hash, hex.
    pub hash: String,
    /// Why the config cannot currently be used, if it cannot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Per-restaurant wheel configs.
pub struct ConfigStore {
    entries: RwLock<BTreeMap<RestaurantId, ConfigEntry>>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Validate and save a config. Returns the new version.
    pub async fn set_game_config(
        &self,
        restaurant_id: RestaurantId,
        config: RestaurantGameConfig,
        menu: &MenuSnapshot,
    ) -> Result<u64, ConfigError> {
        let mut entries = self.entries.write().await;
        let version = entries.get(&restaurant_id).map(|e| e.version()).unwrap_or(0) + 1;

        let validated = match ValidatedConfig::new(restaurant_id.clone(), config, menu, version) {
            Ok(validated) => validated,
            Err(e) => {
                warn!("Rejected wheel config for {}: {}", restaurant_id, e);
                return Err(e);
            }
        };

        info!(
            "Saved wheel config for {} (v{}, {} slots, {})",
            restaurant_id,
            version,
            validated.table.len(),
            short_hex(&validated.hash)
        );
        entries.insert(restaurant_id, ConfigEntry::Active(Arc::new(validated)));
        Ok(version)
    }

    /// Stored config with its problem, if any.
    pub async fn get_game_config(&self, restaurant_id: &RestaurantId) -> Option<ConfigView> {
        let entries = self.entries.read().await;
        entries.get(restaurant_id).map(|entry| match entry {
            ConfigEntry::Active(validated) => ConfigView {
                restaurant_id: restaurant_id.clone(),
                config: validated.config.clone(),
                version: validated.version,
                hash: hex::encode(validated.hash),
                problem: None,
            },
            ConfigEntry::Invalid { config, error, version } => ConfigView {
                restaurant_id: restaurant_id.clone(),
                config: config.clone(),
                version: *version,
                hash: hex::encode(config.content_hash()),
                problem: Some(error.to_string()),
            },
        })
    }

    /// Config able to drive a spin right now.
    pub async fn active(&self, restaurant_id: &RestaurantId) -> Result<Arc<ValidatedConfig>, GameError> {
        let entries = self.entries.read().await;
        match entries.get(restaurant_id) {
            Some(ConfigEntry::Active(validated)) => Ok(Arc::clone(validated)),
            Some(ConfigEntry::Invalid { error, .. }) => Err(GameError::InvalidConfig(error.clone())),
            None => Err(GameError::ConfigMissing(restaurant_id.clone())),
        }
    }

    /// Active config, or `None` when missing or invalid.
    pub async fn try_active(&self, restaurant_id: &RestaurantId) -> Option<Arc<ValidatedConfig>> {
        self.active(restaurant_id).await.ok()
    }

    /// Current version, 0 if nothing was ever saved.
    pub async fn current_version(&self, restaurant_id: &RestaurantId) -> u64 {
        let entries = self.entries.read().await;
        entries.get(restaurant_id).map(|e| e.version()).unwrap_or(0)
    }

    /// Re-check the stored config against a changed menu.
    ///
    /// The version moves only when validity flips, so in-flight spins notice
    /// exactly the changes that matter to them. Returns the resulting problem.
    pub async fn revalidate(
        &self,
        restaurant_id: &RestaurantId,
        menu: &MenuSnapshot,
    ) -> Option<ConfigError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get(restaurant_id)?;

        let (config, was_valid) = match entry {
            ConfigEntry::Active(validated) => (validated.config.clone(), true),
            ConfigEntry::Invalid { config, .. } => (config.clone(), false),
        };
        let version = entry.version();

        match ValidatedConfig::new(restaurant_id.clone(), config.clone(), menu, version + 1) {
            Ok(_) if was_valid => None,
            Ok(validated) => {
                info!("Wheel config for {} is valid again (v{})", restaurant_id, validated.version);
                entries.insert(restaurant_id.clone(), ConfigEntry::Active(Arc::new(validated)));
                None
            }
            Err(error) => {
                if was_valid {
                    warn!("Wheel config for {} invalidated by menu change: {}", restaurant_id, error);
                    entries.insert(
                        restaurant_id.clone(),
                        ConfigEntry::Invalid { config, error: error.clone(), version: version + 1 },
                    );
                } else if let Some(ConfigEntry::Invalid { error: stored, .. }) = entries.get_mut(restaurant_id) {
                    *stored = error.clone();
                }
                Some(error)
            }
        }
    }

    /// Number of restaurants with a stored config.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::Money;
    use crate::wheel::config::MenuItemId;
    use crate::wheel::reward::Reward;
    use crate::wheel::table::Slot;

    fn rid() -> RestaurantId {
        RestaurantId::new("rest_001")
    }

    fn scenario_config() -> RestaurantGameConfig {
        RestaurantGameConfig {
            unlock_initial: Money::from_major(200),
            unlock_increment: Money::from_major(50),
            slots: vec![
                Slot::empty("Try Again", 60),
                Slot::prize("10% Off", 40, Reward::percentage(10, "10% Off").unwrap()),
            ],
        }
    }

    fn biriyani_config() -> RestaurantGameConfig {
        RestaurantGameConfig {
            unlock_initial: Money::from_major(200),
            unlock_increment: Money::from_major(50),
            slots: vec![
                Slot::empty("Try Again", 50),
                Slot::prize(
                    "Free Biriyani",
                    50,
                    Reward::free_item(MenuItemId::new("biriyani"), "1 Plate Biriyani").unwrap(),
                ),
            ],
        }
    }

    fn menu_with_biriyani() -> MenuSnapshot {
        let mut menu = MenuSnapshot::default();
        menu.insert(MenuItemId::new("biriyani"));
        menu
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = ConfigStore::new();
        let version = store
            .set_game_config(rid(), scenario_config(), &MenuSnapshot::default())
            .await
            .unwrap();
        assert_eq!(version, 1);

        let view = store.get_game_config(&rid()).await.unwrap();
        assert_eq!(view.config, scenario_config());
        assert!(view.problem.is_none());
        assert_eq!(store.active(&rid()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_rejected_save_keeps_previous() {
        let store = ConfigStore::new();
        store
            .set_game_config(rid(), scenario_config(), &MenuSnapshot::default())
            .await
            .unwrap();

        let mut bad = scenario_config();
        bad.slots[0].probability = 59;
        let result = store.set_game_config(rid(), bad, &MenuSnapshot::default()).await;
        assert_eq!(result, Err(ConfigError::ProbabilitySumInvalid { sum: 99 }));

        assert_eq!(store.current_version(&rid()).await, 1);
        assert_eq!(store.active(&rid()).await.unwrap().config, scenario_config());
    }

    #[tokio::test]
    async fn test_missing_config() {
        let store = ConfigStore::new();
        assert!(matches!(store.active(&rid()).await, Err(GameError::ConfigMissing(_))));
        assert_eq!(store.current_version(&rid()).await, 0);
        assert!(store.get_game_config(&rid()).await.is_none());
    }

    #[tokio::test]
    async fn test_menu_change_invalidates_and_restores() {
        let store = ConfigStore::new();
        let mut menu = menu_with_biriyani();
        store.set_game_config(rid(), biriyani_config(), &menu).await.unwrap();

        // Unrelated revalidation leaves the version alone.
        assert!(store.revalidate(&rid(), &menu).await.is_none());
        assert_eq!(store.current_version(&rid()).await, 1);

        menu.set_available(&MenuItemId::new("biriyani"), false);
        let problem = store.revalidate(&rid(), &menu).await;
        assert!(matches!(problem, Some(ConfigError::DanglingItemReference { slot: 1, .. })));
        assert_eq!(store.current_version(&rid()).await, 2);
        assert!(matches!(store.active(&rid()).await, Err(GameError::InvalidConfig(_))));
        assert!(store.get_game_config(&rid()).await.unwrap().problem.is_some());

        menu.set_available(&MenuItemId::new("biriyani"), true);
        assert!(store.revalidate(&rid(), &menu).await.is_none());
        assert_eq!(store.current_version(&rid()).await, 3);
        assert_eq!(store.active(&rid()).await.unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_dangling_reference_rejected_on_save() {
        let store = ConfigStore::new();
        let result = store
            .set_game_config(rid(), biriyani_config(), &MenuSnapshot::default())
            .await;
        assert!(matches!(result, Err(ConfigError::DanglingItemReference { .. })));
        assert!(store.is_empty().await);
    }
}
