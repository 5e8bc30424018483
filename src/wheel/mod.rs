//! Wheel definition and selection.
//!
//! Pure, synchronous, and deterministic for a given random source.

pub mod config;
pub mod reward;
pub mod selector;
pub mod table;

pub use config::{MenuItemId, MenuSnapshot, RestaurantGameConfig, RestaurantId, ValidatedConfig};
pub use reward::{OfferType, Reward, RewardError};
pub use selector::{SelectedSlot, WheelSelector};
pub use table::{ConfigError, NormalizedTable, ProbabilityTable, Slot, DRAW_DOMAIN};
