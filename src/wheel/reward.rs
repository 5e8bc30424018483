//! Rewards
//!
//! A reward is a tagged union keyed by offer type. Each variant carries only
//! the fields it needs, and the constructors reject values that would make the
//! reward meaningless (a 0% discount, a free item with no item). The JSON shape
//! goes through [`RewardSpec`], so deserialization enforces the same rules.

use serde::{Serialize, Deserialize};

use crate::core::hash::LedgerHasher;
use crate::core::money::Money;
use crate::wheel::config::MenuItemId;

/// Offer types, as shown to staff when configuring the wheel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferType {
    /// Percentage off the bill.
    PercentageDiscount,
    /// Flat amount off the bill.
    FlatDiscount,
    /// One unit of a menu item for free.
    FreeItem,
}

/// A prize attached to a wheel slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RewardSpec", into = "RewardSpec")]
pub enum Reward {
    /// `percent`% off the subtotal (1..=100).
    PercentageDiscount {
        /// Whole percentage points.
        percent: u8,
        /// Prize text shown to the diner.
        description: String,
    },
    /// Fixed amount off the subtotal.
    FlatDiscount {
        /// Amount off, strictly positive.
        amount: Money,
        /// Prize text shown to the diner.
        description: String,
    },
    /// A free menu item.
    FreeItem {
        /// Menu item granted.
        item: MenuItemId,
        /// Prize text shown to the diner.
        description: String,
    },
}

/// Reasons a reward cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    /// Percentage outside 1..=100.
    #[error("percentage must be between 1 and 100, got {0}")]
    PercentOutOfRange(i64),

    /// Flat discount not strictly positive.
    #[error("flat discount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),

    /// Free item without an item reference.
    #[error("free item reward needs an item reference")]
    MissingItem,

    /// Empty prize text.
    #[error("reward description cannot be empty")]
    EmptyDescription,
}

fn checked_description(description: String) -> Result<String, RewardError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(RewardError::EmptyDescription);
    }
    Ok(trimmed.to_string())
}

impl Reward {
    /// Percentage discount.
    pub fn percentage(percent: i64, description: impl Into<String>) -> Result<Self, RewardError> {
        if !(1..=100).contains(&percent) {
            return Err(RewardError::PercentOutOfRange(percent));
        }
        Ok(Self::PercentageDiscount {
            percent: percent as u8,
            description: checked_description(description.into())?,
        })
    }

    /// Flat discount.
    pub fn flat(amount: Money, description: impl Into<String>) -> Result<Self, RewardError> {
        if !amount.is_positive() {
            return Err(RewardError::NonPositiveAmount(amount));
        }
        Ok(Self::FlatDiscount {
            amount,
            description: checked_description(description.into())?,
        })
    }

    /// Free menu item.
    pub fn free_item(item: MenuItemId, description: impl Into<String>) -> Result<Self, RewardError> {
        if item.as_str().trim().is_empty() {
            return Err(RewardError::MissingItem);
        }
        Ok(Self::FreeItem {
            item,
            description: checked_description(description.into())?,
        })
    }

    /// Offer type tag.
    pub fn offer_type(&self) -> OfferType {
        match self {
            Self::PercentageDiscount { .. } => OfferType::PercentageDiscount,
            Self::FlatDiscount { .. } => OfferType::FlatDiscount,
            Self::FreeItem { .. } => OfferType::FreeItem,
        }
    }

    /// Prize text.
    pub fn description(&self) -> &str {
        match self {
            Self::PercentageDiscount { description, .. }
            | Self::FlatDiscount { description, .. }
            | Self::FreeItem { description, .. } => description,
        }
    }

    /// Referenced menu item, if any.
    pub fn item(&self) -> Option<&MenuItemId> {
        match self {
            Self::FreeItem { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Amount this reward takes off a bill.
    ///
    /// `unit_price_of` resolves the price of the free item from the session's
    /// own order. A free item that was never ordered discounts nothing; the
    /// kitchen adds it to the table separately. The result never exceeds
    /// `subtotal`.
    pub fn discount_on<F>(&self, subtotal: Money, unit_price_of: F) -> Money
    where
        F: Fn(&MenuItemId) -> Option<Money>,
    {
        let raw = match self {
            Self::PercentageDiscount { percent, .. } => subtotal.percent_of(*percent),
            Self::FlatDiscount { amount, .. } => *amount,
            Self::FreeItem { item, .. } => unit_price_of(item).unwrap_or(Money::ZERO),
        };
        raw.min(subtotal).max(Money::ZERO)
    }

    /// Feed this reward into a ledger hash.
    pub fn hash_into(&self, hasher: &mut LedgerHasher) {
        match self {
            Self::PercentageDiscount { percent, description } => {
                hasher.update_u8(0);
                hasher.update_u8(*percent);
                hasher.update_str(description);
            }
            Self::FlatDiscount { amount, description } => {
                hasher.update_u8(1);
                hasher.update_i64(amount.minor());
                hasher.update_str(description);
            }
            Self::FreeItem { item, description } => {
                hasher.update_u8(2);
                hasher.update_str(item.as_str());
                hasher.update_str(description);
            }
        }
    }
}

// =============================================================================
// WIRE SHAPE
// =============================================================================

/// Flat JSON shape of a reward.
///
/// `value` is whole percentage points for `PERCENTAGE_DISCOUNT`, minor units
/// for `FLAT_DISCOUNT`, and ignored for `FREE_ITEM`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardSpec {
    /// Offer type tag.
    pub offer_type: OfferType,
    /// Percent or minor-unit amount.
    #[serde(default)]
    pub value: i64,
    /// Menu item for `FREE_ITEM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_ref: Option<MenuItemId>,
    /// Prize text.
    pub description: String,
}

impl TryFrom<RewardSpec> for Reward {
    type Error = RewardError;

    fn try_from(spec: RewardSpec) -> Result<Self, Self::Error> {
        match spec.offer_type {
            OfferType::PercentageDiscount => Reward::percentage(spec.value, spec.description),
            OfferType::FlatDiscount => Reward::flat(Money::from_minor(spec.value), spec.description),
            OfferType::FreeItem => {
                let item = spec.item_ref.ok_or(RewardError::MissingItem)?;
                Reward::free_item(item, spec.description)
            }
        }
    }
}

impl From<Reward> for RewardSpec {
    fn from(reward: Reward) -> Self {
        match reward {
            Reward::PercentageDiscount { percent, description } => RewardSpec {
                offer_type: OfferType::PercentageDiscount,
                value: percent as i64,
                item_ref: None,
                description,
            },
            Reward::FlatDiscount { amount, description } => RewardSpec {
                offer_type: OfferType::FlatDiscount,
                value: amount.minor(),
                item_ref: None,
                description,
            },
            Reward::FreeItem { item, description } => RewardSpec {
                offer_type: OfferType::FreeItem,
                value: 0,
                item_ref: Some(item),
                description,
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert!(Reward::percentage(10, "10% Off").is_ok());
        assert!(Reward::percentage(100, "On the house").is_ok());
        assert_eq!(Reward::percentage(0, "x"), Err(RewardError::PercentOutOfRange(0)));
        assert_eq!(Reward::percentage(101, "x"), Err(RewardError::PercentOutOfRange(101)));
    }

    #[test]
    fn test_flat_must_be_positive() {
        assert!(Reward::flat(Money::from_major(5), "5 off").is_ok());
        assert_eq!(
            Reward::flat(Money::ZERO, "nothing"),
            Err(RewardError::NonPositiveAmount(Money::ZERO))
        );
    }

    #[test]
    fn test_free_item_needs_reference() {
        assert_eq!(
            Reward::free_item(MenuItemId::new("  "), "Free Biriyani"),
            Err(RewardError::MissingItem)
        );
        let reward = Reward::free_item(MenuItemId::new("biriyani"), "1 Plate Biriyani").unwrap();
        assert_eq!(reward.item().map(|i| i.as_str()), Some("biriyani"));
    }

    #[test]
    fn test_description_required() {
        assert_eq!(Reward::percentage(10, "   "), Err(RewardError::EmptyDescription));
    }

    #[test]
    fn test_json_shape() {
        let reward = Reward::percentage(10, "10% Off").unwrap();
        let json = serde_json::to_value(&reward).unwrap();
        assert_eq!(json["offer_type"], "PERCENTAGE_DISCOUNT");
        assert_eq!(json["value"], 10);
        assert!(json.get("item_ref").is_none());
    }

    #[test]
    fn test_json_rejects_invalid_reward() {
        let bad = r#"{"offer_type":"FREE_ITEM","value":0,"description":"Free dessert"}"#;
        assert!(serde_json::from_str::<Reward>(bad).is_err());

        let bad = r#"{"offer_type":"FLAT_DISCOUNT","value":-100,"description":"Negative"}"#;
        assert!(serde_json::from_str::<Reward>(bad).is_err());

        let good = r#"{"offer_type":"FREE_ITEM","item_ref":"kulfi","description":"Free Kulfi"}"#;
        let reward: Reward = serde_json::from_str(good).unwrap();
        assert_eq!(reward.offer_type(), OfferType::FreeItem);
    }

    #[test]
    fn test_discounts() {
        let subtotal = Money::from_major(220);
        let none = |_: &MenuItemId| None;

        let pct = Reward::percentage(10, "10% Off").unwrap();
        assert_eq!(pct.discount_on(subtotal, none), Money::from_major(22));

        let flat = Reward::flat(Money::from_major(500), "500 off").unwrap();
        assert_eq!(flat.discount_on(subtotal, none), subtotal);

        let free = Reward::free_item(MenuItemId::new("biriyani"), "Free Biriyani").unwrap();
        assert_eq!(free.discount_on(subtotal, none), Money::ZERO);
        let priced = |_: &MenuItemId| Some(Money::from_major(180));
        assert_eq!(free.discount_on(subtotal, priced), Money::from_major(180));
    }
}
