//! Session State
//!
//! Everything the engine knows about one seated table visit: the order, the
//! game status, and the history of puzzles and spins. Only the engine writes
//! to a [`Session`]; collaborators see [`SessionSnapshot`]s.

use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::Digest32;
use crate::core::money::Money;
use crate::wheel::config::{MenuItemId, RestaurantId, ValidatedConfig};
use crate::wheel::reward::Reward;

// =============================================================================
// IDS
// =============================================================================

/// Unique session identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering. Serialized as the
/// hyphenated UUID string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub [u8; 16]);

impl SessionId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random (v4) id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uuid_string())
    }
}

impl Serialize for SessionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_uuid_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid session id '{}'", s)))
    }
}

/// Table identifier within a restaurant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Wrap a string id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Game status within the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Spend below the cycle threshold.
    Locked,
    /// Threshold met, puzzle available.
    Unlocked,
    /// Puzzle solved, one spin available.
    Playing,
    /// Spin resolved, waiting for the bill refresh.
    Won,
    /// Reward visible on the bill.
    RewardApplied,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locked => "LOCKED",
            Self::Unlocked => "UNLOCKED",
            Self::Playing => "PLAYING",
            Self::Won => "WON",
            Self::RewardApplied => "REWARD_APPLIED",
        };
        f.write_str(name)
    }
}

/// Dining lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Table seated, ordering.
    Open,
    /// Billed and closed. Read-only until purged.
    Closed,
}

// =============================================================================
// RECORDS
// =============================================================================

/// One ordered line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Menu item ordered.
    pub menu_item_id: MenuItemId,
    /// Display name at the time of ordering.
    pub name: String,
    /// Units ordered, at least 1.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
    /// Kitchen notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderLine {
    /// Line without notes.
    pub fn new(menu_item_id: MenuItemId, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self { menu_item_id, name: name.into(), quantity, unit_price, notes: None }
    }

    /// `unit_price * quantity`, `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A solved puzzle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleRecord {
    /// Cycle the puzzle belonged to (0-based).
    pub cycle: u32,
    /// When it was solved.
    pub solved_at: DateTime<Utc>,
}

/// A resolved spin. Records are hash-chained per session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinRecord {
    /// Cycle the spin belonged to (0-based).
    pub cycle: u32,
    /// Winning slot index.
    pub slot_index: usize,
    /// Winning slot label.
    pub label: String,
    /// Prize, if any.
    pub reward: Option<Reward>,
    /// Raw draw in `[0, 100)`.
    pub draw: u32,
    /// Seed of the deterministic source, when the engine chose it.
    pub seed: Option<u64>,
    /// Config store version the spin ran against.
    pub config_version: u64,
    /// Content hash of that config.
    pub config_hash: Digest32,
    /// Commit time.
    pub spun_at: DateTime<Utc>,
    /// Hash of the previous record (zero for the first).
    pub prev_hash: Digest32,
    /// Hash of this record.
    pub hash: Digest32,
}

// =============================================================================
// SESSION
// =============================================================================

/// One table visit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// Restaurant the table belongs to.
    pub restaurant_id: RestaurantId,
    /// Seated table.
    pub table_id: TableId,
    /// Ordered lines, append-only.
    pub items: Vec<OrderLine>,
    /// Sum of line totals. Never decreases while open.
    pub total_amount: Money,
    /// Game status of the current cycle.
    pub game_status: GameStatus,
    /// Completed cycles (resolved spins).
    pub spin_count: u32,
    /// Reward of the current cycle.
    pub reward_won: Option<Reward>,
    /// Rewards from earlier cycles already on the bill.
    pub applied_rewards: Vec<Reward>,
    /// Dining lifecycle.
    pub status: SessionStatus,
    /// Solved puzzles.
    pub puzzles: Vec<PuzzleRecord>,
    /// Resolved spins.
    pub spins: Vec<SpinRecord>,
    /// Bumped on every committed mutation.
    pub version: u64,
    /// Seated at.
    pub created_at: DateTime<Utc>,
    /// Closed at.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// New, empty, locked session.
    pub fn new(id: SessionId, restaurant_id: RestaurantId, table_id: TableId) -> Self {
        Self {
            id,
            restaurant_id,
            table_id,
            items: Vec::new(),
            total_amount: Money::ZERO,
            game_status: GameStatus::Locked,
            spin_count: 0,
            reward_won: None,
            applied_rewards: Vec::new(),
            status: SessionStatus::Open,
            puzzles: Vec::new(),
            spins: Vec::new(),
            version: 0,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Check if session is open.
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Zero-based index of the current cycle.
    ///
    /// Once a spin resolves the cycle is complete, so while `WON` or
    /// `REWARD_APPLIED` this still names the cycle that just finished.
    pub fn current_cycle(&self) -> u32 {
        match self.game_status {
            GameStatus::Won | GameStatus::RewardApplied => self.spin_count.saturating_sub(1),
            _ => self.spin_count,
        }
    }

    /// True if a spin would be accepted right now.
    pub fn can_spin(&self) -> bool {
        self.is_open() && self.game_status == GameStatus::Playing && self.reward_won.is_none()
    }

    /// Hash of the newest spin record.
    pub fn ledger_head(&self) -> Digest32 {
        self.spins.last().map(|r| r.hash).unwrap_or(crate::core::hash::ZERO_HASH)
    }

    /// Unit price of an item as ordered in this session.
    pub fn unit_price_of(&self, item: &MenuItemId) -> Option<Money> {
        self.items
            .iter()
            .find(|line| &line.menu_item_id == item)
            .map(|line| line.unit_price)
    }

    /// Rewards currently counting toward the bill.
    pub fn billable_rewards(&self) -> Vec<&Reward> {
        let mut rewards: Vec<&Reward> = self.applied_rewards.iter().collect();
        if self.game_status == GameStatus::RewardApplied {
            if let Some(reward) = &self.reward_won {
                rewards.push(reward);
            }
        }
        rewards
    }

    /// Current bill.
    pub fn bill(&self) -> Bill {
        let subtotal = self.total_amount;
        let mut remaining = subtotal;
        let mut discounts = Vec::new();
        for reward in self.billable_rewards() {
            let amount = reward
                .discount_on(subtotal, |item| self.unit_price_of(item))
                .min(remaining);
            remaining = remaining.saturating_sub_floor(amount);
            discounts.push(BillDiscount {
                description: reward.description().to_string(),
                amount,
            });
        }
        Bill {
            session_id: self.id,
            subtotal,
            discount_total: subtotal.saturating_sub_floor(remaining),
            discounts,
            total_payable: remaining,
        }
    }

    /// Read-only projection.
    pub fn snapshot(&self, config: Option<&ValidatedConfig>) -> SessionSnapshot {
        let next_unlock_at = match (self.game_status, config) {
            (GameStatus::Locked, Some(config)) if self.is_open() => {
                Some(config.threshold_for(self.spin_count))
            }
            _ => None,
        };
        SessionSnapshot {
            session: self.clone(),
            cycle: self.current_cycle(),
            next_unlock_at,
            can_spin: self.can_spin(),
        }
    }
}

/// Read-only session view for polling clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Full session state.
    #[serde(flatten)]
    pub session: Session,
    /// Current cycle index.
    pub cycle: u32,
    /// Spend needed to unlock, when locked and a config is active.
    pub next_unlock_at: Option<Money>,
    /// Whether a spin request would be accepted.
    pub can_spin: bool,
}

/// One discount line on the bill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDiscount {
    /// Prize text.
    pub description: String,
    /// Amount taken off.
    pub amount: Money,
}

/// Bill for a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    /// Session billed.
    pub session_id: SessionId,
    /// Sum of ordered lines.
    pub subtotal: Money,
    /// Discount lines.
    pub discounts: Vec<BillDiscount>,
    /// Sum of discounts, never above the subtotal.
    pub discount_total: Money,
    /// Amount to pay.
    pub total_payable: Money,
}

// =============================================================================
// TESTS
// =============================================================================
