//! Session Events
//!
//! Committed transitions, broadcast to subscribers (UI push, billing views).
//! Events are emitted after the session lock is released; a lagging
//! subscriber drops old events, it never blocks the engine.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::money::Money;
use crate::engine::session::{GameStatus, SessionId};
use crate::wheel::reward::Reward;

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Table seated.
    Opened,
    /// Order lines appended.
    ItemsAdded {
        /// Lines in the batch.
        lines: usize,
        /// New session total.
        total_amount: Money,
    },
    /// Spend crossed the cycle threshold.
    Unlocked {
        /// Cycle unlocked.
        cycle: u32,
        /// Threshold that was met.
        threshold: Money,
    },
    /// Puzzle completed, spin available.
    PuzzleSolved {
        /// Cycle.
        cycle: u32,
    },
    /// Spin committed.
    SpinResolved {
        /// Cycle.
        cycle: u32,
        /// Winning slot.
        slot_index: usize,
        /// Winning label.
        label: String,
        /// Prize, if any.
        reward: Option<Reward>,
    },
    /// Reward now on the bill.
    RewardApplied {
        /// Cycle.
        cycle: u32,
    },
    /// Next cycle started, session locked again.
    CycleReset {
        /// New cycle index.
        cycle: u32,
    },
    /// Session billed and closed.
    Closed {
        /// Amount payable.
        total_payable: Money,
    },
}

/// A committed transition on one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session affected.
    pub session_id: SessionId,
    /// Session version after the transition.
    pub version: u64,
    /// Game status after the transition.
    pub game_status: GameStatus,
    /// Commit time.
    pub at: DateTime<Utc>,
    /// Details.
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

// =============================================================================
// TESTS
// =============================================================================
