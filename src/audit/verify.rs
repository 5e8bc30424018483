//! Ledger Verification
//!
//! Verify a session's spins by recomputing the hash chain and by replaying
//! each seeded draw against the wheel config it ran on.

use serde::{Serialize, Deserialize};

use crate::audit::record_hash;
use crate::core::hash::ZERO_HASH;
use crate::core::rng::{DeterministicRng, RandomSource};
use crate::engine::session::{Session, SessionId, SpinRecord};
use crate::wheel::config::ValidatedConfig;
use crate::wheel::selector::WheelSelector;
use crate::wheel::table::DRAW_DOMAIN;

/// Errors found while verifying a ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum VerificationError {
    /// `prev_hash` does not point at the previous record.
    #[error("record {index}: previous-hash link broken")]
    BrokenLink {
        /// Record index.
        index: usize,
    },

    /// Stored hash differs from the recomputed one.
    #[error("record {index}: hash mismatch")]
    HashMismatch {
        /// Record index.
        index: usize,
    },

    /// Config supplied for replay is not the one the spin ran on.
    #[error("record {index}: config hash mismatch")]
    ConfigMismatch {
        /// Record index.
        index: usize,
    },

    /// Seed replays to a different draw.
    #[error("record {index}: seed replays to draw {replayed}, ledger says {recorded}")]
    SeedMismatch {
        /// Record index.
        index: usize,
        /// Draw from replay.
        replayed: u32,
        /// Draw in the ledger.
        recorded: u32,
    },

    /// Draw maps to a different slot.
    #[error("record {index}: draw maps to slot {expected}, ledger says {recorded}")]
    SlotMismatch {
        /// Record index.
        index: usize,
        /// Slot from the table.
        expected: usize,
        /// Slot in the ledger.
        recorded: usize,
    },

    /// Label or reward differ from the table's slot.
    #[error("record {index}: slot contents differ from config")]
    ContentMismatch {
        /// Record index.
        index: usize,
    },

    /// Draw outside the domain.
    #[error("record {index}: draw {draw} outside domain")]
    DrawOutOfRange {
        /// Record index.
        index: usize,
        /// Recorded draw.
        draw: u32,
    },
}

/// Verification result for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Session verified.
    pub session_id: SessionId,
    /// Records in the ledger.
    pub records: usize,
    /// Records whose seed was replayed successfully.
    pub replayed: usize,
    /// Records whose draw-to-slot mapping was checked.
    pub mapped: usize,
    /// Records skipped because their config was not supplied.
    pub skipped: usize,
    /// Everything that failed.
    pub errors: Vec<VerificationError>,
}

impl VerificationReport {
    /// True if nothing failed.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check links and hashes of a record sequence.
pub fn verify_chain(session_id: &SessionId, records: &[SpinRecord]) -> Result<(), VerificationError> {
    let mut prev = ZERO_HASH;
    for (index, record) in records.iter().enumerate() {
        if record.prev_hash != prev {
            return Err(VerificationError::BrokenLink { index });
        }
        if record_hash(session_id, record) != record.hash {
            return Err(VerificationError::HashMismatch { index });
        }
        prev = record.hash;
    }
    Ok(())
}

/// Replay one record against the config it claims to have used.
///
/// Returns `true` if the seed was replayed, `false` if the record carries no
/// seed and only the slot mapping could be checked.
pub fn verify_replay(
    index: usize,
    record: &SpinRecord,
    config: &ValidatedConfig,
) -> Result<bool, VerificationError> {
    if record.config_hash != config.hash {
        return Err(VerificationError::ConfigMismatch { index });
    }
    let selected = WheelSelector::select_draw(&config.table, record.draw)
        .ok_or(VerificationError::DrawOutOfRange { index, draw: record.draw })?;

    let replayed_seed = match record.seed {
        Some(seed) => {
            let replayed = DeterministicRng::new(seed).next_below(DRAW_DOMAIN);
            if replayed != record.draw {
                return Err(VerificationError::SeedMismatch {
                    index,
                    replayed,
                    recorded: record.draw,
                });
            }
            true
        }
        None => false,
    };

    if selected.index != record.slot_index {
        return Err(VerificationError::SlotMismatch {
            index,
            expected: selected.index,
            recorded: record.slot_index,
        });
    }
    if selected.slot.label != record.label || selected.slot.reward != record.reward {
        return Err(VerificationError::ContentMismatch { index });
    }

    Ok(replayed_seed)
}

/// Verify a whole session.
///
/// `configs` are the wheel configs available to the auditor; each record is
/// matched to one by content hash. Records with no matching config are
/// counted as skipped, not failed.
pub fn verify_session(session: &Session, configs: &[&ValidatedConfig]) -> VerificationReport {
    let mut report = VerificationReport {
        session_id: session.id,
        records: session.spins.len(),
        replayed: 0,
        mapped: 0,
        skipped: 0,
        errors: Vec::new(),
    };

    if let Err(e) = verify_chain(&session.id, &session.spins) {
        report.errors.push(e);
    }

    for (index, record) in session.spins.iter().enumerate() {
        let config = configs.iter().find(|c| c.hash == record.config_hash);
        match config {
            Some(config) => match verify_replay(index, record, config) {
                Ok(seeded) => {
                    report.mapped += 1;
                    if seeded {
                        report.replayed += 1;
                    }
                }
                Err(e) => report.errors.push(e),
            },
            None => report.skipped += 1,
        }
    }

    report
}

// =============================================================================
// TESTS
// =============================================================================
