//! Spin Ledger
//!
//! Every resolved spin is sealed into a per-session hash chain:
//!
//! ```text
//! record[n].hash = H(SPIN_DOMAIN, record[n-1].hash, session id, cycle,
//!                    draw, slot index, label, reward, seed, config version,
//!                    config hash, timestamp)
//! ```
//!
//! Rewriting any past outcome breaks every later hash. Together with the
//! recorded seed this lets anyone holding the wheel config replay a spin and
//! confirm it landed where the ledger says.

pub mod verify;

use crate::core::hash::{Digest32, LedgerHasher};
use crate::engine::session::{SessionId, SpinRecord};

pub use verify::{verify_chain, verify_replay, verify_session, VerificationError, VerificationReport};

/// Compute the chained hash of a spin record.
///
/// Reads every field except `hash` itself.
pub fn record_hash(session_id: &SessionId, record: &SpinRecord) -> Digest32 {
    let mut hasher = LedgerHasher::for_spin();
    hasher.update_bytes(&record.prev_hash);
    hasher.update_bytes(session_id.as_bytes());
    hasher.update_u32(record.cycle);
    hasher.update_u32(record.draw);
    hasher.update_u64(record.slot_index as u64);
    hasher.update_str(&record.label);
    match &record.reward {
        Some(reward) => {
            hasher.update_bool(true);
            reward.hash_into(&mut hasher);
        }
        None => hasher.update_bool(false),
    }
    hasher.update_opt_u64(record.seed);
    hasher.update_u64(record.config_version);
    hasher.update_bytes(&record.config_hash);
    hasher.update_i64(record.spun_at.timestamp_micros());
    hasher.finalize()
}

/// Fill in `record.hash` from its contents.
pub fn seal(session_id: &SessionId, record: &mut SpinRecord) {
    record.hash = record_hash(session_id, record);
}
