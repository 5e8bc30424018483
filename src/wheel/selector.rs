//! Wheel Selection
//!
//! Draws one integer from the random source and maps it onto the table.
//! One draw per spin, nothing else is consumed, so a recorded seed replays
//! to the same slot.

use serde::{Serialize, Deserialize};

use crate::core::rng::RandomSource;
use crate::wheel::table::{NormalizedTable, Slot, DRAW_DOMAIN};

/// The outcome of one draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSlot {
    /// Index into the table's slots.
    pub index: usize,
    /// The raw draw in `[0, 100)`.
    pub draw: u32,
    /// Copy of the winning slot.
    pub slot: Slot,
}

/// Draws slots from validated tables.
pub struct WheelSelector;

impl WheelSelector {
    /// Select one slot.
    ///
    /// Infallible for a validated table: the last bound is always
    /// [`DRAW_DOMAIN`] and the draw is always below it.
    ///
    /// # Panics
    ///
    /// If the source breaks the [`RandomSource::next_below`] contract and
    /// returns a value outside `[0, DRAW_DOMAIN)`.
    pub fn select<R: RandomSource + ?Sized>(table: &NormalizedTable, rng: &mut R) -> SelectedSlot {
        let draw = rng.next_below(DRAW_DOMAIN);
        match Self::select_draw(table, draw) {
            Some(selected) => selected,
            None => panic!("random source returned {} for next_below({})", draw, DRAW_DOMAIN),
        }
    }

    /// Map an already-drawn value. Used by replay verification.
    ///
    /// Returns `None` for a draw outside `[0, DRAW_DOMAIN)`.
    pub fn select_draw(table: &NormalizedTable, draw: u32) -> Option<SelectedSlot> {
        let index = table.slot_for(draw)?;
        Some(SelectedSlot {
            index,
            draw,
            slot: table.slots()[index].clone(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
