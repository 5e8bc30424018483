//! Session State Machine
//!
//! Pure transitions over a [`Session`]. No locking, no I/O, no clock reads;
//! the engine supplies the time and holds the session lock around each call.
//!
//! ```text
//!   LOCKED ──total >= threshold──► UNLOCKED ──puzzle──► PLAYING ──spin──► WON
//!     ▲                                                                   │
//!     │◄────────────── refresh, no reward (next cycle) ───────────────────┤
//!     │                                                                   │
//!     └──── refresh (NextCycle policy) ◄── REWARD_APPLIED ◄── refresh ────┘
//! ```
//!
//! Every function validates fully before touching the session, so a
//! rejected call leaves it exactly as it was.

use chrono::{DateTime, Utc};

use crate::audit;
use crate::config::AfterRewardPolicy;
use crate::core::hash::ZERO_HASH;
use crate::core::money::Money;
use crate::engine::events::SessionEventKind;
use crate::engine::session::{
    GameStatus, OrderLine, PuzzleRecord, Session, SessionStatus, SpinRecord,
};
use crate::engine::GameError;
use crate::wheel::config::ValidatedConfig;
use crate::wheel::selector::SelectedSlot;

/// Events produced by one transition.
pub type Transition = Vec<SessionEventKind>;

fn ensure_open(session: &Session) -> Result<(), GameError> {
    if session.is_open() {
        Ok(())
    } else {
        Err(GameError::SessionClosed(session.id))
    }
}

fn not_eligible(session: &Session, reason: &'static str) -> GameError {
    GameError::NotEligible { status: session.game_status, reason }
}

/// Bump the version if anything was committed.
fn commit(session: &mut Session, events: Transition) -> Transition {
    if !events.is_empty() {
        session.version += 1;
    }
    events
}

/// LOCKED → UNLOCKED when the cycle threshold is met.
///
/// Only ever moves forward: a session past LOCKED is left alone, so adding
/// items can never re-lock the current cycle.
fn try_unlock(session: &mut Session, config: Option<&ValidatedConfig>) -> Option<SessionEventKind> {
    if session.game_status != GameStatus::Locked {
        return None;
    }
    let config = config?;
    let threshold = config.threshold_for(session.spin_count);
    if session.total_amount >= threshold {
        session.game_status = GameStatus::Unlocked;
        Some(SessionEventKind::Unlocked { cycle: session.spin_count, threshold })
    } else {
        None
    }
}

/// Append order lines and re-evaluate the unlock guard.
///
/// Without an active config the items are still recorded; the session just
/// cannot unlock until one exists.
pub fn add_items(
    session: &mut Session,
    lines: Vec<OrderLine>,
    config: Option<&ValidatedConfig>,
) -> Result<Transition, GameError> {
    ensure_open(session)?;
    if lines.is_empty() {
        return Err(GameError::InvalidOrder("order has no lines".to_string()));
    }

    let mut batch = Money::ZERO;
    for (index, line) in lines.iter().enumerate() {
        if line.menu_item_id.as_str().trim().is_empty() {
            return Err(GameError::InvalidOrder(format!("line {}: missing menu item", index)));
        }
        if line.quantity == 0 {
            return Err(GameError::InvalidOrder(format!("line {}: quantity must be at least 1", index)));
        }
        if line.unit_price.is_negative() {
            return Err(GameError::InvalidOrder(format!("line {}: negative price", index)));
        }
        batch = line
            .line_total()
            .and_then(|total| batch.checked_add(total))
            .ok_or_else(|| GameError::InvalidOrder("order total overflows".to_string()))?;
    }
    let new_total = session
        .total_amount
        .checked_add(batch)
        .ok_or_else(|| GameError::InvalidOrder("session total overflows".to_string()))?;

    let count = lines.len();
    session.items.extend(lines);
    session.total_amount = new_total;

    let mut events = vec![SessionEventKind::ItemsAdded { lines: count, total_amount: new_total }];
    events.extend(try_unlock(session, config));
    Ok(commit(session, events))
}

/// UNLOCKED → PLAYING.
pub fn mark_puzzle_solved(session: &mut Session, now: DateTime<Utc>) -> Result<Transition, GameError> {
    ensure_open(session)?;
    if session.game_status != GameStatus::Unlocked {
        return Err(not_eligible(session, "puzzle is not unlocked"));
    }

    let cycle = session.spin_count;
    session.game_status = GameStatus::Playing;
    session.puzzles.push(PuzzleRecord { cycle, solved_at: now });
    Ok(commit(session, vec![SessionEventKind::PuzzleSolved { cycle }]))
}

/// Guard for PLAYING → WON. At most one spin per cycle.
pub fn ensure_can_spin(session: &Session) -> Result<(), GameError> {
    ensure_open(session)?;
    if session.game_status != GameStatus::Playing {
        return Err(not_eligible(session, "spin requires a solved puzzle"));
    }
    if session.reward_won.is_some() {
        return Err(not_eligible(session, "reward already recorded for this cycle"));
    }
    Ok(())
}

/// PLAYING → WON. Records the outcome and closes the cycle.
///
/// Callers must have passed [`ensure_can_spin`] under the same lock.
pub fn commit_spin(
    session: &mut Session,
    selected: SelectedSlot,
    seed: Option<u64>,
    config: &ValidatedConfig,
    now: DateTime<Utc>,
) -> Result<(SpinRecord, Transition), GameError> {
    ensure_can_spin(session)?;

    let cycle = session.spin_count;
    let prev_hash = session.ledger_head();
    let mut record = SpinRecord {
        cycle,
        slot_index: selected.index,
        label: selected.slot.label.clone(),
        reward: selected.slot.reward.clone(),
        draw: selected.draw,
        seed,
        config_version: config.version,
        config_hash: config.hash,
        spun_at: now,
        prev_hash,
        hash: ZERO_HASH,
    };
    audit::seal(&session.id, &mut record);

    session.game_status = GameStatus::Won;
    session.reward_won = selected.slot.reward.clone();
    session.spin_count += 1;
    session.spins.push(record.clone());

    let events = vec![SessionEventKind::SpinResolved {
        cycle,
        slot_index: selected.index,
        label: selected.slot.label,
        reward: selected.slot.reward,
    }];
    Ok((record, commit(session, events)))
}

/// Start the next cycle: LOCKED, then re-check the new threshold at once.
fn start_next_cycle(session: &mut Session, config: Option<&ValidatedConfig>, events: &mut Transition) {
    session.game_status = GameStatus::Locked;
    events.push(SessionEventKind::CycleReset { cycle: session.spin_count });
    events.extend(try_unlock(session, config));
}

/// The bill/view refresh trigger.
///
/// - WON with a reward → REWARD_APPLIED
/// - WON without a reward → next cycle
/// - REWARD_APPLIED under [`AfterRewardPolicy::NextCycle`] → reward archived, next cycle
/// - anything else → no change
pub fn refresh_bill(
    session: &mut Session,
    config: Option<&ValidatedConfig>,
    policy: AfterRewardPolicy,
) -> Result<Transition, GameError> {
    ensure_open(session)?;
    let mut events = Vec::new();
    let cycle = session.current_cycle();

    match (session.game_status, session.reward_won.is_some(), policy) {
        (GameStatus::Won, true, _) => {
            session.game_status = GameStatus::RewardApplied;
            events.push(SessionEventKind::RewardApplied { cycle });
        }
        (GameStatus::Won, false, _) => {
            start_next_cycle(session, config, &mut events);
        }
        (GameStatus::RewardApplied, _, AfterRewardPolicy::NextCycle) => {
            if let Some(reward) = session.reward_won.take() {
                session.applied_rewards.push(reward);
            }
            start_next_cycle(session, config, &mut events);
        }
        _ => {}
    }

    Ok(commit(session, events))
}

/// Bill and close. A reward won but not yet refreshed onto the bill is
/// applied first, so the final bill always reflects it.
pub fn close(session: &mut Session, now: DateTime<Utc>) -> Result<Transition, GameError> {
    ensure_open(session)?;
    let mut events = Vec::new();

    if session.game_status == GameStatus::Won && session.reward_won.is_some() {
        session.game_status = GameStatus::RewardApplied;
        events.push(SessionEventKind::RewardApplied { cycle: session.current_cycle() });
    }

    session.status = SessionStatus::Closed;
    session.closed_at = Some(now);
    events.push(SessionEventKind::Closed { total_payable: session.bill().total_payable });
    Ok(commit(session, events))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::ScriptedDraws;
    use crate::engine::session::{SessionId, TableId};
    use crate::wheel::config::{MenuItemId, MenuSnapshot, RestaurantGameConfig, RestaurantId};
    use crate::wheel::reward::Reward;
    use crate::wheel::selector::WheelSelector;
    use crate::wheel::table::Slot;

    fn scenario_config() -> ValidatedConfig {
        let config = RestaurantGameConfig {
            unlock_initial: Money::from_major(200),
            unlock_increment: Money::from_major(50),
            slots: vec![
                Slot::empty("Try Again", 60),
                Slot::prize("10% Off", 40, Reward::percentage(10, "10% Off").unwrap()),
            ],
        };
        ValidatedConfig::new(RestaurantId::new("rest_001"), config, &MenuSnapshot::default(), 1).unwrap()
    }

    fn new_session() -> Session {
        Session::new(SessionId::new([1; 16]), RestaurantId::new("rest_001"), TableId::new("T1"))
    }

    fn line(major: i64) -> OrderLine {
        OrderLine::new(MenuItemId::new("thali"), "Thali", 1, Money::from_major(major))
    }

    fn spin(session: &mut Session, config: &ValidatedConfig, draw: u64) -> SpinRecord {
        let mut rng = ScriptedDraws::new([draw]);
        let selected = WheelSelector::select(&config.table, &mut rng);
        commit_spin(session, selected, None, config, Utc::now()).unwrap().0
    }

    #[test]
    fn test_unlock_on_threshold() {
        let config = scenario_config();
        let mut session = new_session();

        add_items(&mut session, vec![line(150)], Some(&config)).unwrap();
        assert_eq!(session.game_status, GameStatus::Locked);

        let events = add_items(&mut session, vec![line(70)], Some(&config)).unwrap();
        assert_eq!(session.total_amount, Money::from_major(220));
        assert_eq!(session.game_status, GameStatus::Unlocked);
        assert!(events.contains(&SessionEventKind::Unlocked {
            cycle: 0,
            threshold: Money::from_major(200),
        }));
        assert_eq!(session.version, 2);
    }

    #[test]
    fn test_no_unlock_without_config() {
        let mut session = new_session();
        add_items(&mut session, vec![line(500)], None).unwrap();
        assert_eq!(session.game_status, GameStatus::Locked);
        assert_eq!(session.total_amount, Money::from_major(500));
    }

    #[test]
    fn test_invalid_order_leaves_session_untouched() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(10)], Some(&config)).unwrap();
        let before = session.clone();

        let mut bad = line(300);
        bad.quantity = 0;
        let result = add_items(&mut session, vec![line(300), bad], Some(&config));
        assert!(matches!(result, Err(GameError::InvalidOrder(_))));
        assert_eq!(session, before);

        assert!(matches!(add_items(&mut session, vec![], Some(&config)), Err(GameError::InvalidOrder(_))));
        assert_eq!(session, before);
    }

    #[test]
    fn test_adding_items_never_relocks() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(220)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        add_items(&mut session, vec![line(5)], Some(&config)).unwrap();
        assert_eq!(session.game_status, GameStatus::Playing);
    }

    #[test]
    fn test_puzzle_requires_unlock() {
        let mut session = new_session();
        let result = mark_puzzle_solved(&mut session, Utc::now());
        assert!(matches!(
            result,
            Err(GameError::NotEligible { status: GameStatus::Locked, .. })
        ));
        assert_eq!(session.version, 0);
    }

    #[test]
    fn test_spin_only_from_playing() {
        let config = scenario_config();
        let mut session = new_session();
        assert!(ensure_can_spin(&session).is_err());

        add_items(&mut session, vec![line(220)], Some(&config)).unwrap();
        assert!(ensure_can_spin(&session).is_err());

        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        assert!(ensure_can_spin(&session).is_ok());

        let record = spin(&mut session, &config, 70);
        assert_eq!(record.slot_index, 1);
        assert_eq!(session.game_status, GameStatus::Won);
        assert_eq!(session.spin_count, 1);
        assert_eq!(session.reward_won, Some(Reward::percentage(10, "10% Off").unwrap()));

        let before = session.clone();
        let mut rng = ScriptedDraws::new([10]);
        let selected = WheelSelector::select(&config.table, &mut rng);
        let again = commit_spin(&mut session, selected, None, &config, Utc::now());
        assert!(matches!(again, Err(GameError::NotEligible { status: GameStatus::Won, .. })));
        assert_eq!(session, before);
    }

    #[test]
    fn test_try_again_resets_cycle() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(220)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        spin(&mut session, &config, 10);
        assert_eq!(session.game_status, GameStatus::Won);
        assert!(session.reward_won.is_none());

        let events = refresh_bill(&mut session, Some(&config), AfterRewardPolicy::Terminal).unwrap();
        assert_eq!(events, vec![SessionEventKind::CycleReset { cycle: 1 }]);
        assert_eq!(session.game_status, GameStatus::Locked);
        assert_eq!(session.spin_count, 1);

        add_items(&mut session, vec![line(29)], Some(&config)).unwrap();
        assert_eq!(session.game_status, GameStatus::Locked);
        add_items(&mut session, vec![line(1)], Some(&config)).unwrap();
        assert_eq!(session.total_amount, Money::from_major(250));
        assert_eq!(session.game_status, GameStatus::Unlocked);
    }

    #[test]
    fn test_cycle_reset_unlocks_immediately_when_already_over() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(300)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        spin(&mut session, &config, 10);
        refresh_bill(&mut session, Some(&config), AfterRewardPolicy::Terminal).unwrap();
        assert_eq!(session.game_status, GameStatus::Unlocked);
    }

    #[test]
    fn test_reward_applied_is_terminal_by_default() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(400)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        spin(&mut session, &config, 70);

        refresh_bill(&mut session, Some(&config), AfterRewardPolicy::Terminal).unwrap();
        assert_eq!(session.game_status, GameStatus::RewardApplied);
        let version = session.version;

        let events = refresh_bill(&mut session, Some(&config), AfterRewardPolicy::Terminal).unwrap();
        assert!(events.is_empty());
        assert_eq!(session.version, version);
        assert!(ensure_can_spin(&session).is_err());
    }

    #[test]
    fn test_next_cycle_policy_archives_reward() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(220)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        spin(&mut session, &config, 70);
        refresh_bill(&mut session, Some(&config), AfterRewardPolicy::NextCycle).unwrap();
        assert_eq!(session.game_status, GameStatus::RewardApplied);

        refresh_bill(&mut session, Some(&config), AfterRewardPolicy::NextCycle).unwrap();
        assert_eq!(session.game_status, GameStatus::Locked);
        assert!(session.reward_won.is_none());
        assert_eq!(session.applied_rewards.len(), 1);
        assert_eq!(session.bill().discount_total, Money::from_major(22));
    }

    #[test]
    fn test_spin_records_are_chained() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(500)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        let first = spin(&mut session, &config, 10);
        refresh_bill(&mut session, Some(&config), AfterRewardPolicy::Terminal).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        let second = spin(&mut session, &config, 20);

        assert_eq!(first.prev_hash, ZERO_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(second.cycle, 1);
        assert!(audit::verify_chain(&session.id, &session.spins).is_ok());
    }

    #[test]
    fn test_close_applies_pending_reward() {
        let config = scenario_config();
        let mut session = new_session();
        add_items(&mut session, vec![line(220)], Some(&config)).unwrap();
        mark_puzzle_solved(&mut session, Utc::now()).unwrap();
        spin(&mut session, &config, 70);

        close(&mut session, Utc::now()).unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.game_status, GameStatus::RewardApplied);
        assert_eq!(session.bill().total_payable, Money::from_major(198));

        let result = add_items(&mut session, vec![line(10)], Some(&config));
        assert!(matches!(result, Err(GameError::SessionClosed(_))));
    }
}
