//! Game Engine
//!
//! Orchestrates the per-session game over many concurrent requests.
//!
//! ```text
//!   request ──► sessions map (RwLock) ──► session (Mutex, lock_timeout)
//!                                              │
//!                     config store (RwLock) ◄──┤ read active config
//!                                              │
//!                              transition::* ──┤ validate, mutate, version++
//!                                              │
//!                     events broadcast ◄───────┤ still under the guard
//!                                              │
//!                                     guard dropped
//! ```
//!
//! Every operation reads, decides, and writes under one session guard, so
//! two requests on the same session are linearized and no reader ever sees
//! a half-applied transition. Different sessions never share a lock.

pub mod events;
pub mod session;
pub mod store;
pub mod transition;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use serde::{Serialize, Deserialize};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::audit::{verify_session, VerificationReport};
use crate::config::EngineConfig;
use crate::core::hash::short_hex;
use crate::core::rng::{DeterministicRng, OsEntropy, RandomSource, SeedSource};
use crate::wheel::config::{RestaurantId, ValidatedConfig};
use crate::wheel::reward::Reward;
use crate::wheel::selector::WheelSelector;
use crate::wheel::table::ConfigError;

pub use events::{SessionEvent, SessionEventKind};
pub use session::{
    Bill, GameStatus, OrderLine, Session, SessionId, SessionSnapshot, SessionStatus, SpinRecord,
    TableId,
};
pub use store::{ConfigStore, ConfigView};
use transition::Transition;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors returned by engine operations. None of them mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Operation not allowed in the current game status.
    #[error("not eligible in {status}: {reason}")]
    NotEligible {
        /// Status at the time of the request.
        status: GameStatus,
        /// What is missing.
        reason: &'static str,
    },

    /// Unknown session id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// Lost the race for the session, or the config kept changing under a
    /// spin. Retry against fresh state.
    #[error("concurrent modification of session {0}, retry")]
    ConcurrencyConflict(SessionId),

    /// The restaurant's wheel config is invalid. Staff must fix it.
    #[error("invalid wheel config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The restaurant has no wheel config.
    #[error("no wheel config for restaurant {0}")]
    ConfigMissing(RestaurantId),

    /// Order lines rejected.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Session already billed and closed.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),
}

impl GameError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotEligible { .. } => "not_eligible",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::InvalidConfig(_) => "invalid_config",
            Self::ConfigMissing(_) => "config_missing",
            Self::InvalidOrder(_) => "invalid_order",
            Self::SessionClosed(_) => "session_closed",
        }
    }

    /// True if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a committed spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOutcome {
    /// Winning slot index.
    pub slot_index: usize,
    /// Winning slot label.
    pub label: String,
    /// Prize, or `None` for "try again".
    pub reward: Option<Reward>,
    /// Ledger entry written for the spin.
    pub record: SpinRecord,
    /// Session after the spin.
    pub session: SessionSnapshot,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The game engine. Cheap to share behind an `Arc`.
pub struct GameEngine {
    config: EngineConfig,
    configs: Arc<ConfigStore>,
    sessions: RwLock<BTreeMap<SessionId, Arc<Mutex<Session>>>>,
    seeds: Arc<dyn SeedSource>,
    events: broadcast::Sender<SessionEvent>,
}

impl GameEngine {
    /// Create an engine seeding spins from OS entropy.
    pub fn new(config: EngineConfig, configs: Arc<ConfigStore>) -> Self {
        Self::with_seed_source(config, configs, Arc::new(OsEntropy))
    }

    /// Create an engine with a custom seed source.
    pub fn with_seed_source(
        config: EngineConfig,
        configs: Arc<ConfigStore>,
        seeds: Arc<dyn SeedSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            configs,
            sessions: RwLock::new(BTreeMap::new()),
            seeds,
            events,
        }
    }

    /// Engine settings.
    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    /// The config store the engine reads from.
    pub fn configs(&self) -> &Arc<ConfigStore> {
        &self.configs
    }

    /// Subscribe to committed transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of sessions held, open or closed.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Acquire a session's guard, giving up after `lock_timeout`.
    async fn lock(&self, id: &SessionId) -> Result<OwnedMutexGuard<Session>, GameError> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(id).cloned().ok_or(GameError::SessionNotFound(*id))?
        };
        self.lock_slot(id, slot).await
    }

    async fn lock_slot(
        &self,
        id: &SessionId,
        slot: Arc<Mutex<Session>>,
    ) -> Result<OwnedMutexGuard<Session>, GameError> {
        match tokio::time::timeout(self.config.lock_timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!("Session {} lock wait exceeded {:?}", short_hex(id.as_bytes()), self.config.lock_timeout);
                Err(GameError::ConcurrencyConflict(*id))
            }
        }
    }

    fn stamp(session: &Session, kinds: Transition) -> Vec<SessionEvent> {
        let at = Utc::now();
        kinds
            .into_iter()
            .map(|kind| SessionEvent {
                session_id: session.id,
                version: session.version,
                game_status: session.game_status,
                at,
                kind,
            })
            .collect()
    }

    /// Callers hold the session guard, so subscribers see commit order.
    fn publish(&self, events: Vec<SessionEvent>) {
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
    }

    /// Run one transition under the session guard and publish its events.
    async fn apply<F>(&self, id: SessionId, op: &'static str, f: F) -> Result<SessionSnapshot, GameError>
    where
        F: FnOnce(&mut Session, Option<&ValidatedConfig>) -> Result<Transition, GameError>,
    {
        let mut session = self.lock(&id).await?;
        let config = self.configs.try_active(&session.restaurant_id).await;
        let before = session.game_status;

        let kinds = match f(&mut *session, config.as_deref()) {
            Ok(kinds) => kinds,
            Err(e) => {
                debug!("Session {} {} rejected: {}", short_hex(id.as_bytes()), op, e);
                return Err(e);
            }
        };

        let snapshot = session.snapshot(config.as_deref());
        self.publish(Self::stamp(&session, kinds));
        drop(session);

        let after = snapshot.session.game_status;
        if before != after {
            info!("Session {} {}: {} -> {}", short_hex(id.as_bytes()), op, before, after);
        } else {
            debug!("Session {} {} (v{})", short_hex(id.as_bytes()), op, snapshot.session.version);
        }
        Ok(snapshot)
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Seat a table. The new session starts LOCKED with nothing ordered.
    #[instrument(skip(self))]
    pub async fn open_session(&self, restaurant_id: RestaurantId, table_id: TableId) -> SessionSnapshot {
        let id = SessionId::generate();
        let session = Session::new(id, restaurant_id, table_id);
        let config = self.configs.try_active(&session.restaurant_id).await;
        let snapshot = session.snapshot(config.as_deref());
        let events = Self::stamp(&session, vec![SessionEventKind::Opened]);

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id, Arc::new(Mutex::new(session)));
            // Published before any other operation can reach the session.
            self.publish(events);
        }
        info!(
            "Opened session {} for {} table {}",
            short_hex(id.as_bytes()),
            snapshot.session.restaurant_id,
            snapshot.session.table_id.as_str()
        );
        snapshot
    }

    /// Append order lines. May unlock the current cycle.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn add_order_items(&self, id: SessionId, lines: Vec<OrderLine>) -> Result<SessionSnapshot, GameError> {
        self.apply(id, "add_order_items", move |session, config| {
            transition::add_items(session, lines, config)
        })
        .await
    }

    /// Puzzle completed: UNLOCKED → PLAYING.
    #[instrument(skip(self))]
    pub async fn mark_puzzle_solved(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        self.apply(id, "mark_puzzle_solved", |session, _| {
            transition::mark_puzzle_solved(session, Utc::now())
        })
        .await
    }

    /// Bill/view refresh: applies a won reward or starts the next cycle.
    #[instrument(skip(self))]
    pub async fn refresh_bill(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        let policy = self.config.after_reward;
        self.apply(id, "refresh_bill", move |session, config| {
            transition::refresh_bill(session, config, policy)
        })
        .await
    }

    /// Bill and close the session. Further writes are rejected.
    #[instrument(skip(self))]
    pub async fn close_session(&self, id: SessionId) -> Result<Bill, GameError> {
        let snapshot = self
            .apply(id, "close_session", |session, _| transition::close(session, Utc::now()))
            .await?;
        Ok(snapshot.session.bill())
    }

    /// Read-only view.
    pub async fn get_session(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        let session = self.lock(&id).await?;
        let config = self.configs.try_active(&session.restaurant_id).await;
        Ok(session.snapshot(config.as_deref()))
    }

    /// Current bill, without triggering any transition.
    pub async fn get_bill(&self, id: SessionId) -> Result<Bill, GameError> {
        let session = self.lock(&id).await?;
        Ok(session.bill())
    }

    /// Open sessions, optionally for one restaurant, in id order.
    ///
    /// A session whose guard cannot be taken within `lock_timeout` is left
    /// out of the listing.
    pub async fn list_open_sessions(&self, restaurant_id: Option<&RestaurantId>) -> Vec<SessionSnapshot> {
        let slots: Vec<(SessionId, Arc<Mutex<Session>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();
        let mut snapshots = Vec::new();
        for (id, slot) in slots {
            let session = match self.lock_slot(&id, slot).await {
                Ok(session) => session,
                Err(_) => continue,
            };
            if !session.is_open() {
                continue;
            }
            if restaurant_id.map_or(false, |rid| rid != &session.restaurant_id) {
                continue;
            }
            let config = self.configs.try_active(&session.restaurant_id).await;
            snapshots.push(session.snapshot(config.as_deref()));
        }
        snapshots
    }

    /// Drop closed sessions older than `retention`. Returns how many went.
    pub async fn purge_closed(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| {
            // Locked sessions are skipped until the next round.
            let closed_at = match slot.try_lock() {
                Ok(session) => session.closed_at,
                Err(_) => return true,
            };
            match closed_at {
                Some(closed_at) => now
                    .signed_duration_since(closed_at)
                    .to_std()
                    .map(|age| age < retention)
                    .unwrap_or(true),
                None => true,
            }
        });
        let purged = before - sessions.len();
        if purged > 0 {
            info!("Purged {} closed sessions", purged);
        }
        purged
    }

    // =========================================================================
    // SPINS
    // =========================================================================

    /// Spin with a fresh seed from the engine's seed source.
    ///
    /// The seed is recorded on the ledger, so the outcome can be replayed.
    #[instrument(skip(self))]
    pub async fn request_spin(&self, id: SessionId) -> Result<SpinOutcome, GameError> {
        self.spin::<DeterministicRng>(id, None).await
    }

    /// Spin drawing from a caller-supplied source. No seed is recorded.
    pub async fn request_spin_with<R: RandomSource + Send>(
        &self,
        id: SessionId,
        rng: &mut R,
    ) -> Result<SpinOutcome, GameError> {
        self.spin(id, Some(rng)).await
    }

    async fn spin<R: RandomSource + Send>(
        &self,
        id: SessionId,
        mut rng: Option<&mut R>,
    ) -> Result<SpinOutcome, GameError> {
        let mut session = self.lock(&id).await?;
        if let Err(e) = transition::ensure_can_spin(&session) {
            debug!("Session {} spin rejected: {}", short_hex(id.as_bytes()), e);
            return Err(e);
        }
        let restaurant_id = session.restaurant_id.clone();

        let mut retries = 0;
        let (config, selected, seed) = loop {
            let config = match self.configs.active(&restaurant_id).await {
                Ok(config) => config,
                Err(e) => {
                    warn!("Session {} cannot spin: {}", short_hex(id.as_bytes()), e);
                    return Err(e);
                }
            };

            let (selected, seed) = match rng.as_deref_mut() {
                Some(rng) => (WheelSelector::select(&config.table, rng), None),
                None => {
                    let seed = self.seeds.next_seed();
                    let mut seeded = DeterministicRng::new(seed);
                    (WheelSelector::select(&config.table, &mut seeded), Some(seed))
                }
            };

            if self.configs.current_version(&restaurant_id).await == config.version {
                break (config, selected, seed);
            }

            retries += 1;
            if retries > self.config.spin_retries {
                warn!(
                    "Session {} spin abandoned, config changed {} times",
                    short_hex(id.as_bytes()),
                    retries
                );
                return Err(GameError::ConcurrencyConflict(id));
            }
            debug!(
                "Session {} config changed during spin, retry {}/{}",
                short_hex(id.as_bytes()),
                retries,
                self.config.spin_retries
            );
        };

        let (record, kinds) = transition::commit_spin(&mut session, selected, seed, &config, Utc::now())?;
        let snapshot = session.snapshot(Some(config.as_ref()));
        self.publish(Self::stamp(&session, kinds));
        drop(session);

        info!(
            "Session {} spin: draw {} -> slot {} '{}' (config v{}, {})",
            short_hex(id.as_bytes()),
            record.draw,
            record.slot_index,
            record.label,
            record.config_version,
            short_hex(&record.hash)
        );

        Ok(SpinOutcome {
            slot_index: record.slot_index,
            label: record.label.clone(),
            reward: record.reward.clone(),
            record,
            session: snapshot,
        })
    }

    /// Verify a session's spin ledger against the active config.
    pub async fn audit_session(&self, id: SessionId) -> Result<VerificationReport, GameError> {
        let session = self.lock(&id).await?.clone();
        let config = self.configs.try_active(&session.restaurant_id).await;
        let configs: Vec<&ValidatedConfig> = config.as_deref().into_iter().collect();
        let report = verify_session(&session, &configs);
        if !report.is_valid() {
            warn!("Session {} ledger failed verification: {:?}", short_hex(id.as_bytes()), report.errors);
        }
        Ok(report)
    }
}

// =============================================================================
// TESTS
// =============================================================================
