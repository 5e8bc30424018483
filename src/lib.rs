//! # SpinServe Game Engine
//!
//! Spend-to-unlock puzzle and prize wheel for table-side restaurant ordering.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SPINSERVE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── money.rs    - Exact minor-unit currency                 │
//! │  ├── rng.rs      - Xorshift128+ PRNG, OS entropy seeds       │
//! │  └── hash.rs     - Domain-separated SHA-256                  │
//! │                                                              │
//! │  wheel/          - Wheel definition (pure)                   │
//! │  ├── reward.rs   - Reward variants                           │
//! │  ├── table.rs    - Probability table validation              │
//! │  ├── selector.rs - Draw to slot                              │
//! │  └── config.rs   - Restaurant config, menu snapshot          │
//! │                                                              │
//! │  engine/         - Session game                              │
//! │  ├── session.rs  - Session state, bill                       │
//! │  ├── transition.rs - State machine                           │
//! │  ├── store.rs    - Versioned config store                    │
//! │  ├── events.rs   - Committed transition events               │
//! │  └── mod.rs      - GameEngine, per-session locking           │
//! │                                                              │
//! │  audit/          - Hash-chained spin ledger, replay          │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fairness Guarantee
//!
//! - One uniform draw in `[0, 100)` per spin, mapped onto half-open slot
//!   intervals, so each slot wins with exactly its configured probability
//! - Production seeds come from the OS CSPRNG and are recorded with the draw
//! - Every spin is chained into a per-session ledger that can be replayed
//! - At most one spin resolves per cycle per session

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod core;
pub mod engine;
pub mod network;
pub mod wheel;

// Re-export commonly used types
pub use crate::config::{AfterRewardPolicy, EngineConfig, ServerConfig};
pub use crate::core::money::Money;
pub use crate::core::rng::{DeterministicRng, RandomSource};
pub use engine::{GameEngine, GameError, GameStatus, Session, SessionId, SessionSnapshot, SpinOutcome};
pub use wheel::{ConfigError, RestaurantGameConfig, Reward, Slot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
