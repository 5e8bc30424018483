//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! One JSON text frame per message. Requests carry an optional
//! `request_id` that the matching response echoes back; pushed events
//! carry none.

use serde::{Serialize, Deserialize};

use crate::audit::VerificationReport;
use crate::engine::{Bill, ConfigView, GameError, OrderLine, SessionEvent, SessionId, SessionSnapshot, SpinOutcome, TableId};
use crate::wheel::config::{MenuSnapshot, RestaurantGameConfig, RestaurantId};
use crate::wheel::table::ConfigError;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// A request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// The request itself.
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Requests a client can make.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Seat a table.
    OpenSession {
        /// Restaurant.
        restaurant_id: RestaurantId,
        /// Table.
        table_id: TableId,
    },

    /// Append order lines.
    AddOrderItems {
        /// Session.
        session_id: SessionId,
        /// Lines to add.
        items: Vec<OrderLine>,
    },

    /// Puzzle completed.
    MarkPuzzleSolved {
        /// Session.
        session_id: SessionId,
    },

    /// Spin the wheel.
    RequestSpin {
        /// Session.
        session_id: SessionId,
    },

    /// Poll a session.
    GetSession {
        /// Session.
        session_id: SessionId,
    },

    /// Bill/view refresh.
    RefreshBill {
        /// Session.
        session_id: SessionId,
    },

    /// Read the bill.
    GetBill {
        /// Session.
        session_id: SessionId,
    },

    /// Bill and close.
    CloseSession {
        /// Session.
        session_id: SessionId,
    },

    /// Open sessions, optionally for one restaurant.
    ListOpenSessions {
        /// Filter.
        #[serde(default)]
        restaurant_id: Option<RestaurantId>,
    },

    /// Read the stored wheel config.
    GetGameConfig {
        /// Restaurant.
        restaurant_id: RestaurantId,
    },

    /// Save a wheel config.
    SetGameConfig {
        /// Restaurant.
        restaurant_id: RestaurantId,
        /// New config.
        config: RestaurantGameConfig,
        /// Menu to resolve free-item rewards against.
        #[serde(default)]
        menu: MenuSnapshot,
    },

    /// Menu changed; re-check the stored config.
    UpdateMenu {
        /// Restaurant.
        restaurant_id: RestaurantId,
        /// Current menu.
        menu: MenuSnapshot,
    },

    /// Verify a session's spin ledger.
    AuditSession {
        /// Session.
        session_id: SessionId,
    },

    /// Stream events for a session on this connection.
    Watch {
        /// Session.
        session_id: SessionId,
    },

    /// Stop streaming events for a session.
    Unwatch {
        /// Session.
        session_id: SessionId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session snapshot.
    Session {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Snapshot.
        session: SessionSnapshot,
    },

    /// Several snapshots.
    Sessions {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Snapshots in id order.
        sessions: Vec<SessionSnapshot>,
    },

    /// Spin committed.
    Spin {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Outcome.
        outcome: SpinOutcome,
    },

    /// A bill.
    Bill {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Bill.
        bill: Bill,
    },

    /// Stored wheel config.
    GameConfig {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Config and its state.
        config: ConfigView,
    },

    /// Config saved.
    ConfigSaved {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Restaurant.
        restaurant_id: RestaurantId,
        /// New version.
        version: u64,
    },

    /// Result of a menu update.
    MenuChecked {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Restaurant.
        restaurant_id: RestaurantId,
        /// Why the stored config is now unusable, if it is.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        problem: Option<String>,
    },

    /// Ledger verification result.
    Audit {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Report.
        report: VerificationReport,
    },

    /// Watch started or stopped.
    Watching {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Session.
        session_id: SessionId,
        /// Whether events now stream.
        active: bool,
    },

    /// Pushed session event.
    Event(SessionEvent),

    /// Pong response.
    Pong {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Client timestamp.
        timestamp: u64,
        /// Server time, ms since epoch.
        server_time: u64,
    },

    /// Request failed.
    Error {
        /// Request answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        /// Error code.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Not allowed in the current game status.
    NotEligible,
    /// Unknown session.
    SessionNotFound,
    /// Lost a race; retry.
    ConcurrencyConflict,
    /// Wheel config rejected or unusable.
    InvalidConfig,
    /// No wheel config stored.
    ConfigMissing,
    /// Order lines rejected.
    InvalidOrder,
    /// Session closed.
    SessionClosed,
    /// Frame could not be parsed.
    InvalidRequest,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&GameError> for ErrorCode {
    fn from(e: &GameError) -> Self {
        match e {
            GameError::NotEligible { .. } => Self::NotEligible,
            GameError::SessionNotFound(_) => Self::SessionNotFound,
            GameError::ConcurrencyConflict(_) => Self::ConcurrencyConflict,
            GameError::InvalidConfig(_) => Self::InvalidConfig,
            GameError::ConfigMissing(_) => Self::ConfigMissing,
            GameError::InvalidOrder(_) => Self::InvalidOrder,
            GameError::SessionClosed(_) => Self::SessionClosed,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Wrap a request.
    pub fn new(request_id: Option<u64>, request: ClientRequest) -> Self {
        Self { request_id, request }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Error response for a failed engine call.
    pub fn game_error(request_id: Option<u64>, e: &GameError) -> Self {
        Self::Error {
            request_id,
            code: ErrorCode::from(e),
            message: e.to_string(),
        }
    }

    /// Error response for a rejected config save.
    pub fn config_error(request_id: Option<u64>, e: &ConfigError) -> Self {
        Self::Error {
            request_id,
            code: ErrorCode::InvalidConfig,
            message: e.to_string(),
        }
    }

    /// Error response with an explicit code.
    pub fn error(request_id: Option<u64>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { request_id, code, message: message.into() }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
