//! Client session state machine.
//!
//! Tracks where the local client is in the connect → match → room lifecycle
//! and validates transitions.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────┐  begin_connect   ┌────────────┐
//! │   Idle   │─────────────────▶│ Connecting │◀─────────────────┐
//! └────┬─────┘                  └─────┬──────┘                  │
//!      │                              │ master_reached          │
//!      │ master_reached               ▼                         │
//!      │                     ┌───────────────────┐              │
//!      └────────────────────▶│ ConnectedToMaster │◀──────┐      │
//!                            └─────────┬─────────┘       │      │
//!                                      │ begin_matchmaking│      │
//!                                      ▼                 │      │
//!                            ┌───────────────────┐ create│      │
//!                 join_failed│    Matchmaking    │ failed│      │
//!                  ┌────────▶│                   │───────┘      │
//!                  └─────────└─────────┬─────────┘              │
//!                                      │ joined_room            │
//!                                      ▼                        │
//!                            ┌───────────────────┐  left_room   │
//!                            │      InRoom       │──────────────┘
//!                            └───────────────────┘
//!
//!   any ── disconnected ──▶ Disconnected ── begin_connect ──▶ Connecting
//! ```

use std::fmt;

use serde::Serialize;

/// Where the local client is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSessionState {
    /// Launcher shown, nothing requested yet
    #[default]
    Idle,

    /// Connect request sent, waiting for the master service
    Connecting,

    /// Connected to the master service, not matchmaking
    ConnectedToMaster,

    /// Join or create request in flight
    Matchmaking,

    /// Member of a room
    InRoom,

    /// Connection lost or refused
    Disconnected,
}

impl ClientSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::ConnectedToMaster => "connected_to_master",
            Self::Matchmaking => "matchmaking",
            Self::InRoom => "in_room",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether the launcher accepts a new `Connect()` in this state.
    pub fn accepts_connect(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::ConnectedToMaster | Self::Disconnected
        )
    }

    pub fn is_in_room(&self) -> bool {
        matches!(self, Self::InRoom)
    }
}

impl fmt::Display for ClientSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    BeginConnect,
    MasterReached,
    BeginMatchmaking,
    JoinRandomFailed,
    MatchmakingAborted,
    JoinedRoom,
    LeftRoom,
    Disconnected,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ClientSessionState,
    pub transition: Transition,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.transition, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Session state machine.
///
/// Exactly one per client process, owned by the connection coordinator.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    current: ClientSessionState,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state machine at a specific state (for restoring state).
    pub fn at(current: ClientSessionState) -> Self {
        Self { current }
    }

    pub fn current(&self) -> ClientSessionState {
        self.current
    }

    /// Apply a transition, returning the new state or an error.
    pub fn apply(&self, transition: Transition) -> Result<Self, InvalidTransition> {
        Ok(Self {
            current: self.next(&transition)?,
        })
    }

    /// Apply a transition in place, returning error if invalid.
    pub fn apply_mut(&mut self, transition: Transition) -> Result<(), InvalidTransition> {
        self.current = self.next(&transition)?;
        Ok(())
    }

    fn next(&self, transition: &Transition) -> Result<ClientSessionState, InvalidTransition> {
        use ClientSessionState::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.current,
            transition: transition.clone(),
            reason,
        };

        match (self.current, transition) {
            // BeginConnect: also from ConnectedToMaster when the provider
            // has since lost the master connection
            (Idle | ConnectedToMaster | Disconnected, Transition::BeginConnect) => Ok(Connecting),
            (Connecting | Matchmaking, Transition::BeginConnect) => {
                Err(invalid("Connection attempt already in progress"))
            }
            (InRoom, Transition::BeginConnect) => Err(invalid("Already in a room")),

            // MasterReached: anything outside matchmaking and rooms
            (Idle | Connecting | ConnectedToMaster | Disconnected, Transition::MasterReached) => {
                Ok(ConnectedToMaster)
            }
            (Matchmaking, Transition::MasterReached) => Err(invalid("Already matchmaking")),
            (InRoom, Transition::MasterReached) => Err(invalid("Already in a room")),

            // BeginMatchmaking: only from ConnectedToMaster
            (ConnectedToMaster, Transition::BeginMatchmaking) => Ok(Matchmaking),
            (Matchmaking, Transition::BeginMatchmaking) => Err(invalid("Already matchmaking")),
            (InRoom, Transition::BeginMatchmaking) => Err(invalid("Already in a room")),
            (_, Transition::BeginMatchmaking) => Err(invalid("Must connect to master first")),

            // JoinRandomFailed: stays in Matchmaking (create follows)
            (Matchmaking, Transition::JoinRandomFailed) => Ok(Matchmaking),
            (_, Transition::JoinRandomFailed) => Err(invalid("Not matchmaking")),

            // MatchmakingAborted: back to master, user must retry
            (Matchmaking, Transition::MatchmakingAborted) => Ok(ConnectedToMaster),
            (_, Transition::MatchmakingAborted) => Err(invalid("Not matchmaking")),

            // JoinedRoom: Matchmaking -> InRoom
            (Matchmaking, Transition::JoinedRoom) => Ok(InRoom),
            (InRoom, Transition::JoinedRoom) => Err(invalid("Already in a room")),
            (_, Transition::JoinedRoom) => Err(invalid("Not matchmaking")),

            // LeftRoom: provider returns to master afterwards
            (InRoom, Transition::LeftRoom) => Ok(Connecting),
            (_, Transition::LeftRoom) => Err(invalid("Not in a room")),

            // Disconnected: Any -> Disconnected
            (_, Transition::Disconnected) => Ok(Disconnected),
        }
    }

    pub fn accepts_connect(&self) -> bool {
        self.current.accepts_connect()
    }

    pub fn is_in_room(&self) -> bool {
        self.current.is_in_room()
    }
}
