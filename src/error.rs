//! Error types shared across the session crate.

use crate::state::session::InvalidTransition;

/// A request the transport provider refused to accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected to the master service")]
    NotConnected,

    #[error("client is not in a room")]
    NotInRoom,

    #[error("client is already in a room")]
    AlreadyInRoom,

    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

/// Errors raised by the session state machine and the arena manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An authority-gated operation was attempted by a non-master client.
    #[error("only the master client may load a level")]
    NotMasterClient,

    /// A room-scoped operation ran while the provider reported no room.
    #[error("no current room")]
    NoCurrentRoom,

    /// An expected singleton (e.g. the local player) is absent.
    #[error("expected {0} to be present")]
    MissingSingleton(&'static str),

    #[error("player name is empty")]
    EmptyPlayerName,

    #[error(transparent)]
    Preferences(#[from] PreferenceError),
}

/// Errors loading or validating a [`LauncherConfig`](crate::config::LauncherConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from the persisted preference store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    #[error("preference store io error: {0}")]
    Io(String),

    #[error("preference file is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for PreferenceError {
    fn from(err: std::io::Error) -> Self {
        PreferenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PreferenceError {
    fn from(err: serde_json::Error) -> Self {
        PreferenceError::Corrupt(err.to_string())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
