//! Contracts of the external collaborators.
//!
//! The session transport provider owns room discovery, relay and
//! master-client election. The scene host owns physics queries and local
//! scene loading. Both are consumed through narrow traits so the state
//! machines can be driven by a real SDK binding or by the in-process
//! [`LoopbackRelay`](super::loopback::LoopbackRelay).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::arena::{ArenaIdentifier, Rotation, Vec3};
use super::room::RoomDescriptor;
use super::SessionEvent;
use crate::error::TransportError;

pub type TransportResult<T> = Result<T, TransportError>;

/// Provider-assigned player number within a room.
pub type ActorId = u32;

/// Identifier of a replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetworkObjectId(pub u32);

impl fmt::Display for NetworkObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options for a room this client creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomOptions {
    pub max_players: u8,
    pub is_visible: bool,
    pub is_open: bool,
}

impl RoomOptions {
    pub fn with_max_players(max_players: u8) -> Self {
        Self {
            max_players,
            is_visible: true,
            is_open: true,
        }
    }
}

/// Why the provider dropped the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisconnectCause {
    None,
    ExceptionOnConnect,
    ServerTimeout,
    ClientTimeout,
    DisconnectByServerLogic,
    DisconnectByClientLogic,
    InvalidAuthentication,
    MaxCcuReached,
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::None => "none",
            Self::ExceptionOnConnect => "could not reach the server",
            Self::ServerTimeout => "server timed out",
            Self::ClientTimeout => "client timed out",
            Self::DisconnectByServerLogic => "disconnected by server",
            Self::DisconnectByClientLogic => "disconnected by client",
            Self::InvalidAuthentication => "authentication rejected",
            Self::MaxCcuReached => "server is full",
        };
        f.write_str(text)
    }
}

/// A scene the host can load without network synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SceneRef {
    Index(u32),
    Name(String),
}

impl fmt::Display for SceneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "scene #{}", index),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// The managed-relay session provider.
///
/// Requests are asynchronous: a successful return only means the request
/// was accepted. Outcomes arrive later as [`SessionEvent`](super::SessionEvent)s.
pub trait SessionTransport {
    /// Whether the master service connection is up.
    fn is_connected(&self) -> bool;

    /// Whether this client is currently the room's master. Ground truth;
    /// callers must not cache it.
    fn is_master_client(&self) -> bool;

    fn current_room(&self) -> Option<&RoomDescriptor>;

    fn connect(&mut self, compatibility_version: &str) -> TransportResult<()>;

    fn join_random_room(&mut self) -> TransportResult<()>;

    fn create_room(&mut self, options: RoomOptions) -> TransportResult<()>;

    /// Load a level. Mirrored to every room member when automatic scene
    /// sync is enabled.
    fn load_level(&mut self, arena: &ArenaIdentifier) -> TransportResult<()>;

    fn leave_room(&mut self) -> TransportResult<()>;

    /// Spawn an entity replicated to every room member.
    fn instantiate(
        &mut self,
        prefab: &str,
        position: Vec3,
        rotation: Rotation,
    ) -> TransportResult<NetworkObjectId>;

    fn set_automatically_sync_scene(&mut self, enabled: bool);

    fn set_nickname(&mut self, nickname: &str);

    /// Next queued callback, if any. Bindings that push callbacks through
    /// [`ClientSession::handle`](super::ClientSession::handle) directly can
    /// keep the default.
    fn poll_event(&mut self) -> Option<SessionEvent> {
        None
    }
}

/// The engine side: physics queries and local scene loads.
pub trait SceneHost {
    /// Whether anything solid lies within `max_distance` straight below
    /// `origin`.
    fn raycast_down(&self, origin: Vec3, max_distance: f32) -> bool;

    /// Load a scene for this client only.
    fn load_scene(&mut self, scene: &SceneRef);

    /// Move an entity to a new position.
    fn relocate(&mut self, object: NetworkObjectId, position: Vec3);
}
