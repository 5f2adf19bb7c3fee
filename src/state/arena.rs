//! Arena session management.
//!
//! Runs once the client is in a room: spawns the local player, keeps it
//! inside the arena across reloads, and, on the master client only, reloads
//! the arena whenever room membership changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::room::RoomPlayer;
use super::transport::{NetworkObjectId, SceneHost, SceneRef, SessionTransport};
use crate::config::LauncherConfig;
use crate::error::{SessionError, SessionResult};

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Name of the arena level for a given room population.
///
/// Every client derives the same identifier from the same player count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArenaIdentifier(String);

impl ArenaIdentifier {
    pub fn for_player_count(player_count: u8) -> Self {
        Self(format!("Room for {}", player_count))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArenaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The replicated entity representing this client's player.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayerHandle {
    pub object_id: NetworkObjectId,
    pub prefab: String,
    pub position: Vec3,
}

/// Process-wide record of the local player instance.
///
/// Outlives individual arena scenes so a reload does not spawn a second
/// player. Cleared only when the room is left.
#[derive(Debug, Default)]
pub struct LocalPlayerRegistry {
    local: Option<LocalPlayerHandle>,
}

impl LocalPlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&LocalPlayerHandle> {
        self.local.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut LocalPlayerHandle> {
        self.local.as_mut()
    }

    pub fn is_registered(&self) -> bool {
        self.local.is_some()
    }

    /// Register the local player. Returns false, leaving the existing
    /// handle in place, if one is already registered.
    pub fn register(&mut self, handle: LocalPlayerHandle) -> bool {
        if self.local.is_some() {
            return false;
        }
        self.local = Some(handle);
        true
    }

    pub fn clear(&mut self) -> Option<LocalPlayerHandle> {
        self.local.take()
    }
}

/// Proof that this client was the master client when the operation started.
///
/// Acquire it at the start of every authority-gated operation; the role can
/// move between events.
#[derive(Debug)]
pub struct HostAuthority {
    _private: (),
}

impl HostAuthority {
    pub fn acquire<T: SessionTransport + ?Sized>(transport: &T) -> SessionResult<Self> {
        if transport.is_master_client() {
            Ok(Self { _private: () })
        } else {
            Err(SessionError::NotMasterClient)
        }
    }
}

/// What happened to the local player on scene entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEntry {
    /// A new local player was instantiated
    Spawned { object_id: NetworkObjectId, relocated: bool },

    /// A local player already existed and was kept
    AlreadyPresent { object_id: NetworkObjectId, relocated: bool },

    /// No prefab is configured; spawning is off for this session
    SpawnDisabled,
}

impl SceneEntry {
    pub fn object_id(&self) -> Option<NetworkObjectId> {
        match self {
            Self::Spawned { object_id, .. } | Self::AlreadyPresent { object_id, .. } => {
                Some(*object_id)
            }
            Self::SpawnDisabled => None,
        }
    }

    pub fn relocated(&self) -> bool {
        match self {
            Self::Spawned { relocated, .. } | Self::AlreadyPresent { relocated, .. } => *relocated,
            Self::SpawnDisabled => false,
        }
    }
}

/// Per-room arena controller.
///
/// Owned by the client session and kept across arena reloads; dropped when
/// the client returns to the launcher.
#[derive(Debug)]
pub struct ArenaSessionManager {
    player_prefab: Option<String>,
    spawn_point: Vec3,
    fallback_position: Vec3,
    ground_check_distance: f32,
    launcher_scene: SceneRef,
    spawn_disabled: bool,
    current_arena: Option<String>,
    reloads_issued: u32,
}

impl ArenaSessionManager {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            player_prefab: config.player_prefab.clone(),
            spawn_point: config.spawn_point,
            fallback_position: config.fallback_position,
            ground_check_distance: config.ground_check_distance,
            launcher_scene: config.launcher_scene.clone(),
            spawn_disabled: false,
            current_arena: None,
            reloads_issued: 0,
        }
    }

    /// Arena scene most recently entered.
    pub fn current_arena(&self) -> Option<&str> {
        self.current_arena.as_deref()
    }

    /// Number of synchronized reloads this client has issued.
    pub fn reloads_issued(&self) -> u32 {
        self.reloads_issued
    }

    pub fn is_spawn_disabled(&self) -> bool {
        self.spawn_disabled
    }

    /// Run on every arena scene load.
    ///
    /// Spawns the local player unless one is already registered, then
    /// checks it is standing on something.
    pub fn enter_scene<T, S>(
        &mut self,
        arena: &str,
        transport: &mut T,
        scene: &mut S,
        registry: &mut LocalPlayerRegistry,
    ) -> SessionResult<SceneEntry>
    where
        T: SessionTransport + ?Sized,
        S: SceneHost + ?Sized,
    {
        self.current_arena = Some(arena.to_string());

        let prefab = match (&self.player_prefab, self.spawn_disabled) {
            (Some(prefab), false) => prefab.clone(),
            _ => {
                if !self.spawn_disabled {
                    error!(
                        arena,
                        "Missing player prefab reference, local player will not be spawned"
                    );
                    self.spawn_disabled = true;
                }
                return Ok(SceneEntry::SpawnDisabled);
            }
        };

        if let Some(existing) = registry.get() {
            let object_id = existing.object_id;
            debug!(arena, %object_id, "Local player already present, skipping spawn");
            let relocated = self.recover_local_player(scene, registry)?;
            return Ok(SceneEntry::AlreadyPresent {
                object_id,
                relocated,
            });
        }

        info!(arena, prefab = %prefab, "Instantiating local player");
        let object_id = transport.instantiate(&prefab, self.spawn_point, Rotation::IDENTITY)?;
        registry.register(LocalPlayerHandle {
            object_id,
            prefab,
            position: self.spawn_point,
        });

        let relocated = self.recover_local_player(scene, registry)?;
        Ok(SceneEntry::Spawned {
            object_id,
            relocated,
        })
    }

    /// Move the local player back to the fallback position if there is no
    /// ground close enough below it. Returns whether it moved.
    pub fn recover_local_player<S>(
        &self,
        scene: &mut S,
        registry: &mut LocalPlayerRegistry,
    ) -> SessionResult<bool>
    where
        S: SceneHost + ?Sized,
    {
        let handle = registry
            .get_mut()
            .ok_or(SessionError::MissingSingleton("local player"))?;

        if scene.raycast_down(handle.position, self.ground_check_distance) {
            return Ok(false);
        }

        warn!(
            object_id = %handle.object_id,
            from = %handle.position,
            to = %self.fallback_position,
            "Local player outside the arena, moving to safe position"
        );
        handle.position = self.fallback_position;
        scene.relocate(handle.object_id, self.fallback_position);
        Ok(true)
    }

    pub fn on_player_entered<T>(
        &mut self,
        other: &RoomPlayer,
        transport: &mut T,
    ) -> SessionResult<Option<ArenaIdentifier>>
    where
        T: SessionTransport + ?Sized,
    {
        info!(actor_id = other.actor_id, nickname = %other.nickname, "Player entered room");
        self.reload_for_membership(transport)
    }

    pub fn on_player_left<T>(
        &mut self,
        other: &RoomPlayer,
        transport: &mut T,
    ) -> SessionResult<Option<ArenaIdentifier>>
    where
        T: SessionTransport + ?Sized,
    {
        info!(actor_id = other.actor_id, nickname = %other.nickname, "Player left room");
        self.reload_for_membership(transport)
    }

    fn reload_for_membership<T>(&mut self, transport: &mut T) -> SessionResult<Option<ArenaIdentifier>>
    where
        T: SessionTransport + ?Sized,
    {
        let authority = match HostAuthority::acquire(&*transport) {
            Ok(authority) => authority,
            Err(_) => {
                debug!("Not the master client, leaving the arena reload to the host");
                return Ok(None);
            }
        };
        self.load_arena(&authority, transport).map(Some)
    }

    /// Issue a synchronized load of the arena matching the current player
    /// count.
    pub fn load_arena<T>(
        &mut self,
        _authority: &HostAuthority,
        transport: &mut T,
    ) -> SessionResult<ArenaIdentifier>
    where
        T: SessionTransport + ?Sized,
    {
        let arena = transport
            .current_room()
            .ok_or(SessionError::NoCurrentRoom)?
            .arena();

        info!(arena = %arena, "Loading arena for room population");
        transport.load_level(&arena)?;
        self.reloads_issued += 1;
        Ok(arena)
    }

    /// User asked to leave the room.
    pub fn leave_room<T>(&self, transport: &mut T) -> SessionResult<()>
    where
        T: SessionTransport + ?Sized,
    {
        info!("Leaving room");
        transport.leave_room()?;
        Ok(())
    }

    /// The local player left the room: forget the player and go back to the
    /// launcher.
    pub fn on_left_room<S>(&mut self, scene: &mut S, registry: &mut LocalPlayerRegistry)
    where
        S: SceneHost + ?Sized,
    {
        if let Some(handle) = registry.clear() {
            debug!(object_id = %handle.object_id, "Released local player");
        }
        info!(scene = %self.launcher_scene, "Left room, returning to launcher");
        self.current_arena = None;
        scene.load_scene(&self.launcher_scene);
    }
}
