//! Recording collaborators for unit tests.

use std::cell::RefCell;

use super::arena::{ArenaIdentifier, Rotation, Vec3};
use super::room::{RoomDescriptor, RoomPlayer};
use super::transport::{
    ActorId, NetworkObjectId, RoomOptions, SceneHost, SceneRef, SessionTransport, TransportResult,
};
use crate::error::TransportError;

/// Transport that records every request and never emits callbacks.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub connected: bool,
    pub local_actor: ActorId,
    pub room: Option<RoomDescriptor>,
    pub refuse_connect: bool,
    pub refuse_join: bool,
    pub refuse_load: bool,
    pub refuse_instantiate: bool,
    pub connects: Vec<String>,
    pub join_random_calls: usize,
    pub created: Vec<RoomOptions>,
    pub loads: Vec<String>,
    pub leaves: usize,
    pub instantiated: Vec<(String, Vec3)>,
    pub nickname: Option<String>,
    pub auto_sync: bool,
    next_object: u32,
}

impl RecordingTransport {
    pub fn disconnected() -> Self {
        Self {
            local_actor: 1,
            ..Self::default()
        }
    }

    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::disconnected()
        }
    }

    /// Connected and inside a room whose members are `members`, in join
    /// order. The first member is master.
    pub fn in_room(local_actor: ActorId, members: &[ActorId]) -> Self {
        let mut transport = Self::connected();
        transport.local_actor = local_actor;
        transport.set_room(members);
        transport
    }

    pub fn set_room(&mut self, members: &[ActorId]) {
        let mut room = RoomDescriptor::new("room-1", 4);
        for actor in members {
            room.add_player(RoomPlayer::new(*actor, format!("P{}", actor)))
                .expect("test room has space");
        }
        self.room = Some(room);
    }

    pub fn remove_member(&mut self, actor: ActorId) {
        if let Some(room) = self.room.as_mut() {
            room.remove_player(actor);
        }
    }
}

impl SessionTransport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_master_client(&self) -> bool {
        self.room
            .as_ref()
            .map(|room| room.is_master(self.local_actor))
            .unwrap_or(false)
    }

    fn current_room(&self) -> Option<&RoomDescriptor> {
        self.room.as_ref()
    }

    fn connect(&mut self, compatibility_version: &str) -> TransportResult<()> {
        self.connects.push(compatibility_version.to_string());
        if self.refuse_connect {
            return Err(TransportError::Rejected("no network".into()));
        }
        Ok(())
    }

    fn join_random_room(&mut self) -> TransportResult<()> {
        self.join_random_calls += 1;
        if self.refuse_join {
            return Err(TransportError::Rejected("matchmaking offline".into()));
        }
        Ok(())
    }

    fn create_room(&mut self, options: RoomOptions) -> TransportResult<()> {
        self.created.push(options);
        Ok(())
    }

    fn load_level(&mut self, arena: &ArenaIdentifier) -> TransportResult<()> {
        if self.refuse_load {
            return Err(TransportError::Rejected("load refused".into()));
        }
        self.loads.push(arena.as_str().to_string());
        Ok(())
    }

    fn leave_room(&mut self) -> TransportResult<()> {
        self.leaves += 1;
        Ok(())
    }

    fn instantiate(
        &mut self,
        prefab: &str,
        position: Vec3,
        _rotation: Rotation,
    ) -> TransportResult<NetworkObjectId> {
        if self.refuse_instantiate {
            return Err(TransportError::Rejected("spawn refused".into()));
        }
        self.next_object += 1;
        self.instantiated.push((prefab.to_string(), position));
        Ok(NetworkObjectId(self.next_object))
    }

    fn set_automatically_sync_scene(&mut self, enabled: bool) {
        self.auto_sync = enabled;
    }

    fn set_nickname(&mut self, nickname: &str) {
        self.nickname = Some(nickname.to_string());
    }
}

/// Scene host with a flat floor at a fixed height, or no geometry at all.
#[derive(Debug, Default)]
pub struct TestScene {
    pub floor: Option<f32>,
    pub raycasts: RefCell<Vec<(Vec3, f32)>>,
    pub loaded: Vec<SceneRef>,
    pub relocations: Vec<(NetworkObjectId, Vec3)>,
}

impl TestScene {
    /// Floor at y = 0.
    pub fn with_ground() -> Self {
        Self {
            floor: Some(0.0),
            ..Self::default()
        }
    }

    pub fn void() -> Self {
        Self::default()
    }
}

impl SceneHost for TestScene {
    fn raycast_down(&self, origin: Vec3, max_distance: f32) -> bool {
        self.raycasts.borrow_mut().push((origin, max_distance));
        match self.floor {
            Some(floor) => origin.y >= floor && origin.y - floor <= max_distance,
            None => false,
        }
    }

    fn load_scene(&mut self, scene: &SceneRef) {
        self.loaded.push(scene.clone());
    }

    fn relocate(&mut self, object: NetworkObjectId, position: Vec3) {
        self.relocations.push((object, position));
    }
}
