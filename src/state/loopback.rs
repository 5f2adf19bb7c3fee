//! In-process session relay.
//!
//! Stands in for the managed relay service so several client sessions can
//! run in one process without touching the network: room discovery,
//! join-random, room creation, master election, synchronized scene loads
//! and replicated spawns. Everything is single threaded; callbacks are
//! queued per client and drained by [`ClientSession::pump`](super::ClientSession::pump).

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::{debug, warn};

use super::arena::{ArenaIdentifier, Rotation, Vec3};
use super::room::{RoomDescriptor, RoomPlayer};
use super::transport::{
    ActorId, DisconnectCause, NetworkObjectId, RoomOptions, SessionTransport, TransportResult,
};
use super::SessionEvent;
use crate::error::TransportError;

/// Relay-wide client identifier.
pub type ClientId = u32;

/// Return code reported when no room is open for a random join.
pub const NO_MATCH_FOUND: i16 = 32760;

/// A callback waiting for its client, with the room as it was when the
/// callback was raised.
#[derive(Debug)]
struct Delivery {
    event: SessionEvent,
    room: Option<RoomDescriptor>,
    actor: Option<ActorId>,
}

#[derive(Debug)]
struct ClientSlot {
    connected: bool,
    game_version: String,
    nickname: String,
    auto_sync: bool,
    actor: Option<ActorId>,
    room: Option<String>,
    inbox: VecDeque<Delivery>,
}

impl ClientSlot {
    fn new() -> Self {
        Self {
            connected: false,
            game_version: String::new(),
            nickname: String::new(),
            auto_sync: false,
            actor: None,
            room: None,
            inbox: VecDeque::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RelayState {
    clients: BTreeMap<ClientId, ClientSlot>,
    rooms: BTreeMap<String, RoomDescriptor>,
    room_versions: BTreeMap<String, String>,
    actor_clients: BTreeMap<ActorId, ClientId>,
    next_client: ClientId,
    next_actor: ActorId,
    next_room: u32,
    next_object: u32,
    level_loads: Vec<(ClientId, ArenaIdentifier)>,
    spawned: Vec<(ClientId, NetworkObjectId, String)>,
}

impl RelayState {
    fn slot(&self, client: ClientId) -> TransportResult<&ClientSlot> {
        self.clients
            .get(&client)
            .ok_or_else(|| TransportError::Rejected(format!("unknown client {}", client)))
    }

    fn slot_mut(&mut self, client: ClientId) -> TransportResult<&mut ClientSlot> {
        self.clients
            .get_mut(&client)
            .ok_or_else(|| TransportError::Rejected(format!("unknown client {}", client)))
    }

    fn require_master_connection(&self, client: ClientId) -> TransportResult<()> {
        let slot = self.slot(client)?;
        if !slot.connected {
            return Err(TransportError::NotConnected);
        }
        if slot.room.is_some() {
            return Err(TransportError::AlreadyInRoom);
        }
        Ok(())
    }

    fn room_of(&self, client: ClientId) -> TransportResult<(String, ActorId)> {
        let slot = self.slot(client)?;
        match (&slot.room, slot.actor) {
            (Some(room), Some(actor)) => Ok((room.clone(), actor)),
            _ => Err(TransportError::NotInRoom),
        }
    }

    /// Queue a callback for one client, capturing its current room view.
    fn deliver(&mut self, client: ClientId, event: SessionEvent) {
        let (room, actor) = match self.clients.get(&client) {
            Some(slot) => (
                slot.room.as_ref().and_then(|name| self.rooms.get(name)).cloned(),
                slot.actor,
            ),
            None => return,
        };
        if let Some(slot) = self.clients.get_mut(&client) {
            slot.inbox.push_back(Delivery { event, room, actor });
        }
    }

    /// Queue a callback for every member of a room except `except`.
    fn broadcast(&mut self, room: &str, except: Option<ClientId>, event: SessionEvent) {
        for client in self.members(room) {
            if Some(client) != except {
                self.deliver(client, event.clone());
            }
        }
    }

    fn members(&self, room: &str) -> Vec<ClientId> {
        self.rooms
            .get(room)
            .map(|r| {
                r.actor_ids()
                    .filter_map(|actor| self.actor_clients.get(&actor).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn enter_room(&mut self, client: ClientId, room_name: &str) -> TransportResult<()> {
        self.next_actor += 1;
        let actor = self.next_actor;
        let nickname = self.slot(client)?.nickname.clone();
        let player = RoomPlayer::new(actor, nickname);

        let room = self
            .rooms
            .get_mut(room_name)
            .ok_or_else(|| TransportError::Rejected(format!("unknown room {}", room_name)))?;
        room.add_player(player.clone())
            .map_err(|err| TransportError::Rejected(err.to_string()))?;

        self.actor_clients.insert(actor, client);
        let slot = self.slot_mut(client)?;
        slot.actor = Some(actor);
        slot.room = Some(room_name.to_string());

        self.deliver(client, SessionEvent::JoinedRoom);
        self.broadcast(
            room_name,
            Some(client),
            SessionEvent::PlayerEnteredRoom(player),
        );
        Ok(())
    }

    /// Take a client out of its room, electing a new master if needed and
    /// telling the remaining members.
    fn exit_room(&mut self, client: ClientId) -> TransportResult<()> {
        let (room_name, actor) = self.room_of(client)?;

        let slot = self.slot_mut(client)?;
        slot.room = None;
        slot.actor = None;
        self.actor_clients.remove(&actor);

        let Some(room) = self.rooms.get_mut(&room_name) else {
            return Err(TransportError::NotInRoom);
        };
        let was_master = room.is_master(actor);
        let Some(player) = room.remove_player(actor) else {
            return Err(TransportError::NotInRoom);
        };
        let new_master = room.master_client;

        if room.is_empty() {
            debug!(room = %room_name, "Closing empty room");
            self.rooms.remove(&room_name);
            self.room_versions.remove(&room_name);
            return Ok(());
        }

        if was_master {
            if let Some(new_master) = new_master {
                self.broadcast(
                    &room_name,
                    None,
                    SessionEvent::MasterClientSwitched(new_master),
                );
            }
        }
        self.broadcast(&room_name, None, SessionEvent::PlayerLeftRoom(player));
        Ok(())
    }
}

/// The shared relay. Cloning yields another handle to the same relay.
#[derive(Debug, Clone, Default)]
pub struct LoopbackRelay {
    state: Rc<RefCell<RelayState>>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its transport.
    pub fn client(&self) -> LoopbackTransport {
        let mut state = self.state.borrow_mut();
        state.next_client += 1;
        let id = state.next_client;
        state.clients.insert(id, ClientSlot::new());
        LoopbackTransport {
            id,
            relay: self.clone(),
            room: None,
            actor: None,
        }
    }

    /// Simulate the connection of `client` dropping.
    pub fn drop_client(&self, client: ClientId, cause: DisconnectCause) {
        let mut state = self.state.borrow_mut();
        if state.room_of(client).is_ok() {
            let _ = state.exit_room(client);
        }
        if let Some(slot) = state.clients.get_mut(&client) {
            slot.connected = false;
        }
        state.deliver(client, SessionEvent::Disconnected(cause));
    }

    pub fn room_count(&self) -> usize {
        self.state.borrow().rooms.len()
    }

    pub fn rooms(&self) -> Vec<RoomDescriptor> {
        self.state.borrow().rooms.values().cloned().collect()
    }

    /// Every level load requested so far, in order.
    pub fn level_loads(&self) -> Vec<(ClientId, ArenaIdentifier)> {
        self.state.borrow().level_loads.clone()
    }

    /// Number of replicated spawns requested by `client`.
    pub fn spawn_count(&self, client: ClientId) -> usize {
        self.state
            .borrow()
            .spawned
            .iter()
            .filter(|(owner, _, _)| *owner == client)
            .count()
    }
}

/// One client's view of the [`LoopbackRelay`].
#[derive(Debug)]
pub struct LoopbackTransport {
    id: ClientId,
    relay: LoopbackRelay,

    /// Room as of the last delivered callback
    room: Option<RoomDescriptor>,
    actor: Option<ActorId>,
}

impl LoopbackTransport {
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl SessionTransport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.relay
            .state
            .borrow()
            .clients
            .get(&self.id)
            .map(|slot| slot.connected)
            .unwrap_or(false)
    }

    fn is_master_client(&self) -> bool {
        match (&self.room, self.actor) {
            (Some(room), Some(actor)) => room.is_master(actor),
            _ => false,
        }
    }

    fn current_room(&self) -> Option<&RoomDescriptor> {
        self.room.as_ref()
    }

    fn connect(&mut self, compatibility_version: &str) -> TransportResult<()> {
        let mut state = self.relay.state.borrow_mut();
        let slot = state.slot_mut(self.id)?;
        if slot.connected {
            return Err(TransportError::Rejected("already connected".into()));
        }
        slot.connected = true;
        slot.game_version = compatibility_version.to_string();
        state.deliver(self.id, SessionEvent::ConnectedToMaster);
        Ok(())
    }

    fn join_random_room(&mut self) -> TransportResult<()> {
        let mut state = self.relay.state.borrow_mut();
        state.require_master_connection(self.id)?;

        let version = state.slot(self.id)?.game_version.clone();
        let target = state
            .rooms
            .iter()
            .find(|(name, room)| {
                room.is_joinable()
                    && state.room_versions.get(*name).map(String::as_str) == Some(version.as_str())
            })
            .map(|(name, _)| name.clone());

        match target {
            Some(room) => state.enter_room(self.id, &room),
            None => {
                debug!(client = self.id, "No joinable room");
                state.deliver(
                    self.id,
                    SessionEvent::JoinRandomFailed {
                        code: NO_MATCH_FOUND,
                        message: "No match found".to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    fn create_room(&mut self, options: RoomOptions) -> TransportResult<()> {
        let mut state = self.relay.state.borrow_mut();
        state.require_master_connection(self.id)?;

        state.next_room += 1;
        let name = format!("room-{}", state.next_room);
        let mut room = RoomDescriptor::new(name.clone(), options.max_players);
        room.is_open = options.is_open;
        room.is_visible = options.is_visible;

        let version = state.slot(self.id)?.game_version.clone();
        state.rooms.insert(name.clone(), room);
        state.room_versions.insert(name.clone(), version);
        state.enter_room(self.id, &name)
    }

    fn load_level(&mut self, arena: &ArenaIdentifier) -> TransportResult<()> {
        let mut state = self.relay.state.borrow_mut();
        let (room, _) = state.room_of(self.id)?;
        state.level_loads.push((self.id, arena.clone()));

        for member in state.members(&room) {
            let synced = member == self.id
                || state
                    .clients
                    .get(&member)
                    .map(|slot| slot.auto_sync)
                    .unwrap_or(false);
            if synced {
                state.deliver(member, SessionEvent::ArenaLoaded(arena.clone()));
            }
        }
        Ok(())
    }

    fn leave_room(&mut self) -> TransportResult<()> {
        let mut state = self.relay.state.borrow_mut();
        state.exit_room(self.id)?;
        state.deliver(self.id, SessionEvent::LeftRoom);
        // The provider falls back to the master service after a leave
        state.deliver(self.id, SessionEvent::ConnectedToMaster);
        Ok(())
    }

    fn instantiate(
        &mut self,
        prefab: &str,
        position: Vec3,
        _rotation: Rotation,
    ) -> TransportResult<NetworkObjectId> {
        let mut state = self.relay.state.borrow_mut();
        state.room_of(self.id)?;
        state.next_object += 1;
        let object_id = NetworkObjectId(state.next_object);
        debug!(client = self.id, %object_id, prefab, %position, "Replicated spawn");
        state.spawned.push((self.id, object_id, prefab.to_string()));
        Ok(object_id)
    }

    fn set_automatically_sync_scene(&mut self, enabled: bool) {
        let mut state = self.relay.state.borrow_mut();
        if let Some(slot) = state.clients.get_mut(&self.id) {
            slot.auto_sync = enabled;
        }
    }

    fn set_nickname(&mut self, nickname: &str) {
        let mut state = self.relay.state.borrow_mut();
        match state.clients.get_mut(&self.id) {
            Some(slot) => slot.nickname = nickname.to_string(),
            None => warn!(client = self.id, "Nickname set on unknown client"),
        }
    }

    fn poll_event(&mut self) -> Option<SessionEvent> {
        let delivery = self
            .relay
            .state
            .borrow_mut()
            .clients
            .get_mut(&self.id)?
            .inbox
            .pop_front()?;
        self.room = delivery.room;
        self.actor = delivery.actor;
        Some(delivery.event)
    }
}
