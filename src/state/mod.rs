//! Client session orchestration.
//!
//! - `session` - Session state machine (where is the local client?)
//! - `connection` - Connect, join-or-create, first-occupant arena load
//! - `arena` - Local player spawn, bounds recovery, host-only reloads
//! - `room` - Room descriptors as reported by the provider
//! - `transport` - Provider and scene host contracts
//! - `profile` - Persisted player name
//! - `loopback` - In-process relay for running several clients together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ClientSession                              │
//! │                                                                      │
//! │   SessionEvent ──▶ handle() ──┬──▶ ConnectionCoordinator             │
//! │   (provider callbacks,        │      SessionState + join latch       │
//! │    engine scene loads,        │      LauncherUi                      │
//! │    user actions)              │                                      │
//! │                               └──▶ ArenaSessionManager (in arena)    │
//! │                                      spawn, bounds, master reloads   │
//! │                                                                      │
//! │   LocalPlayerRegistry   SessionTransport   SceneHost   Preferences   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let relay = LoopbackRelay::new();
//! let mut session = ClientSession::new(
//!     LauncherConfig::default(),
//!     relay.client(),
//!     my_scene_host,
//!     MemoryPreferences::new(),
//! );
//!
//! session.handle(SessionEvent::Connect)?;
//! session.pump();
//! ```

pub mod arena;
pub mod connection;
pub mod loopback;
pub mod profile;
pub mod room;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use tracing::{debug, info, warn};

pub use arena::{
    ArenaIdentifier, ArenaSessionManager, HostAuthority, LocalPlayerHandle, LocalPlayerRegistry,
    Rotation, SceneEntry, Vec3,
};
pub use connection::{ConnectionCoordinator, LauncherUi};
pub use loopback::{ClientId, LoopbackRelay, LoopbackTransport};
pub use profile::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
pub use room::{RoomDescriptor, RoomError, RoomPlayer};
pub use session::{ClientSessionState, InvalidTransition, SessionState, Transition};
pub use transport::{
    ActorId, DisconnectCause, NetworkObjectId, RoomOptions, SceneHost, SceneRef, SessionTransport,
};

use crate::config::LauncherConfig;
use crate::error::{SessionError, SessionResult};

/// Everything that can drive the session: user actions, provider callbacks
/// and engine scene loads.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// User pressed play
    Connect,

    /// User asked to leave the current room
    LeaveRoom,

    /// User entered a display name
    SetPlayerName(String),

    ConnectedToMaster,
    JoinRandomFailed { code: i16, message: String },
    CreateRoomFailed { code: i16, message: String },
    JoinedRoom,
    LeftRoom,
    PlayerEnteredRoom(RoomPlayer),
    PlayerLeftRoom(RoomPlayer),
    MasterClientSwitched(ActorId),
    Disconnected(DisconnectCause),

    /// The engine finished loading an arena scene
    ArenaLoaded(ArenaIdentifier),

    /// The engine finished loading the launcher scene
    LauncherLoaded,
}

/// One client process: the explicitly owned composition of the launcher
/// coordinator, the arena manager and their collaborators.
#[derive(Debug)]
pub struct ClientSession<T, S, P> {
    config: LauncherConfig,
    transport: T,
    scene: S,
    preferences: P,
    coordinator: ConnectionCoordinator,
    arena: Option<ArenaSessionManager>,
    local_player: LocalPlayerRegistry,
    player_name: String,
}

impl<T, S, P> ClientSession<T, S, P>
where
    T: SessionTransport,
    S: SceneHost,
    P: PreferenceStore,
{
    pub fn new(config: LauncherConfig, mut transport: T, scene: S, preferences: P) -> Self {
        let coordinator = ConnectionCoordinator::new(&config, &mut transport);
        let player_name = profile::load_player_name(&preferences, &mut transport);
        Self {
            config,
            transport,
            scene,
            preferences,
            coordinator,
            arena: None,
            local_player: LocalPlayerRegistry::new(),
            player_name,
        }
    }

    pub fn state(&self) -> ClientSessionState {
        self.coordinator.state()
    }

    pub fn ui(&self) -> &LauncherUi {
        self.coordinator.ui()
    }

    pub fn coordinator(&self) -> &ConnectionCoordinator {
        &self.coordinator
    }

    /// Arena manager, present from joining a room until leaving it.
    pub fn arena(&self) -> Option<&ArenaSessionManager> {
        self.arena.as_ref()
    }

    pub fn local_player(&self) -> Option<&LocalPlayerHandle> {
        self.local_player.get()
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn preferences(&self) -> &P {
        &self.preferences
    }

    /// Drain and handle every queued provider callback. Failures are
    /// logged and do not stop the drain. Returns the number handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.poll_event() {
            handled += 1;
            if let Err(err) = self.handle(event) {
                warn!(error = %err, state = %self.state(), "Session event failed");
            }
        }
        handled
    }

    pub fn handle(&mut self, event: SessionEvent) -> SessionResult<()> {
        debug!(?event, state = %self.state(), "Handling session event");

        match event {
            SessionEvent::Connect => self.coordinator.connect(&mut self.transport),

            SessionEvent::LeaveRoom => {
                if !self.coordinator.state().is_in_room() {
                    return Err(SessionError::NoCurrentRoom);
                }
                let result = match &self.arena {
                    Some(arena) => arena.leave_room(&mut self.transport),
                    None => self.transport.leave_room().map_err(SessionError::from),
                };
                self.arena_result(result)
            }

            SessionEvent::SetPlayerName(name) => {
                profile::set_player_name(&name, &mut self.preferences, &mut self.transport)?;
                self.player_name = name;
                Ok(())
            }

            SessionEvent::ConnectedToMaster => {
                self.coordinator.on_connected_to_master(&mut self.transport)
            }

            SessionEvent::JoinRandomFailed { code, message } => {
                self.coordinator
                    .on_join_random_failed(code, &message, &mut self.transport)
            }

            SessionEvent::CreateRoomFailed { code, message } => {
                self.coordinator.on_create_room_failed(code, &message)
            }

            SessionEvent::JoinedRoom => {
                let joined = self.coordinator.on_joined_room(&mut self.transport);
                // Membership changes can arrive before the first arena load
                if self.coordinator.state().is_in_room() {
                    let config = &self.config;
                    self.arena
                        .get_or_insert_with(|| ArenaSessionManager::new(config));
                }
                joined.map(|_| ())
            }

            SessionEvent::LeftRoom => {
                self.return_to_launcher();
                self.coordinator.on_left_room()
            }

            SessionEvent::PlayerEnteredRoom(other) => {
                let result = match self.arena.as_mut() {
                    Some(arena) => arena
                        .on_player_entered(&other, &mut self.transport)
                        .map(|_| ()),
                    None => {
                        debug!(actor_id = other.actor_id, "Player entered while not in a room");
                        Ok(())
                    }
                };
                self.arena_result(result)
            }

            SessionEvent::PlayerLeftRoom(other) => {
                let result = match self.arena.as_mut() {
                    Some(arena) => arena
                        .on_player_left(&other, &mut self.transport)
                        .map(|_| ()),
                    None => {
                        debug!(actor_id = other.actor_id, "Player left while not in a room");
                        Ok(())
                    }
                };
                self.arena_result(result)
            }

            SessionEvent::MasterClientSwitched(actor_id) => {
                info!(
                    actor_id,
                    is_local = self.transport.is_master_client(),
                    "Master client switched"
                );
                Ok(())
            }

            SessionEvent::Disconnected(cause) => {
                if self.arena.is_some() {
                    self.return_to_launcher();
                }
                self.coordinator.on_disconnected(cause);
                Ok(())
            }

            SessionEvent::ArenaLoaded(arena_id) => {
                let config = &self.config;
                let arena = self
                    .arena
                    .get_or_insert_with(|| ArenaSessionManager::new(config));
                let result = arena
                    .enter_scene(
                        arena_id.as_str(),
                        &mut self.transport,
                        &mut self.scene,
                        &mut self.local_player,
                    )
                    .map(|_| ());
                self.arena_result(result)
            }

            SessionEvent::LauncherLoaded => {
                debug!("Launcher scene loaded");
                Ok(())
            }
        }
    }

    /// Put an in-room failure on the launcher status line.
    fn arena_result(&mut self, result: SessionResult<()>) -> SessionResult<()> {
        result.map_err(|err| self.coordinator.report_arena_failure(err))
    }

    fn return_to_launcher(&mut self) {
        match self.arena.take() {
            Some(mut arena) => arena.on_left_room(&mut self.scene, &mut self.local_player),
            None => {
                self.local_player.clear();
                self.scene.load_scene(&self.config.launcher_scene);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingTransport, TestScene};
    use super::*;
    use pretty_assertions::assert_eq;

    type LoopbackSession = ClientSession<LoopbackTransport, TestScene, MemoryPreferences>;

    fn session(relay: &LoopbackRelay) -> LoopbackSession {
        ClientSession::new(
            LauncherConfig::default(),
            relay.client(),
            TestScene::with_ground(),
            MemoryPreferences::new(),
        )
    }

    /// Pump every session until no callbacks are left anywhere.
    fn settle(sessions: &mut [&mut LoopbackSession]) {
        loop {
            let handled: usize = sessions.iter_mut().map(|s| s.pump()).sum();
            if handled == 0 {
                break;
            }
        }
    }

    /// Handle exactly one queued callback.
    fn step(session: &mut LoopbackSession) {
        let event = session.transport_mut().poll_event().unwrap();
        session.handle(event).unwrap();
    }

    fn loads(relay: &LoopbackRelay) -> Vec<(ClientId, String)> {
        relay
            .level_loads()
            .into_iter()
            .map(|(client, arena)| (client, arena.as_str().to_string()))
            .collect()
    }

    #[test]
    fn test_first_client_creates_and_loads() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let alice_id = alice.transport().id();

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);

        assert_eq!(alice.state(), ClientSessionState::InRoom);
        assert_eq!(relay.room_count(), 1);
        assert_eq!(relay.rooms()[0].max_players, 4);
        assert_eq!(loads(&relay), vec![(alice_id, "Room for 1".to_string())]);
        assert_eq!(alice.arena().unwrap().current_arena(), Some("Room for 1"));
        assert!(alice.local_player().is_some());
        assert_eq!(relay.spawn_count(alice_id), 1);
    }

    #[test]
    fn test_second_client_joins_and_master_reloads() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let mut bob = session(&relay);
        let alice_id = alice.transport().id();
        let bob_id = bob.transport().id();

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        bob.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        // Bob joined the existing room instead of creating one
        assert_eq!(relay.room_count(), 1);
        assert_eq!(bob.state(), ClientSessionState::InRoom);
        assert_eq!(
            loads(&relay),
            vec![
                (alice_id, "Room for 1".to_string()),
                (alice_id, "Room for 2".to_string()),
            ]
        );

        // Both followed the synchronized load, each with one player
        assert_eq!(alice.arena().unwrap().current_arena(), Some("Room for 2"));
        assert_eq!(bob.arena().unwrap().current_arena(), Some("Room for 2"));
        assert_eq!(relay.spawn_count(alice_id), 1);
        assert_eq!(relay.spawn_count(bob_id), 1);
        assert_eq!(bob.arena().unwrap().reloads_issued(), 0);
    }

    #[test]
    fn test_guest_leaves_master_reloads() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let mut bob = session(&relay);
        let alice_id = alice.transport().id();

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);
        bob.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        bob.handle(SessionEvent::LeaveRoom).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        assert_eq!(
            loads(&relay).last(),
            Some(&(alice_id, "Room for 1".to_string()))
        );
        assert_eq!(alice.arena().unwrap().current_arena(), Some("Room for 1"));

        // Bob is back at the launcher, connected but not rejoining
        assert_eq!(bob.state(), ClientSessionState::ConnectedToMaster);
        assert!(bob.arena().is_none());
        assert!(bob.local_player().is_none());
        assert_eq!(bob.scene().loaded, vec![SceneRef::Index(0)]);
        assert!(bob.ui().control_panel_visible);
        assert_eq!(relay.room_count(), 1);
    }

    #[test]
    fn test_join_before_master_loads_arena() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let mut bob = session(&relay);
        let alice_id = alice.transport().id();

        // Alice creates the room but has not handled JoinedRoom yet
        alice.handle(SessionEvent::Connect).unwrap();
        step(&mut alice);
        step(&mut alice);

        bob.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut bob]);
        assert_eq!(bob.state(), ClientSessionState::InRoom);

        settle(&mut [&mut alice, &mut bob]);

        assert!(alice.transport().is_master_client());
        assert_eq!(
            loads(&relay),
            vec![
                (alice_id, "Room for 1".to_string()),
                (alice_id, "Room for 2".to_string()),
            ]
        );
        assert_eq!(alice.arena().unwrap().current_arena(), Some("Room for 2"));
        assert_eq!(bob.arena().unwrap().current_arena(), Some("Room for 2"));
        assert_eq!(relay.spawn_count(alice_id), 1);
        assert_eq!(relay.spawn_count(bob.transport().id()), 1);
    }

    #[test]
    fn test_arena_failure_reaches_status() {
        let mut transport = RecordingTransport::connected();
        transport.refuse_instantiate = true;
        let mut alice = ClientSession::new(
            LauncherConfig::default(),
            transport,
            TestScene::with_ground(),
            MemoryPreferences::new(),
        );

        alice.handle(SessionEvent::Connect).unwrap();
        alice.transport_mut().set_room(&[1]);
        alice.handle(SessionEvent::JoinedRoom).unwrap();
        assert_eq!(alice.transport().loads, vec!["Room for 1".to_string()]);

        let arena_id = ArenaIdentifier::for_player_count(1);
        let result = alice.handle(SessionEvent::ArenaLoaded(arena_id));

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert!(alice.local_player().is_none());
        assert_eq!(alice.state(), ClientSessionState::InRoom);
        assert_eq!(
            alice.ui().status,
            "Arena error: transport rejected the request: spawn refused"
        );

        // Still able to leave
        alice.handle(SessionEvent::LeaveRoom).unwrap();
        assert_eq!(alice.transport().leaves, 1);
    }

    #[test]
    fn test_master_leaves_remaining_client_takes_over() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let mut bob = session(&relay);
        let bob_id = bob.transport().id();

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);
        bob.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        alice.handle(SessionEvent::LeaveRoom).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        assert!(bob.transport().is_master_client());
        assert_eq!(
            loads(&relay).last(),
            Some(&(bob_id, "Room for 1".to_string()))
        );
        assert_eq!(bob.arena().unwrap().reloads_issued(), 1);
        // Bob kept his player through the reload
        assert_eq!(relay.spawn_count(bob_id), 1);
    }

    #[test]
    fn test_non_master_never_reloads() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let mut bob = session(&relay);
        let mut carol = session(&relay);
        let alice_id = alice.transport().id();

        for next in 0..3 {
            match next {
                0 => alice.handle(SessionEvent::Connect).unwrap(),
                1 => bob.handle(SessionEvent::Connect).unwrap(),
                _ => carol.handle(SessionEvent::Connect).unwrap(),
            }
            settle(&mut [&mut alice, &mut bob, &mut carol]);
        }
        carol.handle(SessionEvent::LeaveRoom).unwrap();
        settle(&mut [&mut alice, &mut bob, &mut carol]);

        assert!(loads(&relay).iter().all(|(client, _)| *client == alice_id));
        assert_eq!(
            loads(&relay)
                .into_iter()
                .map(|(_, arena)| arena)
                .collect::<Vec<_>>(),
            vec!["Room for 1", "Room for 2", "Room for 3", "Room for 2"]
        );
        assert_eq!(bob.arena().unwrap().reloads_issued(), 0);
    }

    #[test]
    fn test_full_room_creates_second_room() {
        let relay = LoopbackRelay::new();
        let config = LauncherConfig {
            max_players_per_room: 1,
            ..LauncherConfig::default()
        };
        let mut alice = ClientSession::new(
            config.clone(),
            relay.client(),
            TestScene::with_ground(),
            MemoryPreferences::new(),
        );
        let mut bob = ClientSession::new(
            config,
            relay.client(),
            TestScene::with_ground(),
            MemoryPreferences::new(),
        );

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);
        bob.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice, &mut bob]);

        assert_eq!(relay.room_count(), 2);
        assert_eq!(loads(&relay).len(), 2);
        assert!(loads(&relay)
            .iter()
            .all(|(_, arena)| arena == "Room for 1"));
    }

    #[test]
    fn test_reconnect_after_leaving_joins_again() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);
        alice.handle(SessionEvent::LeaveRoom).unwrap();
        settle(&mut [&mut alice]);
        assert_eq!(alice.state(), ClientSessionState::ConnectedToMaster);
        assert_eq!(relay.room_count(), 0);

        // Already connected: goes straight to matchmaking
        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);
        assert_eq!(alice.state(), ClientSessionState::InRoom);
        assert_eq!(relay.room_count(), 1);
        assert!(alice.local_player().is_some());
    }

    #[test]
    fn test_disconnect_in_arena_returns_to_launcher() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);
        relay.drop_client(alice.transport().id(), DisconnectCause::ServerTimeout);
        settle(&mut [&mut alice]);

        assert_eq!(alice.state(), ClientSessionState::Disconnected);
        assert!(alice.arena().is_none());
        assert!(alice.local_player().is_none());
        assert_eq!(alice.ui().status, "Disconnected: server timed out");
        assert!(alice.ui().control_panel_visible);
        assert!(!alice.ui().progress_visible);
    }

    #[test]
    fn test_player_name_roundtrip() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        assert_eq!(alice.player_name(), "Player");

        alice
            .handle(SessionEvent::SetPlayerName("Alice".to_string()))
            .unwrap();
        assert_eq!(alice.player_name(), "Alice");
        assert_eq!(
            alice.preferences().get(profile::PLAYER_NAME_KEY).as_deref(),
            Some("Alice")
        );

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);
        let rooms = relay.rooms();
        assert_eq!(rooms[0].players().next().unwrap().nickname, "Alice");

        let result = alice.handle(SessionEvent::SetPlayerName(String::new()));
        assert_eq!(result, Err(SessionError::EmptyPlayerName));
        assert_eq!(alice.player_name(), "Alice");
    }

    #[test]
    fn test_leave_outside_room_rejected() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);

        let result = alice.handle(SessionEvent::LeaveRoom);
        assert_eq!(result, Err(SessionError::NoCurrentRoom));
    }

    #[test]
    fn test_arena_reload_keeps_single_player() {
        let relay = LoopbackRelay::new();
        let mut alice = session(&relay);
        let alice_id = alice.transport().id();

        alice.handle(SessionEvent::Connect).unwrap();
        settle(&mut [&mut alice]);

        alice
            .handle(SessionEvent::ArenaLoaded(ArenaIdentifier::for_player_count(1)))
            .unwrap();
        alice
            .handle(SessionEvent::ArenaLoaded(ArenaIdentifier::for_player_count(1)))
            .unwrap();

        assert_eq!(relay.spawn_count(alice_id), 1);
    }
}
