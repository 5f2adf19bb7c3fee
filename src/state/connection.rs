//! Connection coordination.
//!
//! Drives the local client from the launcher to a room: connect to the
//! master service, join any open room, fall back to creating one, and have
//! the first occupant bootstrap the shared arena.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::arena::ArenaIdentifier;
use super::session::{ClientSessionState, InvalidTransition, SessionState, Transition};
use super::transport::{DisconnectCause, RoomOptions, SessionTransport};
use crate::config::LauncherConfig;
use crate::error::{SessionError, SessionResult, TransportError};

pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_CONNECTED_TO_MASTER: &str = "Connected to master";
pub const STATUS_CREATING_ROOM: &str = "Join failed, creating room...";

/// Launcher widgets the coordinator toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LauncherUi {
    /// Connection progress label
    pub progress_visible: bool,

    /// Name entry and play button
    pub control_panel_visible: bool,

    /// Human readable status line
    pub status: String,
}

impl Default for LauncherUi {
    fn default() -> Self {
        Self {
            progress_visible: false,
            control_panel_visible: true,
            status: String::new(),
        }
    }
}

impl LauncherUi {
    /// Hide the controls and show progress.
    pub fn show_progress(&mut self, status: impl Into<String>) {
        self.progress_visible = true;
        self.control_panel_visible = false;
        self.status = status.into();
    }

    /// Back to the retry-ready launcher.
    pub fn show_controls(&mut self, status: impl Into<String>) {
        self.progress_visible = false;
        self.control_panel_visible = true;
        self.status = status.into();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "progress_visible": self.progress_visible,
            "control_panel_visible": self.control_panel_visible,
            "status": self.status
        })
    }
}

/// Owns the connect → match → room lifecycle of the local client.
#[derive(Debug)]
pub struct ConnectionCoordinator {
    game_version: String,
    max_players_per_room: u8,
    state: SessionState,

    /// Set by `connect` when a connection was requested; consumed by the
    /// next `on_connected_to_master`.
    join_pending: bool,

    ui: LauncherUi,
}

impl ConnectionCoordinator {
    /// Create the coordinator and enable automatic scene sync on the
    /// provider.
    pub fn new<T>(config: &LauncherConfig, transport: &mut T) -> Self
    where
        T: SessionTransport + ?Sized,
    {
        transport.set_automatically_sync_scene(config.automatically_sync_scene);
        debug!(
            game_version = %config.game_version,
            max_players = config.max_players_per_room,
            "Launcher started"
        );
        Self {
            game_version: config.game_version.clone(),
            max_players_per_room: config.max_players_per_room,
            state: SessionState::new(),
            join_pending: false,
            ui: LauncherUi::default(),
        }
    }

    pub fn state(&self) -> ClientSessionState {
        self.state.current()
    }

    pub fn is_join_pending(&self) -> bool {
        self.join_pending
    }

    pub fn ui(&self) -> &LauncherUi {
        &self.ui
    }

    /// Start playing: join a room if already connected, otherwise connect
    /// first and join once the master service answers.
    pub fn connect<T>(&mut self, transport: &mut T) -> SessionResult<()>
    where
        T: SessionTransport + ?Sized,
    {
        if !self.state.accepts_connect() {
            let err = InvalidTransition {
                from: self.state.current(),
                transition: Transition::BeginConnect,
                reason: "Launcher is busy",
            };
            warn!(state = %self.state.current(), "Ignoring connect request");
            return Err(err.into());
        }

        info!("Connect requested");
        self.ui.show_progress(STATUS_CONNECTING);

        if transport.is_connected() {
            if self.state.current() != ClientSessionState::ConnectedToMaster {
                self.state.apply_mut(Transition::MasterReached)?;
            }
            return self.begin_matchmaking(transport);
        }

        self.state.apply_mut(Transition::BeginConnect)?;
        match transport.connect(&self.game_version) {
            Ok(()) => {
                self.join_pending = true;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Connect request refused");
                self.join_pending = false;
                self.state.apply_mut(Transition::Disconnected)?;
                self.ui.show_controls(format!("Connection failed: {}", err));
                Err(err.into())
            }
        }
    }

    pub fn on_connected_to_master<T>(&mut self, transport: &mut T) -> SessionResult<()>
    where
        T: SessionTransport + ?Sized,
    {
        self.state.apply_mut(Transition::MasterReached)?;
        info!(join_pending = self.join_pending, "Connected to master");
        self.ui.set_status(STATUS_CONNECTED_TO_MASTER);

        // Without a pending join this is a return to the launcher, stay put
        if !self.join_pending {
            return Ok(());
        }
        self.join_pending = false;
        self.begin_matchmaking(transport)
    }

    /// No open room was found: create one.
    pub fn on_join_random_failed<T>(
        &mut self,
        code: i16,
        message: &str,
        transport: &mut T,
    ) -> SessionResult<()>
    where
        T: SessionTransport + ?Sized,
    {
        self.state.apply_mut(Transition::JoinRandomFailed)?;
        info!(code, message, "No random room available, creating one");
        self.ui.set_status(STATUS_CREATING_ROOM);

        let options = RoomOptions::with_max_players(self.max_players_per_room);
        if let Err(err) = transport.create_room(options) {
            return Err(self.abort_matchmaking(err));
        }
        Ok(())
    }

    pub fn on_create_room_failed(&mut self, code: i16, message: &str) -> SessionResult<()> {
        self.state.apply_mut(Transition::MatchmakingAborted)?;
        warn!(code, message, "Room creation failed");
        self.ui
            .show_controls(format!("Create room failed: {}", message));
        Ok(())
    }

    /// Joined or created a room. The first occupant loads the arena; later
    /// joiners receive it through scene sync.
    pub fn on_joined_room<T>(&mut self, transport: &mut T) -> SessionResult<Option<ArenaIdentifier>>
    where
        T: SessionTransport + ?Sized,
    {
        self.state.apply_mut(Transition::JoinedRoom)?;

        let room = transport.current_room().ok_or(SessionError::NoCurrentRoom)?;
        let player_count = room.player_count();
        info!(room = %room.name, player_count, "Joined room");
        self.ui.set_status(format!("Joined room {}", room.name));

        if player_count != 1 {
            debug!(player_count, "Relying on scene sync for the arena");
            return Ok(None);
        }

        let arena = room.arena();
        info!(arena = %arena, "First occupant, loading arena");
        if let Err(err) = transport.load_level(&arena) {
            return Err(self.report_arena_failure(err.into()));
        }
        Ok(Some(arena))
    }

    /// Surface a failure raised inside the room on the status line. The
    /// session stays in the room, so leaving remains possible.
    pub fn report_arena_failure(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, state = %self.state.current(), "Arena operation failed");
        self.ui.progress_visible = false;
        self.ui.set_status(format!("Arena error: {}", err));
        err
    }

    pub fn on_left_room(&mut self) -> SessionResult<()> {
        self.state.apply_mut(Transition::LeftRoom)?;
        self.ui.show_controls("");
        Ok(())
    }

    pub fn on_disconnected(&mut self, cause: DisconnectCause) {
        warn!(%cause, state = %self.state.current(), "Disconnected");
        self.join_pending = false;
        if let Err(err) = self.state.apply_mut(Transition::Disconnected) {
            warn!(error = %err, "Disconnect transition rejected");
        }
        self.ui.show_controls(format!("Disconnected: {}", cause));
    }

    fn begin_matchmaking<T>(&mut self, transport: &mut T) -> SessionResult<()>
    where
        T: SessionTransport + ?Sized,
    {
        self.state.apply_mut(Transition::BeginMatchmaking)?;
        debug!("Joining a random room");
        if let Err(err) = transport.join_random_room() {
            return Err(self.abort_matchmaking(err));
        }
        Ok(())
    }

    fn abort_matchmaking(&mut self, err: TransportError) -> SessionError {
        warn!(error = %err, "Matchmaking request refused");
        if let Err(transition) = self.state.apply_mut(Transition::MatchmakingAborted) {
            warn!(error = %transition, "Matchmaking abort transition rejected");
        }
        self.ui.show_controls(format!("Matchmaking failed: {}", err));
        err.into()
    }
}
