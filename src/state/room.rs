//! Room descriptors.
//!
//! A room is the provider-owned container for players sharing one arena.
//! The session core only reads it; the loopback relay mutates it.

use std::collections::BTreeMap;

use super::arena::ArenaIdentifier;
use super::transport::ActorId;

/// A player's entry within a room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPlayer {
    /// Provider-assigned actor number, unique within the room
    pub actor_id: ActorId,

    /// Display name
    pub nickname: String,

    /// When the player entered this room
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl RoomPlayer {
    pub fn new(actor_id: ActorId, nickname: impl Into<String>) -> Self {
        Self {
            actor_id,
            nickname: nickname.into(),
            joined_at: chrono::Utc::now(),
        }
    }
}

/// Room state as reported by the transport provider.
#[derive(Debug, Clone)]
pub struct RoomDescriptor {
    /// Unique room name
    pub name: String,

    /// Players indexed by actor number
    players: BTreeMap<ActorId, RoomPlayer>,

    /// Current master client
    pub master_client: Option<ActorId>,

    /// Maximum players allowed
    pub max_players: u8,

    /// Whether matchmaking may place players here
    pub is_open: bool,

    /// Whether the room is listed for random joins
    pub is_visible: bool,

    /// When the room was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RoomDescriptor {
    pub fn new(name: impl Into<String>, max_players: u8) -> Self {
        Self {
            name: name.into(),
            players: BTreeMap::new(),
            master_client: None,
            max_players,
            is_open: true,
            is_visible: true,
            created_at: chrono::Utc::now(),
        }
    }

    /// Add a player to the room.
    pub fn add_player(&mut self, player: RoomPlayer) -> Result<(), RoomError> {
        if self.is_full() {
            return Err(RoomError::Full);
        }

        if self.players.contains_key(&player.actor_id) {
            return Err(RoomError::AlreadyMember);
        }

        // First player becomes master
        if self.master_client.is_none() {
            self.master_client = Some(player.actor_id);
        }

        self.players.insert(player.actor_id, player);
        Ok(())
    }

    /// Remove a player from the room.
    pub fn remove_player(&mut self, actor_id: ActorId) -> Option<RoomPlayer> {
        let player = self.players.remove(&actor_id)?;

        // Lowest remaining actor number inherits the master role
        if self.master_client == Some(actor_id) {
            self.master_client = self.players.keys().next().copied();
        }

        Some(player)
    }

    pub fn is_master(&self, actor_id: ActorId) -> bool {
        self.master_client == Some(actor_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &RoomPlayer> {
        self.players.values()
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.players.keys().copied()
    }

    pub fn player_count(&self) -> u8 {
        u8::try_from(self.players.len()).unwrap_or(u8::MAX)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_players)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Whether a random join may land here.
    pub fn is_joinable(&self) -> bool {
        self.is_open && self.is_visible && !self.is_full()
    }

    /// Arena every member should be in for the current player count.
    pub fn arena(&self) -> ArenaIdentifier {
        ArenaIdentifier::for_player_count(self.player_count())
    }

    /// Convert to JSON for status displays.
    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self
            .players
            .values()
            .map(|p| {
                serde_json::json!({
                    "actor_id": p.actor_id,
                    "nickname": p.nickname,
                    "joined_at": p.joined_at.to_rfc3339(),
                    "is_master": self.is_master(p.actor_id)
                })
            })
            .collect();

        serde_json::json!({
            "name": self.name,
            "players": players,
            "player_count": self.player_count(),
            "max_players": self.max_players,
            "master_client": self.master_client,
            "is_open": self.is_open,
            "is_visible": self.is_visible,
            "arena": self.arena().as_str()
        })
    }
}

/// Room membership errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full")]
    Full,
    #[error("Already a member of this room")]
    AlreadyMember,
}
