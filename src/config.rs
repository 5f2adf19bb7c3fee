//! Launcher configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::arena::Vec3;
use crate::state::transport::SceneRef;

/// Default compatibility version. Clients only match with the same version.
pub const DEFAULT_GAME_VERSION: &str = "1";

/// Default room capacity used when this client has to create a room.
pub const DEFAULT_MAX_PLAYERS_PER_ROOM: u8 = 4;

/// Default prefab name for the replicated player entity.
pub const DEFAULT_PLAYER_PREFAB: &str = "Player";

/// Default distance probed below the player for solid ground.
pub const DEFAULT_GROUND_CHECK_DISTANCE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Compatibility version sent with the connect request
    pub game_version: String,

    /// Capacity of rooms created by this client
    pub max_players_per_room: u8,

    /// Whether `load_level` on the master is mirrored to every room member
    pub automatically_sync_scene: bool,

    /// Prefab used for the local player. `None` disables spawning.
    pub player_prefab: Option<String>,

    /// Where the local player is instantiated
    pub spawn_point: Vec3,

    /// Where the local player is moved when it ends up out of bounds
    pub fallback_position: Vec3,

    /// How far below the player ground must be found
    pub ground_check_distance: f32,

    /// Scene loaded after leaving a room
    pub launcher_scene: SceneRef,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            game_version: DEFAULT_GAME_VERSION.to_string(),
            max_players_per_room: DEFAULT_MAX_PLAYERS_PER_ROOM,
            automatically_sync_scene: true,
            player_prefab: Some(DEFAULT_PLAYER_PREFAB.to_string()),
            spawn_point: Vec3::new(0.0, 5.0, 0.0),
            fallback_position: Vec3::new(0.0, 5.0, 0.0),
            ground_check_distance: DEFAULT_GROUND_CHECK_DISTANCE,
            launcher_scene: SceneRef::Index(0),
        }
    }
}

impl LauncherConfig {
    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game_version.trim().is_empty() {
            return Err(ConfigError::Invalid("game_version must not be empty".into()));
        }
        if self.max_players_per_room == 0 {
            return Err(ConfigError::Invalid(
                "max_players_per_room must be at least 1".into(),
            ));
        }
        if self.ground_check_distance.is_nan() || self.ground_check_distance <= 0.0 {
            return Err(ConfigError::Invalid(
                "ground_check_distance must be positive".into(),
            ));
        }
        Ok(())
    }
}
