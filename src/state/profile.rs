//! Player name persistence.
//!
//! The display name is stored under a single preference key, read when the
//! launcher starts and written whenever the user picks a new name. Both
//! paths also push the name to the provider as the nickname other players
//! see.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::transport::SessionTransport;
use crate::error::{PreferenceError, SessionError, SessionResult};

/// Preference key holding the display name.
pub const PLAYER_NAME_KEY: &str = "PlayerName";

/// Name used until the user sets one.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Local key-value preference storage.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// Preferences kept only for the lifetime of the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object on disk.
///
/// The whole file is rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFilePreferences {
    /// Open the store, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PreferenceError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), entries = values.len(), "Opened preference store");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values.insert(key.to_string(), value.to_string());
        let raw = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Read the stored name (or the default) and publish it as the nickname.
pub fn load_player_name<P, T>(store: &P, transport: &mut T) -> String
where
    P: PreferenceStore + ?Sized,
    T: SessionTransport + ?Sized,
{
    let name = store
        .get(PLAYER_NAME_KEY)
        .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string());
    debug!(name = %name, "Loaded player name");
    transport.set_nickname(&name);
    name
}

/// Set a new player name, publishing and persisting it.
pub fn set_player_name<P, T>(value: &str, store: &mut P, transport: &mut T) -> SessionResult<()>
where
    P: PreferenceStore + ?Sized,
    T: SessionTransport + ?Sized,
{
    if value.is_empty() {
        error!("Player name is null or empty");
        return Err(SessionError::EmptyPlayerName);
    }
    store.set(PLAYER_NAME_KEY, value)?;
    transport.set_nickname(value);
    Ok(())
}
