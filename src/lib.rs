//! Arena Session Library
//!
//! Session lifecycle and arena hosting for a multiplayer party game client
//! running on top of a managed relay.
//!
//! # Overview
//!
//! - **Connection Coordination** - Connect to the master service, join any
//!   open room or create one, and have the first occupant load the arena.
//!
//! - **Arena Management** - Spawn the local player exactly once per room
//!   membership, pull it back into the arena after a reload, and let only
//!   the master client reload the arena when players come and go.
//!
//! - **Session State Machine** - Validated transitions from idle through
//!   matchmaking to in-room.
//!
//! - **Loopback Relay** - An in-process provider for running several clients
//!   against each other.
//!
//! # Design Principles
//!
//! 1. **Events in, requests out** - Provider callbacks, engine scene loads
//!    and user actions are all [`SessionEvent`]s; everything the session
//!    wants from the world goes through [`SessionTransport`] or
//!    [`SceneHost`].
//!
//! 2. **Authority is read, never cached** - Master-only work starts by
//!    acquiring a [`HostAuthority`] from the provider.
//!
//! 3. **No ambient globals** - One [`ClientSession`] owns all per-process
//!    state.
//!
//! # Example
//!
//! ```rust,ignore
//! use arena_session::{ClientSession, LauncherConfig, LoopbackRelay, MemoryPreferences, SessionEvent};
//!
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
//! assert!(session.state().is_in_room());
//! ```

pub mod config;
pub mod error;
pub mod state;

pub use config::LauncherConfig;
pub use error::{ConfigError, PreferenceError, SessionError, SessionResult, TransportError};

// Re-export everything from state module at crate root
pub use state::*;
