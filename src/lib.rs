//! tunefold drives the macOS Music application over its AppleScript
//! automation bridge: it mirrors the library's folders and playlists, applies
//! typed mutations, and reorganizes root playlists into year-named folders.
//!
//! All automation traffic is serialized through one bridge worker; see
//! [`bridge_executor::BridgeExecutor`].

pub mod bridge_error;
pub mod bridge_executor;
pub mod config;
pub mod descriptor;
pub mod library_sync;
pub mod protocol;
pub mod readiness_gate;
pub mod reorganizer;
pub mod script_builder;
pub mod script_runner;

pub use bridge_error::BridgeError;
pub use bridge_executor::{BridgeExecutor, BridgeHandle};
pub use library_sync::LibrarySyncService;
pub use protocol::{EngineEvent, Folder, LibrarySnapshot, Playlist, Track};
pub use reorganizer::{ReorganizeReport, Reorganizer};
pub use script_builder::ScriptBuilder;
pub use script_runner::{OsaScriptRunner, ScriptRunner};
