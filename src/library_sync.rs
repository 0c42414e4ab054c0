//! Typed library operations over the serialized bridge.
//!
//! This is the domain boundary: sentinel values coming off the wire (`""`,
//! `"0"`) are normalized to real options here, and list-style operations
//! degrade unusable response shapes to empty collections instead of failing.
//! Single-item mutations stay strict — a reported error is a failure.

use chrono::NaiveDateTime;
use log::{debug, warn};

use crate::bridge_error::BridgeError;
use crate::bridge_executor::BridgeHandle;
use crate::descriptor::ScriptValue;
use crate::protocol::{Folder, LibrarySnapshot, Playlist, Track, LIBRARY_FOLDER_NAME};
use crate::script_builder::ScriptBuilder;

/// Fixed textual date format used by the bridge, POSIX-locale digits, e.g.
/// `"Friday, January 5, 2024 at 3:04:05 PM"`.
pub const BRIDGE_DATE_FORMAT: &str = "%A, %B %-d, %Y at %-I:%M:%S %p";

/// Parses a bridge date string; absent or unparsable input becomes `None`.
pub fn parse_bridge_date(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(text, BRIDGE_DATE_FORMAT).ok()
}

/// Typed operations against the target application's library.
pub struct LibrarySyncService {
    bridge: BridgeHandle,
    builder: ScriptBuilder,
}

impl LibrarySyncService {
    pub fn new(bridge: BridgeHandle, builder: ScriptBuilder) -> Self {
        Self { bridge, builder }
    }

    /// Whether the target application is currently running. Never launches it.
    pub fn is_target_running(&self) -> bool {
        match self.bridge.execute(self.builder.running_probe()) {
            Ok(value) => value.scalar() == Some("running"),
            Err(err) => {
                debug!("LibrarySyncService: running probe failed: {}", err);
                false
            }
        }
    }

    /// Names of every folder in the library.
    pub fn list_folder_names(&self) -> Result<Vec<String>, BridgeError> {
        let value = self.list_value(self.builder.list_folder_names())?;
        Ok(value.into_string_items())
    }

    /// One batched pass over the whole library: root playlists plus each
    /// folder's playlists. One round trip instead of one per folder, which is
    /// slower and fails per-folder.
    pub fn list_all(&self) -> Result<LibrarySnapshot, BridgeError> {
        let value = self.list_value(self.builder.list_all_folders_with_playlists())?;
        Ok(snapshot_from_value(value))
    }

    /// Playlist names inside one folder.
    pub fn list_playlists(&self, folder_name: &str) -> Result<Vec<String>, BridgeError> {
        let value = self.list_value(self.builder.list_playlists_in_folder(folder_name))?;
        Ok(value.into_string_items())
    }

    /// Creates a playlist, optionally filed into an existing folder.
    pub fn create_playlist(
        &self,
        name: &str,
        folder_name: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.bridge
            .execute(self.builder.create_playlist(name, folder_name))
            .map(|_| ())
    }

    /// Creates a folder at the root level.
    pub fn create_folder(&self, name: &str) -> Result<(), BridgeError> {
        self.bridge
            .execute(self.builder.create_folder(name))
            .map(|_| ())
    }

    /// Renames a playlist addressed by persistent id.
    pub fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> Result<(), BridgeError> {
        self.bridge
            .execute(self.builder.rename_playlist(playlist_id, new_name))
            .map(|_| ())
    }

    /// Deletes a playlist addressed by persistent id. A missing playlist is
    /// the distinguished `ObjectNotFound`, never a generic failure.
    pub fn delete_playlist(&self, playlist_id: &str) -> Result<(), BridgeError> {
        self.bridge
            .execute(self.builder.delete_playlist(playlist_id))
            .map(|_| ())
    }

    /// Moves a playlist into a named folder. The reserved root pseudo-folder
    /// is rejected before any command is issued.
    pub fn move_playlist(&self, playlist_id: &str, folder_name: &str) -> Result<(), BridgeError> {
        if folder_name == LIBRARY_FOLDER_NAME {
            return Err(BridgeError::ExecutionFailed(format!(
                "the {} folder cannot be used as a move destination",
                LIBRARY_FOLDER_NAME
            )));
        }
        self.bridge
            .execute(self.builder.move_playlist(playlist_id, folder_name))
            .map(|_| ())
    }

    /// Every track of one playlist, in playlist order.
    pub fn fetch_tracks(&self, playlist_id: &str) -> Result<Vec<Track>, BridgeError> {
        let value = self.list_value(self.builder.fetch_tracks(playlist_id))?;
        Ok(value
            .items()
            .iter()
            .filter_map(track_from_entry)
            .collect())
    }

    /// Executes a list-style command, degrading an undecodable response to a
    /// missing value rather than surfacing `InvalidResponse`.
    fn list_value(
        &self,
        request: crate::script_builder::BridgeRequest,
    ) -> Result<ScriptValue, BridgeError> {
        let label = request.label;
        match self.bridge.execute(request) {
            Ok(value) => Ok(value),
            Err(BridgeError::InvalidResponse) => {
                warn!(
                    "LibrarySyncService: '{}' returned an unusable response, treating as empty",
                    label
                );
                Ok(ScriptValue::Missing)
            }
            Err(err) => Err(err),
        }
    }
}

/// Builds a snapshot from the batched full-library response. Any unexpected
/// shape collapses to an empty snapshot; per-entry problems drop only that
/// entry.
fn snapshot_from_value(value: ScriptValue) -> LibrarySnapshot {
    let outer = value.items();
    if outer.len() != 2 {
        if !value.is_missing() {
            warn!(
                "LibrarySyncService: unexpected full-library response shape ({} parts)",
                outer.len()
            );
        }
        return LibrarySnapshot::default();
    }

    let root_playlists: Vec<Playlist> = outer[0]
        .items()
        .iter()
        .filter_map(playlist_from_entry)
        .collect();

    let folders: Vec<Folder> = outer[1]
        .items()
        .iter()
        .filter_map(|group| {
            let parts = group.items();
            let name = parts.first()?.scalar()?;
            let playlists = parts
                .get(1)
                .map(|entries| {
                    entries
                        .items()
                        .iter()
                        .filter_map(playlist_from_entry)
                        .collect()
                })
                .unwrap_or_default();
            Some(Folder::new(name, playlists))
        })
        .collect();

    LibrarySnapshot {
        root_playlists,
        folders,
    }
}

/// One playlist record: `{name, persistent id, date string}`. The date is
/// optional; records without at least name and id are dropped.
fn playlist_from_entry(entry: &ScriptValue) -> Option<Playlist> {
    let parts = entry.items();
    if parts.len() < 2 {
        return None;
    }
    let name = parts[0].scalar()?;
    let id = parts[1].scalar()?;
    let date_added = parts
        .get(2)
        .and_then(|part| part.scalar())
        .and_then(parse_bridge_date);
    Some(Playlist::new(id, name, date_added))
}

/// One track record: 7 fields, numeric ones still strings at this point.
fn track_from_entry(entry: &ScriptValue) -> Option<Track> {
    let parts = entry.items();
    if parts.len() < 7 {
        return None;
    }
    Some(Track {
        name: parts[0].scalar().unwrap_or("Unknown Track").to_string(),
        artist: parts[1].scalar().unwrap_or("Unknown Artist").to_string(),
        album: parts[2].scalar().unwrap_or("Unknown Album").to_string(),
        duration_secs: parts[3]
            .scalar()
            .and_then(|text| text.parse::<f64>().ok())
            .unwrap_or(0.0),
        genre: parts[4].scalar().and_then(optional_text),
        year: parts[5].scalar().and_then(optional_number),
        track_number: parts[6].scalar().and_then(optional_number),
    })
}

/// `""` is the wire sentinel for an absent text field.
fn optional_text(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// `0` (or anything unparsable) is the wire sentinel for an absent number.
fn optional_number(text: &str) -> Option<i32> {
    match text.parse::<i32>() {
        Ok(0) | Err(_) => None,
        Ok(number) => Some(number),
    }
}
