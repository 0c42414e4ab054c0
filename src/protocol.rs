//! Domain records and event payloads shared by all engine components.
//!
//! Everything here is a read-only mirror of the target application's library:
//! records are discovered by synchronization and never locally authoritative.
//! Mutations go through the bridge first; the mirror is refreshed by
//! re-synchronizing, or patched optimistically after a confirmed delete.

use chrono::NaiveDateTime;

/// Reserved root pseudo-folder presented by the target application.
///
/// Never deletable, never a move destination, and excluded from the folder
/// candidates offered to the move-to-folder picker.
pub const LIBRARY_FOLDER_NAME: &str = "Library";

/// A playlist folder discovered in the target library.
///
/// The bridge does not assign persistent identifiers to folders, so folders
/// carry a locally generated id that is stable for the lifetime of one
/// snapshot.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Folder {
    /// Locally assigned id (uuid), stable within a snapshot.
    pub id: String,
    /// User-visible folder name.
    pub name: String,
    /// Playlists contained directly in this folder.
    pub playlists: Vec<Playlist>,
}

impl Folder {
    /// Creates a folder record with a fresh local id.
    pub fn new(name: impl Into<String>, playlists: Vec<Playlist>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            playlists,
        }
    }

    /// True for the reserved root pseudo-folder.
    pub fn is_reserved(&self) -> bool {
        self.name == LIBRARY_FOLDER_NAME
    }
}

/// A playlist discovered in the target library.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Playlist {
    /// Persistent id assigned by the target application; survives renames.
    pub id: String,
    /// User-visible playlist name.
    pub name: String,
    /// Earliest item timestamp, used only as a sort tiebreaker.
    pub date_added: Option<NaiveDateTime>,
}

impl Playlist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        date_added: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            date_added,
        }
    }
}

/// One track row fetched from a playlist.
///
/// Optional fields are explicit here; the protocol's sentinel values (`""`,
/// `0`) are normalized away before a `Track` is constructed.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    pub name: String,
    pub artist: String,
    pub album: String,
    /// Duration in seconds.
    pub duration_secs: f64,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<i32>,
}

/// Which entry kinds a snapshot view should include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFilter {
    All,
    FoldersOnly,
    PlaylistsOnly,
}

/// Sort orders applied to playlist lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistSort {
    /// Keep the order reported by the target application.
    Original,
    Alphabetical,
    ReverseAlphabetical,
    NewestFirst,
    OldestFirst,
}

/// Result of one full-library synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibrarySnapshot {
    /// Playlists living at the root level, outside any folder.
    pub root_playlists: Vec<Playlist>,
    /// Folders with their directly contained playlists (one level deep).
    pub folders: Vec<Folder>,
}

impl LibrarySnapshot {
    /// Looks up a folder by exact name.
    pub fn folder_named(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|folder| folder.name == name)
    }

    /// Folders eligible as move destinations, filtered by a case-insensitive
    /// search query. The reserved root pseudo-folder is never offered.
    pub fn move_destinations(&self, query: &str) -> Vec<&Folder> {
        self.folders
            .iter()
            .filter(|folder| !folder.is_reserved())
            .filter(|folder| matches_query(&folder.name, query))
            .collect()
    }

    /// Folders matching a filter mode and search query. A folder matches the
    /// query when its own name matches or any contained playlist name does.
    pub fn filtered_folders(&self, filter: SnapshotFilter, query: &str) -> Vec<&Folder> {
        if filter == SnapshotFilter::PlaylistsOnly {
            return Vec::new();
        }
        self.folders
            .iter()
            .filter(|folder| {
                matches_query(&folder.name, query)
                    || folder
                        .playlists
                        .iter()
                        .any(|playlist| matches_query(&playlist.name, query))
            })
            .collect()
    }

    /// Root playlists matching a filter mode and search query.
    pub fn filtered_root_playlists(
        &self,
        filter: SnapshotFilter,
        query: &str,
    ) -> Vec<&Playlist> {
        if filter == SnapshotFilter::FoldersOnly {
            return Vec::new();
        }
        self.root_playlists
            .iter()
            .filter(|playlist| matches_query(&playlist.name, query))
            .collect()
    }

    /// Removes a playlist from the mirror by persistent id.
    ///
    /// Used for the optimistic local update after a confirmed delete, instead
    /// of a full re-synchronization. Returns whether anything was removed.
    pub fn remove_playlist(&mut self, id: &str) -> bool {
        let root_len = self.root_playlists.len();
        self.root_playlists.retain(|playlist| playlist.id != id);
        if self.root_playlists.len() != root_len {
            return true;
        }
        for folder in &mut self.folders {
            let len = folder.playlists.len();
            folder.playlists.retain(|playlist| playlist.id != id);
            if folder.playlists.len() != len {
                return true;
            }
        }
        false
    }
}

fn matches_query(name: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    name.to_lowercase().contains(&query.to_lowercase())
}

/// Sorts playlists in place. Dated entries always sort before undated ones;
/// undated entries keep their relative order.
pub fn sort_playlists(playlists: &mut [Playlist], sort: PlaylistSort) {
    match sort {
        PlaylistSort::Original => {}
        PlaylistSort::Alphabetical => {
            playlists.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        PlaylistSort::ReverseAlphabetical => {
            playlists.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()));
        }
        PlaylistSort::NewestFirst => {
            playlists.sort_by(|a, b| match (&a.date_added, &b.date_added) {
                (Some(first), Some(second)) => second.cmp(first),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        PlaylistSort::OldestFirst => {
            playlists.sort_by(|a, b| match (&a.date_added, &b.date_added) {
                (Some(first), Some(second)) => first.cmp(second),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
    }
}

/// Notifications published on the engine's broadcast bus.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A bridge command left the queue and entered its busy window.
    CommandStarted { label: &'static str },
    /// A bridge command finished and the channel is idle again.
    CommandFinished { label: &'static str, success: bool },
    /// The reorganizer moved one playlist into a year folder.
    PlaylistMoved { name: String, folder: String },
    /// The reorganizer recorded a skip or per-item failure.
    PlaylistSkipped { name: String, reason: String },
}
