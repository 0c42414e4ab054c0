//! AppleScript command construction for the automation bridge.
//!
//! Only a fixed set of command templates exists; every interpolated string is
//! escaped before embedding. Building never fails.

/// Timeout budget categories for bridge commands. Listings that enumerate
/// large collections get a wider budget than single-object mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    /// create/rename/move commands.
    Mutation,
    /// delete commands; object resolution can be slower on large libraries.
    Delete,
    /// Listing one folder's playlists.
    FolderListing,
    /// Full-library enumeration in one pass.
    FullLibrary,
    /// Enumerating every track of one playlist.
    TrackFetch,
}

impl CommandCategory {
    /// Budget embedded in the command's `with timeout of` block. The bridge
    /// enforces this server-side; the host does not run a second timer.
    pub fn timeout_secs(self) -> u32 {
        match self {
            CommandCategory::Mutation => 10,
            CommandCategory::Delete => 15,
            CommandCategory::FolderListing => 20,
            CommandCategory::FullLibrary => 60,
            CommandCategory::TrackFetch => 60,
        }
    }
}

/// Whether a command is expected to print a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Read-style command; the response is decoded into a value tree.
    Expect,
    /// Imperative command; a clean exit with no output is success.
    NoOutput,
}

/// One ready-to-execute bridge command.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    /// Complete command text, readiness preamble included.
    pub script: String,
    pub mode: ResponseMode,
    /// Short operation name used for logs and busy-window events.
    pub label: &'static str,
    /// Whether the host-side readiness gate runs before execution. Only the
    /// running probe skips it, so that a status check never launches the app.
    pub gated: bool,
}

/// Escapes untrusted text for embedding in a quoted script literal.
///
/// Backslashes must be doubled before quotes are escaped, otherwise the
/// second pass would re-escape the backslashes introduced by the first.
/// Nothing else is touched; control characters pass through unchanged.
pub fn escape_script_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders the fixed command template set against one target application.
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    app_id: String,
}

impl ScriptBuilder {
    /// Creates a builder for the given bundle identifier.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: escape_script_text(&app_id.into()),
        }
    }

    /// Pure running check that does not trigger an automation-consent prompt
    /// and never launches the target application.
    pub fn running_probe(&self) -> BridgeRequest {
        let script = format!(
            r#"if application id "{app}" is running then
    return "running"
else
    return "notRunning"
end if
"#,
            app = self.app_id
        );
        BridgeRequest {
            script,
            mode: ResponseMode::Expect,
            label: "running_probe",
            gated: false,
        }
    }

    /// Names of every folder playlist.
    pub fn list_folder_names(&self) -> BridgeRequest {
        self.request(
            CommandCategory::FolderListing,
            ResponseMode::Expect,
            "list_folder_names",
            "            return name of every folder playlist",
        )
    }

    /// Full-library pass: root playlist records plus folder-name groupings,
    /// batched into one round trip so a large library never needs one call
    /// per folder.
    pub fn list_all_folders_with_playlists(&self) -> BridgeRequest {
        self.request(
            CommandCategory::FullLibrary,
            ResponseMode::Expect,
            "list_all",
            LIST_ALL_BODY,
        )
    }

    /// Playlist names inside one folder, with a nested-folder fallback.
    pub fn list_playlists_in_folder(&self, folder_name: &str) -> BridgeRequest {
        let safe_name = escape_script_text(folder_name);
        let script = format!(
            r#"{preamble}
try
    tell application id "{app}"
        with timeout of {timeout} seconds
            set out to {{}}
            set targetFolder to first folder playlist whose name is "{safe_name}"
            repeat with p in (every playlist of targetFolder)
                try
                    if (class of p is user playlist) then
                        set nm to name of p
                        set end of out to nm
                    end if
                end try
            end repeat
            if (count of out) is 0 then
                set out to my gatherUserPlaylists(targetFolder)
            end if
            return out
        end timeout
    end tell
on error errMsg number errNum
    error errMsg number errNum
end try

on gatherUserPlaylists(fld)
    set out to {{}}
    tell application id "{app}"
        set ups to (user playlists of fld whose class is not folder playlist)
        repeat with p in ups
            set nm to name of p
            set end of out to nm
        end repeat
        set subs to folder playlists of fld
        repeat with f in subs
            set more to my gatherUserPlaylists(f)
            repeat with rec in more
                set end of out to rec
            end repeat
        end repeat
    end tell
    return out
end gatherUserPlaylists
"#,
            preamble = self.preamble(),
            app = self.app_id,
            timeout = CommandCategory::FolderListing.timeout_secs(),
            safe_name = safe_name,
        );
        BridgeRequest {
            script,
            mode: ResponseMode::Expect,
            label: "list_playlists",
            gated: true,
        }
    }

    /// Creates a user playlist, optionally filed into an existing folder.
    pub fn create_playlist(&self, name: &str, folder_name: Option<&str>) -> BridgeRequest {
        let safe_name = escape_script_text(name);
        let body = match folder_name {
            Some(folder) => format!(
                r#"            set newPlaylist to make new user playlist with properties {{name: "{safe_name}"}}
            set targetFolder to folder playlist "{safe_folder}"
            move newPlaylist to targetFolder"#,
                safe_name = safe_name,
                safe_folder = escape_script_text(folder),
            ),
            None => format!(
                r#"            make new user playlist with properties {{name: "{safe_name}"}}"#,
                safe_name = safe_name,
            ),
        };
        self.request(
            CommandCategory::Mutation,
            ResponseMode::NoOutput,
            "create_playlist",
            &body,
        )
    }

    /// Creates a folder playlist at the root level.
    pub fn create_folder(&self, name: &str) -> BridgeRequest {
        let body = format!(
            "            make new folder playlist with properties {{name: \"{}\"}}",
            escape_script_text(name)
        );
        self.request(
            CommandCategory::Mutation,
            ResponseMode::NoOutput,
            "create_folder",
            &body,
        )
    }

    /// Renames a playlist addressed by persistent id.
    pub fn rename_playlist(&self, playlist_id: &str, new_name: &str) -> BridgeRequest {
        let body = format!(
            r#"            set targetPlaylist to first user playlist whose persistent ID is "{id}"
            set name of targetPlaylist to "{name}""#,
            id = escape_script_text(playlist_id),
            name = escape_script_text(new_name),
        );
        self.request(
            CommandCategory::Mutation,
            ResponseMode::NoOutput,
            "rename_playlist",
            &body,
        )
    }

    /// Deletes a playlist addressed by persistent id.
    pub fn delete_playlist(&self, playlist_id: &str) -> BridgeRequest {
        let body = format!(
            r#"            set targetPlaylist to first user playlist whose persistent ID is "{id}"
            delete targetPlaylist"#,
            id = escape_script_text(playlist_id),
        );
        self.request(
            CommandCategory::Delete,
            ResponseMode::NoOutput,
            "delete_playlist",
            &body,
        )
    }

    /// Moves a playlist addressed by persistent id into a named folder.
    pub fn move_playlist(&self, playlist_id: &str, folder_name: &str) -> BridgeRequest {
        let body = format!(
            r#"            set targetFolder to folder playlist "{folder}"
            set targetPlaylist to first user playlist whose persistent ID is "{id}"
            move targetPlaylist to targetFolder"#,
            folder = escape_script_text(folder_name),
            id = escape_script_text(playlist_id),
        );
        self.request(
            CommandCategory::Mutation,
            ResponseMode::NoOutput,
            "move_playlist",
            &body,
        )
    }

    /// Every track of one playlist as 7-item records.
    pub fn fetch_tracks(&self, playlist_id: &str) -> BridgeRequest {
        let body = format!(
            "            set targetPlaylist to first user playlist whose persistent ID is \"{}\"\n{}",
            escape_script_text(playlist_id),
            FETCH_TRACKS_BODY,
        );
        self.request(
            CommandCategory::TrackFetch,
            ResponseMode::Expect,
            "fetch_tracks",
            &body,
        )
    }

    /// Launch-and-poll preamble prepended to every gated command, so a replay
    /// of the raw script text is self-sufficient.
    fn preamble(&self) -> String {
        format!(
            r#"-- Ensure the target app is running and ready (max ~5s)
try
    if application id "{app}" is not running then
        do shell script "open -b {app}"
    end if
end try
repeat with i from 1 to 50
    if application id "{app}" is running then exit repeat
    delay 0.1
end repeat
"#,
            app = self.app_id
        )
    }

    fn request(
        &self,
        category: CommandCategory,
        mode: ResponseMode,
        label: &'static str,
        body: &str,
    ) -> BridgeRequest {
        let script = format!(
            r#"{preamble}
try
    tell application id "{app}"
        with timeout of {timeout} seconds
{body}
        end timeout
    end tell
on error errMsg number errNum
    error errMsg number errNum
end try
"#,
            preamble = self.preamble(),
            app = self.app_id,
            timeout = category.timeout_secs(),
            body = body,
        );
        BridgeRequest {
            script,
            mode,
            label,
            gated: true,
        }
    }
}

const LIST_ALL_BODY: &str = r#"            set allUserPlaylists to every user playlist

            set rootRecs to {}
            set folderGroups to {}

            repeat with p in allUserPlaylists
                try
                    if (special kind of p) is none then
                        set nm to name of p
                        set pid to (persistent ID of p)

                        -- Earliest track date stands in for a creation date
                        set dateStr to ""
                        try
                            set trackList to every track of p
                            if (count of trackList) > 0 then
                                set earliestDate to missing value
                                repeat with tr in trackList
                                    try
                                        set tDate to date added of tr
                                        if earliestDate is missing value or tDate comes before earliestDate then
                                            set earliestDate to tDate
                                        end if
                                    end try
                                end repeat
                                if earliestDate is not missing value then
                                    set dateStr to earliestDate as text
                                end if
                            end if
                        end try

                        try
                            set parentName to name of (parent of p)
                            set foundGroup to false
                            repeat with grp in folderGroups
                                if (item 1 of grp) is parentName then
                                    set foundGroup to true
                                    set end of (item 2 of grp) to {nm, pid, dateStr}
                                    exit repeat
                                end if
                            end repeat
                            if not foundGroup then
                                set end of folderGroups to {parentName, {{nm, pid, dateStr}}}
                            end if
                        on error
                            -- No parent means root level
                            set end of rootRecs to {nm, pid, dateStr}
                        end try
                    end if
                end try
            end repeat

            return {rootRecs, folderGroups}"#;

const FETCH_TRACKS_BODY: &str = r#"            set trackList to every track of targetPlaylist
            set songData to {}

            repeat with tr in trackList
                try
                    set trackName to name of tr
                    set trackArtist to artist of tr
                    set trackAlbum to album of tr
                    set trackDuration to duration of tr

                    try
                        set trackGenre to genre of tr
                    on error
                        set trackGenre to ""
                    end try

                    try
                        set trackYear to year of tr
                    on error
                        set trackYear to 0
                    end try

                    try
                        set trackNum to track number of tr
                    on error
                        set trackNum to 0
                    end try

                    set end of songData to {trackName, trackArtist, trackAlbum, trackDuration, trackGenre, trackYear, trackNum}
                end try
            end repeat

            return songData"#;
