//! Bulk reorganization of root playlists into year-named folders.
//!
//! Root playlists named like `"Jan - 24"` are filed into an existing folder
//! named `"2024"`. The pass is idempotent and tolerates per-item failures:
//! each item either moves, is skipped with a recorded reason, or — for names
//! outside the convention — is passed over silently. Nothing is rolled back.

use std::collections::HashSet;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast;

use crate::bridge_error::BridgeError;
use crate::config::ReorganizeConfig;
use crate::library_sync::LibrarySyncService;
use crate::protocol::{EngineEvent, LibrarySnapshot};

/// Skip reason recorded when the parsed year falls outside the window.
pub const SKIP_YEAR_OUT_OF_RANGE: &str = "year out of range";
/// Skip reason recorded when no folder with the year's name exists.
pub const SKIP_FOLDER_NOT_FOUND: &str = "folder not found";

/// One recorded skip or per-item failure.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SkipEntry {
    pub name: String,
    pub reason: String,
}

/// Outcome of one reorganization pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ReorganizeReport {
    /// Playlists moved into their year folder.
    pub moved: usize,
    /// Playlists skipped with a recorded reason. Names outside the naming
    /// convention are not counted here — they are simply not candidates.
    pub skipped: usize,
    /// One entry per skip or failure, in processing order.
    pub entries: Vec<SkipEntry>,
}

/// Parses a `<alphabetic prefix> - <two digits>` playlist name. Whitespace
/// around the hyphen is optional; anything else disqualifies the name.
pub fn parse_convention_name(name: &str) -> Option<(&str, u32)> {
    let (prefix, rest) = name.split_once('-')?;
    let prefix = prefix.trim_end();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return None;
    }
    let digits = rest.trim_start();
    if digits.len() != 2 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().map(|year| (prefix, year))
}

/// Drives the classify-and-move pass over root playlists.
pub struct Reorganizer<'a> {
    service: &'a LibrarySyncService,
    config: ReorganizeConfig,
    events: broadcast::Sender<EngineEvent>,
}

impl<'a> Reorganizer<'a> {
    pub fn new(
        service: &'a LibrarySyncService,
        config: ReorganizeConfig,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            service,
            config,
            events,
        }
    }

    /// Synchronizes the library and reorganizes its root playlists. Only a
    /// failure of the initial synchronization aborts with a typed error;
    /// everything after that is accumulated in the report.
    pub fn run(&self) -> Result<ReorganizeReport, BridgeError> {
        let snapshot = self.service.list_all()?;
        Ok(self.reorganize(&snapshot))
    }

    /// Reorganizes against an already-synchronized snapshot.
    pub fn reorganize(&self, snapshot: &LibrarySnapshot) -> ReorganizeReport {
        info!(
            "Reorganizer: processing {} root playlists against {} folders",
            snapshot.root_playlists.len(),
            snapshot.folders.len()
        );
        let folder_names: HashSet<&str> = snapshot
            .folders
            .iter()
            .map(|folder| folder.name.as_str())
            .collect();

        let mut report = ReorganizeReport::default();
        let delay = Duration::from_millis(self.config.inter_move_delay_ms);

        for playlist in &snapshot.root_playlists {
            // Names outside the convention are not candidates at all.
            let Some((_, two_digit_year)) = parse_convention_name(&playlist.name) else {
                continue;
            };
            let year = 2000 + two_digit_year as i32;

            if year < self.config.year_min || year > self.config.year_max {
                self.record_skip(&mut report, &playlist.name, SKIP_YEAR_OUT_OF_RANGE);
                continue;
            }

            let folder_name = year.to_string();
            if !folder_names.contains(folder_name.as_str()) {
                self.record_skip(&mut report, &playlist.name, SKIP_FOLDER_NOT_FOUND);
                continue;
            }

            match self.service.move_playlist(&playlist.id, &folder_name) {
                Ok(()) => {
                    report.moved += 1;
                    info!(
                        "Reorganizer: moved '{}' into '{}'",
                        playlist.name, folder_name
                    );
                    let _ = self.events.send(EngineEvent::PlaylistMoved {
                        name: playlist.name.clone(),
                        folder: folder_name,
                    });
                }
                Err(err) => {
                    let fatal = matches!(
                        err,
                        BridgeError::PermissionDenied | BridgeError::TargetAppNotRunning
                    );
                    self.record_skip(&mut report, &playlist.name, &err.to_string());
                    if fatal {
                        // Every remaining move would fail the same way.
                        warn!("Reorganizer: aborting remaining batch: {}", err);
                        break;
                    }
                }
            }

            // Pace successive move commands.
            std::thread::sleep(delay);
        }

        info!(
            "Reorganizer: done, {} moved, {} skipped",
            report.moved, report.skipped
        );
        report
    }

    fn record_skip(&self, report: &mut ReorganizeReport, name: &str, reason: &str) {
        report.skipped += 1;
        report.entries.push(SkipEntry {
            name: name.to_string(),
            reason: reason.to_string(),
        });
        warn!("Reorganizer: skipped '{}': {}", name, reason);
        let _ = self.events.send(EngineEvent::PlaylistSkipped {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_convention_name, Reorganizer, SKIP_FOLDER_NOT_FOUND, SKIP_YEAR_OUT_OF_RANGE,
    };
    use crate::bridge_executor::BridgeExecutor;
    use crate::config::ReorganizeConfig;
    use crate::library_sync::LibrarySyncService;
    use crate::protocol::EngineEvent;
    use crate::readiness_gate::{ProcessControl, ReadinessGate};
    use crate::script_builder::ScriptBuilder;
    use crate::script_runner::{RunOutput, ScriptRunner};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct AlwaysRunning;

    impl ProcessControl for AlwaysRunning {
        fn is_running(&self) -> bool {
            true
        }
        fn request_launch(&self) {}
    }

    /// Serves a canned library snapshot and records issued move commands.
    struct FixtureRunner {
        snapshot_payload: String,
        moves: Arc<Mutex<Vec<String>>>,
        move_response: Box<dyn Fn(&str) -> RunOutput + Send + Sync>,
    }

    impl ScriptRunner for FixtureRunner {
        fn run(&self, script: &str) -> RunOutput {
            if script.contains("move targetPlaylist to targetFolder") {
                self.moves
                    .lock()
                    .expect("move log lock should not be poisoned")
                    .push(script.to_string());
                (self.move_response)(script)
            } else {
                RunOutput {
                    success: true,
                    stdout: self.snapshot_payload.clone(),
                    stderr: String::new(),
                }
            }
        }
    }

    fn snapshot_payload(root_names: &[(&str, &str)]) -> String {
        let roots: Vec<String> = root_names
            .iter()
            .map(|(name, id)| format!("{{\"{}\", \"{}\", \"\"}}", name, id))
            .collect();
        format!(
            "{{{{{}}}, {{{{\"2014\", {{}}}}, {{\"2024\", {{}}}}}}}}\n",
            roots.join(", ")
        )
    }

    fn harness(
        root_names: &[(&str, &str)],
        move_response: impl Fn(&str) -> RunOutput + Send + Sync + 'static,
    ) -> (
        LibrarySyncService,
        Arc<Mutex<Vec<String>>>,
        broadcast::Sender<EngineEvent>,
    ) {
        let moves = Arc::new(Mutex::new(Vec::new()));
        let runner = Arc::new(FixtureRunner {
            snapshot_payload: snapshot_payload(root_names),
            moves: moves.clone(),
            move_response: Box::new(move_response),
        });
        let gate =
            ReadinessGate::with_polling(Box::new(AlwaysRunning), Duration::from_millis(1), 1);
        let (events, _observer) = broadcast::channel(64);
        let handle = BridgeExecutor::spawn(runner, gate, events.clone());
        let service = LibrarySyncService::new(handle, ScriptBuilder::new("com.apple.Music"));
        (service, moves, events)
    }

    fn fast_config() -> ReorganizeConfig {
        ReorganizeConfig {
            year_min: 2014,
            year_max: 2025,
            inter_move_delay_ms: 0,
        }
    }

    fn move_ok(_: &str) -> RunOutput {
        RunOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_name_convention_parsing() {
        assert_eq!(parse_convention_name("Jan - 24"), Some(("Jan", 24)));
        assert_eq!(parse_convention_name("Dec-99"), Some(("Dec", 99)));
        assert_eq!(parse_convention_name("December  -  07"), Some(("December", 7)));
        assert_eq!(parse_convention_name("Vacation Mix"), None);
        assert_eq!(parse_convention_name("Jan - 2024"), None);
        assert_eq!(parse_convention_name("Jan - 2"), None);
        assert_eq!(parse_convention_name("Jan-Feb-24"), None);
        assert_eq!(parse_convention_name("Mix 3 - 24"), None);
        assert_eq!(parse_convention_name("- 24"), None);
        assert_eq!(parse_convention_name("Jan - 24 "), None);
    }

    #[test]
    fn test_matching_playlists_move_into_their_year_folder() {
        let (service, moves, events) = harness(
            &[("Jan - 24", "P1"), ("Feb - 14", "P2")],
            move_ok,
        );
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.entries.is_empty());
        let moves = moves.lock().expect("move log lock should not be poisoned");
        assert!(moves[0].contains("folder playlist \"2024\""));
        assert!(moves[1].contains("folder playlist \"2014\""));
    }

    #[test]
    fn test_out_of_range_year_is_skipped_without_a_move() {
        let (service, moves, events) = harness(&[("Dec-99", "P1")], move_ok);
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.entries[0].name, "Dec-99");
        assert_eq!(report.entries[0].reason, SKIP_YEAR_OUT_OF_RANGE);
        assert!(moves.lock().expect("move log lock should not be poisoned").is_empty());
    }

    #[test]
    fn test_non_matching_names_are_passed_over_silently() {
        let (service, moves, events) = harness(&[("Vacation Mix", "P1")], move_ok);
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.entries.is_empty());
        assert!(moves.lock().expect("move log lock should not be poisoned").is_empty());
    }

    #[test]
    fn test_missing_destination_folder_is_skipped_without_a_move() {
        let (service, moves, events) = harness(&[("Mar - 17", "P1")], move_ok);
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.entries[0].reason, SKIP_FOLDER_NOT_FOUND);
        assert!(moves.lock().expect("move log lock should not be poisoned").is_empty());
    }

    #[test]
    fn test_mixed_batch_matches_the_documented_scenarios() {
        let (service, moves, events) = harness(
            &[
                ("Jan - 24", "P1"),
                ("Dec-99", "P2"),
                ("Vacation Mix", "P3"),
                ("Mar - 17", "P4"),
                ("Feb - 14", "P5"),
            ],
            move_ok,
        );
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].name, "Dec-99");
        assert_eq!(report.entries[1].name, "Mar - 17");
        assert_eq!(moves.lock().expect("move log lock should not be poisoned").len(), 2);
    }

    #[test]
    fn test_per_item_move_failure_does_not_abort_the_batch() {
        let (service, moves, events) = harness(
            &[("Jan - 24", "P1"), ("Feb - 14", "P2")],
            |script| {
                if script.contains("\"P1\"") {
                    RunOutput::failure("execution error: something odd (-1409)")
                } else {
                    move_ok(script)
                }
            },
        );
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.entries[0].name, "Jan - 24");
        assert!(report.entries[0].reason.contains("something odd"));
        assert_eq!(moves.lock().expect("move log lock should not be poisoned").len(), 2);
    }

    #[test]
    fn test_process_level_failure_aborts_the_remaining_batch() {
        let (service, moves, events) = harness(
            &[("Jan - 24", "P1"), ("Feb - 14", "P2"), ("Apr - 15", "P3")],
            |_| RunOutput::failure("execution error: not authorized (-1743)"),
        );
        let report = Reorganizer::new(&service, fast_config(), events)
            .run()
            .expect("reorganization should run");

        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped, 1);
        // Only the first move was attempted; the rest were abandoned.
        assert_eq!(moves.lock().expect("move log lock should not be poisoned").len(), 1);
    }

    #[test]
    fn test_skip_events_are_published() {
        let (service, _moves, events) = harness(&[("Dec-99", "P1")], move_ok);
        let mut observer = events.subscribe();
        Reorganizer::new(&service, fast_config(), events.clone())
            .run()
            .expect("reorganization should run");

        let mut saw_skip = false;
        while let Ok(event) = observer.try_recv() {
            if let EngineEvent::PlaylistSkipped { name, reason } = event {
                assert_eq!(name, "Dec-99");
                assert_eq!(reason, SKIP_YEAR_OUT_OF_RANGE);
                saw_skip = true;
            }
        }
        assert!(saw_skip, "a skip event should be published");
    }
}
