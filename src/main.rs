//! Command-line driver for the tunefold engine.
//!
//! This is a deliberately thin surface: it parses one subcommand, calls the
//! typed engine operation, prints domain records, and renders every failure
//! as its single human-readable string.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

use tunefold::config::{load_config, Config};
use tunefold::library_sync::LibrarySyncService;
use tunefold::protocol::{EngineEvent, LibrarySnapshot, Track};
use tunefold::readiness_gate::{OsaProcessControl, ReadinessGate};
use tunefold::reorganizer::{ReorganizeReport, Reorganizer};
use tunefold::script_builder::ScriptBuilder;
use tunefold::script_runner::OsaScriptRunner;
use tunefold::{BridgeError, BridgeExecutor};

const USAGE: &str = "usage: tunefold [--verbose] [--json] <command>

commands:
  running                          check whether the Music app is running
  folders                          list folder names
  snapshot                         list root playlists and folders
  playlists <folder>               list playlist names in a folder
  tracks <playlist-id>             list tracks of a playlist
  create-playlist <name> [folder]  create a playlist, optionally in a folder
  create-folder <name>             create a folder
  rename <id> <new-name>           rename a playlist by persistent id
  delete <id>                      delete a playlist by persistent id
  move <id> <folder>               move a playlist into a folder
  reorganize                       file root playlists into year folders
";

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

struct CliOptions {
    json: bool,
    command: Vec<String>,
}

fn parse_args() -> (log::LevelFilter, CliOptions) {
    let mut level = log::LevelFilter::Info;
    let mut json = false;
    let mut command = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" => level = log::LevelFilter::Debug,
            "--json" => json = true,
            _ => command.push(arg),
        }
    }
    (level, CliOptions { json, command })
}

fn build_service(config: &Config, events: broadcast::Sender<EngineEvent>) -> LibrarySyncService {
    let runner = Arc::new(OsaScriptRunner);
    let control = OsaProcessControl::new(runner.clone(), config.bridge.target_app_id.clone());
    let gate = ReadinessGate::with_polling(
        Box::new(control),
        Duration::from_millis(config.bridge.ready_poll_interval_ms),
        config.bridge.ready_poll_attempts,
    );
    let handle = BridgeExecutor::spawn(runner, gate, events);
    LibrarySyncService::new(handle, ScriptBuilder::new(&config.bridge.target_app_id))
}

fn print_snapshot(snapshot: &LibrarySnapshot, json: bool) -> Result<(), BridgeError> {
    if json {
        match serde_json::to_string_pretty(snapshot) {
            Ok(text) => println!("{}", text),
            Err(err) => return Err(BridgeError::ExecutionFailed(err.to_string())),
        }
        return Ok(());
    }
    for playlist in &snapshot.root_playlists {
        println!("{}  [{}]", playlist.name, playlist.id);
    }
    for folder in &snapshot.folders {
        println!("{}/", folder.name);
        for playlist in &folder.playlists {
            println!("  {}  [{}]", playlist.name, playlist.id);
        }
    }
    Ok(())
}

fn print_tracks(tracks: &[Track], json: bool) -> Result<(), BridgeError> {
    if json {
        match serde_json::to_string_pretty(tracks) {
            Ok(text) => println!("{}", text),
            Err(err) => return Err(BridgeError::ExecutionFailed(err.to_string())),
        }
        return Ok(());
    }
    for track in tracks {
        let minutes = (track.duration_secs / 60.0).floor() as u64;
        let seconds = (track.duration_secs % 60.0).round() as u64;
        println!(
            "{} — {} ({}) {}:{:02}",
            track.name, track.artist, track.album, minutes, seconds
        );
    }
    Ok(())
}

fn print_report(report: &ReorganizeReport, json: bool) -> Result<(), BridgeError> {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(err) => return Err(BridgeError::ExecutionFailed(err.to_string())),
        }
        return Ok(());
    }
    println!("moved: {}", report.moved);
    println!("skipped: {}", report.skipped);
    for entry in &report.entries {
        println!("  {}: {}", entry.name, entry.reason);
    }
    Ok(())
}

fn run_command(
    service: &LibrarySyncService,
    config: &Config,
    events: broadcast::Sender<EngineEvent>,
    options: &CliOptions,
) -> Result<(), BridgeError> {
    let command: Vec<&str> = options.command.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["running"] => {
            if service.is_target_running() {
                println!("running");
            } else {
                println!("not running");
            }
            Ok(())
        }
        ["folders"] => {
            for name in service.list_folder_names()? {
                println!("{}", name);
            }
            Ok(())
        }
        ["snapshot"] => {
            let snapshot = service.list_all()?;
            print_snapshot(&snapshot, options.json)
        }
        ["playlists", folder] => {
            for name in service.list_playlists(folder)? {
                println!("{}", name);
            }
            Ok(())
        }
        ["tracks", playlist_id] => {
            let tracks = service.fetch_tracks(playlist_id)?;
            print_tracks(&tracks, options.json)
        }
        ["create-playlist", name] => service.create_playlist(name, None),
        ["create-playlist", name, folder] => service.create_playlist(name, Some(folder)),
        ["create-folder", name] => service.create_folder(name),
        ["rename", id, new_name] => service.rename_playlist(id, new_name),
        ["delete", id] => service.delete_playlist(id),
        ["move", id, folder] => service.move_playlist(id, folder),
        ["reorganize"] => {
            let reorganizer = Reorganizer::new(service, config.reorganize.clone(), events);
            let report = reorganizer.run()?;
            print_report(&report, options.json)
        }
        _ => {
            eprint!("{}", USAGE);
            Err(BridgeError::ExecutionFailed(
                "unrecognized command".to_string(),
            ))
        }
    }
}

fn main() -> ExitCode {
    let (level, options) = parse_args();
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let thread_name = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        log::error!(
            "panic in thread '{}': {}",
            thread_name,
            panic_payload_to_string(panic_info.payload())
        );
    }));

    if options.command.is_empty() {
        eprint!("{}", USAGE);
        return ExitCode::FAILURE;
    }

    let config = load_config();
    info!("tunefold: driving {}", config.bridge.target_app_id);
    let (events, _observer) = broadcast::channel(256);
    let service = build_service(&config, events.clone());

    match run_command(&service, &config, events, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
