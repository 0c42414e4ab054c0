//! Persistent engine configuration model and defaults.

use std::path::PathBuf;

use log::warn;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Bridge target and readiness polling.
    pub bridge: BridgeConfig,
    #[serde(default)]
    /// Bulk reorganization tuning.
    pub reorganize: ReorganizeConfig,
}

/// Which application the bridge drives, and how long to wait for it.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_target_app_id")]
    pub target_app_id: String,
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    #[serde(default = "default_ready_poll_attempts")]
    pub ready_poll_attempts: u32,
}

/// Year window and pacing for the reorganization workflow.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReorganizeConfig {
    #[serde(default = "default_year_min")]
    pub year_min: i32,
    #[serde(default = "default_year_max")]
    pub year_max: i32,
    /// Pause between successive move commands so the target application is
    /// never flooded.
    #[serde(default = "default_inter_move_delay_ms")]
    pub inter_move_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target_app_id: default_target_app_id(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_poll_attempts: default_ready_poll_attempts(),
        }
    }
}

impl Default for ReorganizeConfig {
    fn default() -> Self {
        Self {
            year_min: default_year_min(),
            year_max: default_year_max(),
            inter_move_delay_ms: default_inter_move_delay_ms(),
        }
    }
}

fn default_target_app_id() -> String {
    "com.apple.Music".to_string()
}

fn default_ready_poll_interval_ms() -> u64 {
    100
}

fn default_ready_poll_attempts() -> u32 {
    50
}

fn default_year_min() -> i32 {
    2014
}

fn default_year_max() -> i32 {
    2025
}

fn default_inter_move_delay_ms() -> u64 {
    100
}

/// Location of the persisted config file, if a config directory exists.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tunefold").join("config.toml"))
}

/// Loads the persisted configuration, falling back to defaults when the file
/// is absent or unreadable. A malformed file is reported, not fatal.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Config: failed to parse {}: {}; using defaults",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

/// Writes the configuration wholesale.
pub fn save_config(config: &Config) -> Result<(), String> {
    let Some(path) = config_file_path() else {
        return Err("no config directory available on this system".to_string());
    };
    let Some(parent) = path.parent() else {
        return Err(format!("config path {} has no parent", path.display()));
    };
    std::fs::create_dir_all(parent)
        .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
    let text = toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config: {}", err))?;
    std::fs::write(&path, text)
        .map_err(|err| format!("failed to write {}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::{Config, ReorganizeConfig};

    #[test]
    fn test_defaults_target_the_music_app() {
        let config = Config::default();
        assert_eq!(config.bridge.target_app_id, "com.apple.Music");
        assert_eq!(config.bridge.ready_poll_interval_ms, 100);
        assert_eq!(config.bridge.ready_poll_attempts, 50);
        assert_eq!(config.reorganize.year_min, 2014);
        assert_eq!(config.reorganize.year_max, 2025);
        assert_eq!(config.reorganize.inter_move_delay_ms, 100);
    }

    #[test]
    fn test_partial_files_fill_in_field_defaults() {
        let config: Config = toml::from_str(
            "[reorganize]\nyear_max = 2030\n",
        )
        .expect("partial config should parse");
        assert_eq!(config.reorganize.year_max, 2030);
        assert_eq!(config.reorganize.year_min, 2014);
        assert_eq!(config.bridge.target_app_id, "com.apple.Music");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.bridge.target_app_id = "com.example.Player".to_string();
        config.reorganize = ReorganizeConfig {
            year_min: 2000,
            year_max: 2010,
            inter_move_delay_ms: 250,
        };
        let text = toml::to_string_pretty(&config).expect("config should serialize");
        let parsed: Config = toml::from_str(&text).expect("config should parse back");
        assert_eq!(parsed, config);
    }
}
