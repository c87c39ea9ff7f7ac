use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::splits::{default_split_route, SplitTarget};

const SAVE_FILE_NAME: &str = "Saves.yaml";
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherSettings {
    pub save_path: PathBuf,
    pub output_directory: PathBuf,
    pub poll_interval_ms: u64,
    pub save_activity_log: bool,
    pub save_completed_runs: bool,
    pub splits: Vec<SplitTarget>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        let save_directory = default_save_directory();
        Self {
            save_path: save_directory.join(SAVE_FILE_NAME),
            output_directory: save_directory,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            save_activity_log: false,
            save_completed_runs: false,
            splits: default_split_route(),
        }
    }
}

impl WatcherSettings {
    /// Reads a JSON settings file. A missing file yields the defaults.
    pub fn load(settings_path: &Path) -> Result<Self, String> {
        let raw_json = match std::fs::read_to_string(settings_path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    settings_path = %settings_path.display(),
                    "Settings file not found, using defaults"
                );
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(format!(
                    "Failed to read settings '{}': {error}",
                    settings_path.display()
                ));
            }
        };

        serde_json::from_str::<Self>(&raw_json).map_err(|error| {
            format!(
                "Failed to parse settings '{}': {error}",
                settings_path.display()
            )
        })
    }

    pub fn save(&self, settings_path: &Path) -> Result<(), String> {
        let serialized = serde_json::to_string_pretty(self)
            .map_err(|error| format!("Failed to serialize settings: {error}"))?;
        crate::persistence::write_text_atomically(settings_path, &serialized)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// The game's save directory: `%APPDATA%\..\LocalLow\Rain\Teslagrad 2`.
pub fn default_save_directory() -> PathBuf {
    if let Ok(app_data) = std::env::var("APPDATA") {
        let app_data = PathBuf::from(app_data);
        let roaming_parent = app_data.parent().unwrap_or(&app_data);
        return game_directory(roaming_parent);
    }

    let home_dir = std::env::var("USERPROFILE")
        .or_else(|_| std::env::var("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));

    game_directory(&home_dir.join("AppData"))
}

fn game_directory(app_data_root: &Path) -> PathBuf {
    app_data_root
        .join("LocalLow")
        .join("Rain")
        .join("Teslagrad 2")
}
