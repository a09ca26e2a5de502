// Console settings
// Loaded from ~/.config/fleetdesk/settings.json

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Backend
    #[serde(rename = "api.baseUrl")]
    pub api_base: String,

    #[serde(rename = "api.agentPrefix")]
    pub agent_prefix: String,

    #[serde(rename = "api.timeoutSecs")]
    pub timeout_secs: u64,

    // Console
    #[serde(rename = "console.pollDelayMs")]
    pub poll_delay_ms: u64,

    #[serde(rename = "console.refreshIntervalSecs")]
    pub refresh_interval_secs: u64,

    #[serde(rename = "console.onlineThresholdMinutes")]
    pub online_threshold_minutes: i64,

    // Logging
    #[serde(rename = "log.file")]
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            agent_prefix: "/implants".to_string(),
            timeout_secs: 30,
            poll_delay_ms: 2000,
            refresh_interval_secs: 120,
            online_threshold_minutes: 5,
            log_file: None,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from an explicit path. Missing or broken files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Error parsing {}: {}", path.display(), e);
                    eprintln!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                if path.exists() {
                    eprintln!("Error reading {}: {}", path.display(), e);
                }
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Delay between a successful command submission and the result poll.
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Agent list auto-refresh interval. Zero disables auto-refresh.
    pub fn refresh_interval(&self) -> Option<Duration> {
        if self.refresh_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.refresh_interval_secs))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Log file location: `log.file` if set, else `fleetdesk.log` next to the settings.
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| crate::config_dir().join("fleetdesk.log"))
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Backend used when no saved login exists
    "api.baseUrl": "http://127.0.0.1:8000",
    "api.agentPrefix": "/implants",
    "api.timeoutSecs": 30,

    // Console
    // Delay before fetching a command result (milliseconds)
    "console.pollDelayMs": 2000,
    // Agent list refresh (seconds, 0 = off)
    "console.refreshIntervalSecs": 120,
    // Agents unseen for this long are offline
    "console.onlineThresholdMinutes": 5,

    // Log file (null = fleetdesk.log in this directory)
    "log.file": null
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            eprintln!("Error writing default settings.json: {}", e);
        }
    }

}
