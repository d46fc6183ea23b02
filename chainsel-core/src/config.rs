//! Persisted application configuration.
//!
//! Read once at startup, written back opportunistically after state
//! changes. A missing or malformed file yields the defaults; a failing
//! write is logged and otherwise ignored.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use chainsel_osc::{DEFAULT_RECEIVE_PORT, DEFAULT_SEND_PORT};
use chainsel_types::MidiPadConfig;

use crate::chain::SwitchMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub send_host: String,
    pub send_port: u16,
    pub receive_port: u16,
    /// Last selected rack, restored on reconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i32>,
    /// Last connected MIDI input port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_port: Option<String>,
    pub pads: MidiPadConfig,
    pub last_chain: i32,
    pub strategy: SwitchMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            send_host: "127.0.0.1".to_string(),
            send_port: DEFAULT_SEND_PORT,
            receive_port: DEFAULT_RECEIVE_PORT,
            track_id: None,
            device_id: None,
            midi_port: None,
            pads: MidiPadConfig::default(),
            last_chain: -1,
            strategy: SwitchMode::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = config_path() {
            self.save_to(&path);
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        target: "config",
                        "ignoring malformed config {}: {}",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Best-effort write; failures are logged, never fatal.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match toml::to_string_pretty(self) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    warn!(
                        target: "config",
                        "could not write config {}: {}",
                        path.display(),
                        e
                    );
                }
            }
            Err(e) => warn!(target: "config", "could not serialize config: {}", e),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chainsel").join("config.toml"))
}
