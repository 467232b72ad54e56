// src/config.rs
use crate::error::TenzoResult;
use crate::types::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 38_400;
pub const DEFAULT_SCALE: f64 = 10.0;
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;
pub const DEFAULT_TICK_MS: u64 = 100;

/// Persistent application settings, stored as JSON next to the working directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub serial_timeout_ms: u64,
    /// Multiplier applied to every raw reading before it is queued.
    pub scale: f64,
    pub queue_capacity: usize,
    pub tick_ms: u64,
    /// `None` runs until the user presses stop.
    pub test_duration_secs: Option<u64>,
    pub reset_command: String,
    pub ready_line: String,
    pub sample_line: String,
    pub ready_timeout_ms: u64,
    pub export_dir: PathBuf,
    pub language: Language,
    pub dark_theme: bool,
    pub sim_line_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name().to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            serial_timeout_ms: 100,
            scale: DEFAULT_SCALE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tick_ms: DEFAULT_TICK_MS,
            test_duration_secs: Some(60),
            reset_command: "r\n".to_owned(),
            ready_line: "Readings:".to_owned(),
            sample_line: "first:".to_owned(),
            ready_timeout_ms: 5_000,
            export_dir: PathBuf::from("exports"),
            language: Language::English,
            dark_theme: false,
            sim_line_ms: 25,
        }
    }
}

fn default_port_name() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else {
        "/dev/ttyACM0"
    }
}

/// Everything the line parser and the session need, detached from the UI settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolSettings {
    pub ready_line: String,
    pub sample_line: String,
    pub scale: f64,
    pub reset_command: Vec<u8>,
    pub ready_timeout: Duration,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        AppConfig::default().protocol()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn store_path() -> PathBuf {
        PathBuf::from("data/tribometer.json")
    }

    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> TenzoResult<Self> {
        if !path.exists() {
            log::info!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let cfg: AppConfig = serde_json::from_str(&raw)?;
        Ok(cfg.sanitized())
    }

    /// Loads from the default location, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = Self::store_path();
        match Self::load_from(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("failed to load {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Writes through a temporary file so a crash never leaves half a JSON document.
    pub fn save_to(&self, path: &Path) -> TenzoResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json.as_bytes())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn save(&self) {
        let path = Self::store_path();
        if let Err(e) = self.save_to(&path) {
            log::warn!("failed to save {}: {e}", path.display());
        }
    }

    /// Clamps values a hand-edited file may have pushed out of range.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.baud_rate == 0 {
            self.baud_rate = defaults.baud_rate;
        }
        self.serial_timeout_ms = self.serial_timeout_ms.clamp(10, 2_000);
        if !self.scale.is_finite() || self.scale == 0.0 {
            self.scale = defaults.scale;
        }
        self.queue_capacity = self.queue_capacity.clamp(1, 1024);
        self.tick_ms = self.tick_ms.clamp(20, 1_000);
        self.test_duration_secs = self.test_duration_secs.filter(|s| *s > 0);
        if self.ready_line.trim().is_empty() {
            self.ready_line = defaults.ready_line;
        }
        if self.sample_line.trim().is_empty() {
            self.sample_line = defaults.sample_line;
        }
        self.sim_line_ms = self.sim_line_ms.clamp(1, 1_000);
        self
    }

    pub fn protocol(&self) -> ProtocolSettings {
        ProtocolSettings {
            ready_line: self.ready_line.trim().to_owned(),
            sample_line: self.sample_line.trim().to_owned(),
            scale: self.scale,
            reset_command: self.reset_command.as_bytes().to_vec(),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }

    pub fn port(&self) -> PortSettings {
        PortSettings {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.serial_timeout_ms),
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn test_duration(&self) -> Option<Duration> {
        self.test_duration_secs.map(Duration::from_secs)
    }
}
