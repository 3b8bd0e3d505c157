// SPDX-License-Identifier: AGPL-3.0
// Shard Transfer Core - Settings persistence
//
// Settings are stored in a local JSON file.

use crate::detection::DEFAULT_MONITOR_INTERVAL_SECS;
use crate::types::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSettings {
    /// Seconds between background peer scans
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Start the peer monitor during initialization
    #[serde(default = "default_auto_start_monitor")]
    pub auto_start_monitor: bool,
    /// Upper bound for startup reconciliation in milliseconds
    #[serde(default = "default_reconcile_timeout_ms")]
    pub reconcile_timeout_ms: u64,
    /// Library root scanned for transferable files
    #[serde(default = "default_scan_root")]
    pub scan_root: PathBuf,
    /// Default tracing level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Append-only file for warnings and errors; none when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_monitor_interval_secs() -> u64 {
    DEFAULT_MONITOR_INTERVAL_SECS
}

fn default_auto_start_monitor() -> bool {
    true
}

fn default_reconcile_timeout_ms() -> u64 {
    5000
}

fn default_scan_root() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|d| d.document_dir().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Shard")
        .join("games")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval_secs(),
            auto_start_monitor: default_auto_start_monitor(),
            reconcile_timeout_ms: default_reconcile_timeout_ms(),
            scan_root: default_scan_root(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl CoordinatorSettings {
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_millis(self.reconcile_timeout_ms)
    }
}

/// In-memory cache of settings, persisted to disk on changes
pub struct SettingsStore {
    settings: RwLock<CoordinatorSettings>,
    file_path: PathBuf,
}

impl SettingsStore {
    /// Open the store at the platform config location
    pub fn new() -> Result<Self, AppError> {
        let file_path = Self::get_settings_path()?;
        Self::open(file_path)
    }

    /// Open the store at an explicit location, creating the file if missing
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let file_path = file_path.into();
        tracing::info!("Settings file path: {:?}", file_path);

        let settings = if file_path.exists() {
            let content = fs::read_to_string(&file_path)
                .map_err(|e| AppError::FileIo(format!("Failed to read settings: {}", e)))?;

            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings, using defaults: {}", e);
                CoordinatorSettings::default()
            })
        } else {
            tracing::info!("No settings file found, using defaults");
            CoordinatorSettings::default()
        };

        let store = Self {
            settings: RwLock::new(settings),
            file_path,
        };

        if !store.file_path.exists() {
            store.persist()?;
        }

        Ok(store)
    }

    fn get_settings_path() -> Result<PathBuf, AppError> {
        let config_dir = directories::ProjectDirs::from("com", "shard", "launcher")
            .ok_or_else(|| AppError::FileIo("Could not determine config directory".to_string()))?
            .config_dir()
            .to_path_buf();

        fs::create_dir_all(&config_dir)
            .map_err(|e| AppError::FileIo(format!("Failed to create config dir: {}", e)))?;

        Ok(config_dir.join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn persist(&self) -> Result<(), AppError> {
        let content = {
            let settings = self
                .settings
                .read()
                .map_err(|_| AppError::FileIo("Settings lock poisoned".to_string()))?;
            serde_json::to_string_pretty(&*settings).map_err(|e| {
                AppError::Serialization(format!("Failed to serialize settings: {}", e))
            })?
        };

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, content)
            .map_err(|e| AppError::FileIo(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> CoordinatorSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Update settings and persist to disk
    pub fn update(&self, new_settings: CoordinatorSettings) -> Result<(), AppError> {
        {
            let mut settings = self
                .settings
                .write()
                .map_err(|_| AppError::FileIo("Settings lock poisoned".to_string()))?;
            *settings = new_settings;
        }

        let result = self.persist();
        if let Err(e) = &result {
            tracing::error!("Failed to persist settings: {}", e);
        }
        result
    }
}
