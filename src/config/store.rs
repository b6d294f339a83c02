/// Settings persistence
/// Loads and saves the settings file; an unparsable file is moved aside and defaults are used

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};
use crate::settings::Settings;

pub const DEFAULT_SETTINGS_FILE: &str = "offer_watch.json";

/// File-backed settings store
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings from disk
    ///
    /// # Returns
    /// * `Ok(Settings)` - Stored settings with defaults filled in for missing or
    ///   mistyped fields and values repaired, or plain defaults if the file is
    ///   missing or is not a JSON object
    /// * `Err(MonitorError::SettingsIo)` - The file exists but could not be read
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| MonitorError::SettingsIo {
            path: self.path.clone(),
            source,
        })?;

        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(value) if value.is_object() => Ok(Settings::from_json_lenient(&value)),
            Ok(_) => {
                warn!(path = %self.path.display(), "settings file is not a JSON object, discarding");
                self.purge_corrupt();
                Ok(Settings::default())
            }
            Err(source) => {
                let err = MonitorError::SettingsParse {
                    path: self.path.clone(),
                    source,
                };
                warn!(error = %err, "discarding corrupt settings file");
                self.purge_corrupt();
                Ok(Settings::default())
            }
        }
    }

    /// Writes settings as pretty JSON, replacing the file atomically
    pub fn save(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings).map_err(|source| MonitorError::SettingsParse {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let tmp = self.sibling("tmp");
        fs::write(&tmp, json).map_err(|source| self.io_error(source))?;
        fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;

        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Removes the stored settings so the next load returns defaults
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "settings cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Moves a corrupt file to `<name>.corrupt`, deleting it if the rename fails
    fn purge_corrupt(&self) {
        let target = self.sibling("corrupt");
        if let Err(e) = fs::rename(&self.path, &target) {
            warn!(error = %e, "could not move corrupt settings aside, deleting");
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(error = %e, path = %self.path.display(), "could not delete corrupt settings");
            }
        } else {
            info!(path = %target.display(), "corrupt settings moved aside");
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.into());
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> MonitorError {
        MonitorError::SettingsIo {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_FILE)
    }
}
