//! Typed errors for the library side of the monitor.
//!
//! The binary and the file-backed feed wrap these in `anyhow` with context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to access settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} could not be parsed: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("feed fetch failed: {0}")]
    Feed(String),

    #[error("monitor channel closed")]
    ChannelClosed,
}

impl MonitorError {
    /// Wraps any displayable feed failure
    pub fn feed(err: impl std::fmt::Display) -> Self {
        MonitorError::Feed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
