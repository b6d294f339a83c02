/// Reloadable settings wrapper
/// Provides thread-safe access to Settings with hot-reload support

use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::info;

use super::store::SettingsStore;
use crate::error::Result;
use crate::settings::Settings;

/// Final adjustment applied after every reload, such as command-line flags
pub type SettingsOverride = Arc<dyn Fn(Settings) -> Settings + Send + Sync>;

/// Shared, reloadable settings
///
/// The monitor takes a snapshot at the start of every cycle, so a reload
/// takes effect on the next cycle without a restart. Components can
/// subscribe to changes via the watch channel.
#[derive(Clone)]
pub struct ReloadableSettings {
    settings: Arc<RwLock<Settings>>,
    /// Source for `reload`; None means in-memory only
    store: Option<SettingsStore>,
    overrides: Option<SettingsOverride>,
    /// The value is a generation counter that increments on each change
    change_tx: watch::Sender<u64>,
    change_rx: watch::Receiver<u64>,
}

impl ReloadableSettings {
    pub fn new(settings: Settings) -> Self {
        let (change_tx, change_rx) = watch::channel(0u64);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            store: None,
            overrides: None,
            change_tx,
            change_rx,
        }
    }

    /// Creates a wrapper that re-reads `store` on reload
    pub fn with_store(settings: Settings, store: SettingsStore) -> Self {
        let mut reloadable = Self::new(settings);
        reloadable.store = Some(store);
        reloadable
    }

    /// Re-applies `overrides` on top of every reloaded file so they survive a reload
    pub fn with_overrides<F>(mut self, overrides: F) -> Self
    where
        F: Fn(Settings) -> Settings + Send + Sync + 'static,
    {
        self.overrides = Some(Arc::new(overrides));
        self
    }

    /// Gets a read lock on the current settings
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, Settings> {
        self.settings.read().await
    }

    /// Clones the current settings
    pub async fn snapshot(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Replaces the settings, returning true if they changed
    pub async fn replace(&self, new_settings: Settings) -> bool {
        let mut write_guard = self.settings.write().await;
        if *write_guard == new_settings {
            return false;
        }
        *write_guard = new_settings;
        drop(write_guard);

        self.change_tx.send_modify(|generation| *generation += 1);
        true
    }

    /// Reloads the settings from the store, with environment and then
    /// caller overrides applied.
    /// Returns Ok(true) if the settings changed, Ok(false) if unchanged or there is no store.
    pub async fn reload(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let mut loaded = store.load()?.apply_env_overrides();
        if let Some(overrides) = &self.overrides {
            loaded = overrides(loaded);
        }
        let changed = self.replace(loaded).await;
        if changed {
            info!(generation = self.generation(), "settings reloaded");
        }
        Ok(changed)
    }

    /// Returns a receiver that notifies when settings change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.change_rx.clone()
    }

    /// Gets the current generation counter
    pub fn generation(&self) -> u64 {
        *self.change_rx.borrow()
    }
}
