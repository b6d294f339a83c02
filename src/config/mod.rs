/// Settings configuration management
/// Handles loading, saving and hot-reloading the persisted settings

pub mod reloadable;
pub mod store;

#[cfg(test)]
mod tests {
    use super::reloadable::ReloadableSettings;
    use super::store::*;
    use crate::error::MonitorError;
    use crate::settings::{FilterSettings, Settings};
    use std::fs;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("settings.json"))
    }

    // =========================================================================
    // Test Suite: Loading
    // =========================================================================

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!store.path().exists(), "load must not create the file");
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{ "version": 1, "filter": { "cards_by_value": true }, "log_level": "debug" }"#,
        )
        .unwrap();

        let settings = store.load().unwrap();
        assert!(settings.filter.cards_by_value);
        assert_eq!(settings.filter.cards_min_value, 50);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.alert, Settings::default().alert);
    }

    #[test]
    fn test_load_repairs_out_of_range_values() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{ "reload_interval": 3, "max_pages": 0 }"#).unwrap();

        let settings = store.load().unwrap();
        assert_eq!(settings.reload_interval, 20);
        assert_eq!(settings.max_pages, 1);
    }

    #[test]
    fn test_load_corrupt_file_is_purged() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ this is not json").unwrap();

        let settings = store.load().unwrap();

        assert_eq!(settings, Settings::default());
        assert!(!store.path().exists(), "corrupt file should be moved aside");
        assert!(dir.path().join("settings.json.corrupt").exists());

        // Second load sees no file at all
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_load_keeps_valid_fields_beside_wrong_types() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"alert":{"bundle_threshold":250},"filter":{"cards_by_value":true},"max_pages":"many"}"#,
        )
        .unwrap();

        let settings = store.load().unwrap();

        assert_eq!(settings.alert.bundle_threshold, 250);
        assert!(settings.filter.cards_by_value);
        assert_eq!(settings.max_pages, Settings::default().max_pages);
        assert!(store.path().exists(), "a mistyped field must not purge the file");
        assert!(!dir.path().join("settings.json.corrupt").exists());
    }

    #[test]
    fn test_load_negative_threshold_falls_back_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"reload_interval":90,"alert":{"bundle_threshold":-5}}"#).unwrap();

        let settings = store.load().unwrap();

        assert_eq!(settings.reload_interval, 90);
        assert_eq!(settings.alert.bundle_threshold, Settings::default().alert.bundle_threshold);
        assert!(store.path().exists());
    }

    #[test]
    fn test_load_non_object_json_is_purged() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "[1, 2, 3]").unwrap();

        assert_eq!(store.load().unwrap(), Settings::default());
        assert!(!store.path().exists());
        assert!(dir.path().join("settings.json.corrupt").exists());
    }

    #[test]
    fn test_load_unreadable_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let store = SettingsStore::new(dir.path());

        let result = store.load();
        assert!(matches!(result, Err(MonitorError::SettingsIo { .. })));
    }

    // =========================================================================
    // Test Suite: Saving and clearing
    // =========================================================================

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));

        let mut settings = Settings::default();
        settings.filter = FilterSettings {
            cards_by_value: true,
            cards_min_value: 75,
            members_by_points: true,
            members_min_points: 900,
        };
        settings.alert.colorize_bundle_color = "#00FF00".to_string();

        store.save(&settings).unwrap();
        assert!(store.path().exists());
        assert!(!dir.path().join("nested").join("settings.json.tmp").exists());

        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_clear_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Settings::default()).unwrap();

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    // =========================================================================
    // Test Suite: Reload from store
    // =========================================================================

    #[tokio::test]
    async fn test_reload_picks_up_saved_changes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Settings::default()).unwrap();

        let reloadable = ReloadableSettings::with_store(store.load().unwrap(), store.clone());

        let mut edited = Settings::default();
        edited.filter.members_by_points = true;
        edited.log_level = "trace".to_string();
        store.save(&edited).unwrap();

        assert!(reloadable.reload().await.unwrap());
        assert!(reloadable.generation() >= 1);

        let current = reloadable.snapshot().await;
        assert!(current.filter.members_by_points);
        assert_eq!(current.log_level, "trace");
    }

    #[tokio::test]
    async fn test_reload_keeps_caller_overrides() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Settings::default()).unwrap();

        let pin_port = |mut settings: Settings| {
            settings.api_enabled = true;
            settings.api_port = 9999;
            settings
        };
        let reloadable =
            ReloadableSettings::with_store(pin_port(store.load().unwrap()), store.clone()).with_overrides(pin_port);

        let mut edited = Settings::default();
        edited.api_port = 7000;
        edited.max_pages = 4;
        store.save(&edited).unwrap();

        assert!(reloadable.reload().await.unwrap());
        let current = reloadable.snapshot().await;
        assert_eq!(current.max_pages, 4);
        assert_eq!(current.api_port, 9999);
        assert!(current.api_enabled);
    }
}
