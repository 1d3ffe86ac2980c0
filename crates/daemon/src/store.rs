//! Durable source-configuration store.
//!
//! Owns the ordered list of sources behind an internal lock; web handlers
//! mutate it and scheduled jobs read it, so all access serializes here.
//! State persists as one JSON file. Loading tolerates an absent or corrupt
//! file by degrading to an empty store with a diagnostic - the operator
//! re-adds sources, the process never aborts.

use crate::source::{ConfigInvalid, SourceConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Config rejected by validation
    #[error(transparent)]
    Invalid(#[from] ConfigInvalid),

    /// A source with this name already exists
    #[error("A source named {0:?} already exists")]
    DuplicateName(String),

    /// A source with this URL already exists
    #[error("A source with url {0:?} already exists")]
    DuplicateUrl(String),

    /// The target image folder already exists on disk
    #[error("Image folder {0} already exists")]
    FolderExists(PathBuf),

    /// No source with this name
    #[error("No source named {0:?}")]
    NotFound(String),

    /// Filesystem failure persisting state
    #[error("IO error persisting state: {0}")]
    Io(#[from] std::io::Error),

    /// State serialization failure
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Ordered collection of source configurations with durable round-trip.
pub struct ConfigStore {
    state_file: PathBuf,
    image_root: PathBuf,
    configs: Mutex<Vec<SourceConfig>>,
}

impl ConfigStore {
    pub fn new(state_file: PathBuf, image_root: PathBuf) -> Self {
        Self {
            state_file,
            image_root,
            configs: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SourceConfig>> {
        self.configs.lock().expect("config store lock poisoned")
    }

    /// Image folder for a source name.
    pub fn folder_for(&self, name: &str) -> PathBuf {
        self.image_root.join(name)
    }

    /// Ordered snapshot of all configs.
    pub fn list(&self) -> Vec<SourceConfig> {
        self.lock().clone()
    }

    /// Looks up one config by name.
    pub fn get(&self, name: &str) -> Option<SourceConfig> {
        self.lock().iter().find(|c| c.name == name).cloned()
    }

    /// Adds a new source.
    ///
    /// Rejects name/url collisions and an already-existing image folder (an
    /// orphaned folder must not be silently merged into a new source).
    pub fn add(&self, config: SourceConfig) -> Result<(), StoreError> {
        config.validate()?;

        let mut configs = self.lock();
        if configs.iter().any(|c| c.name == config.name) {
            return Err(StoreError::DuplicateName(config.name));
        }
        if configs.iter().any(|c| c.url == config.url) {
            return Err(StoreError::DuplicateUrl(config.url));
        }
        let folder = self.image_root.join(&config.name);
        if folder.exists() {
            return Err(StoreError::FolderExists(folder));
        }

        configs.push(config);
        Ok(())
    }

    /// Replaces the config for `name` in place. The name itself is immutable.
    pub fn update(&self, name: &str, config: SourceConfig) -> Result<(), StoreError> {
        if config.name != name {
            return Err(ConfigInvalid::NameMismatch {
                expected: name.to_string(),
                got: config.name,
            }
            .into());
        }
        config.validate()?;

        let mut configs = self.lock();
        if configs
            .iter()
            .any(|c| c.name != name && c.url == config.url)
        {
            return Err(StoreError::DuplicateUrl(config.url));
        }
        match configs.iter_mut().find(|c| c.name == name) {
            Some(slot) => {
                *slot = config;
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    /// Removes the config for `name`, returning it.
    pub fn remove(&self, name: &str) -> Result<SourceConfig, StoreError> {
        let mut configs = self.lock();
        match configs.iter().position(|c| c.name == name) {
            Some(idx) => Ok(configs.remove(idx)),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    /// Persists all configs to the state file.
    ///
    /// Creates each source's image folder first, so folder existence is
    /// guaranteed once a config is durably saved.
    pub fn save(&self) -> Result<(), StoreError> {
        let configs = self.lock().clone();

        for config in &configs {
            fs::create_dir_all(self.image_root.join(&config.name))?;
        }

        if let Some(parent) = self.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&configs)?;
        fs::write(&self.state_file, json)?;
        Ok(())
    }

    /// Loads configs from the state file.
    ///
    /// Missing or unparseable state resets the store to empty and logs; it
    /// never fails startup.
    pub fn load(&self) {
        let loaded = match load_state(&self.state_file) {
            Ok(configs) => configs,
            Err(e) => {
                log::error!(
                    "Failed to read source state from {}; starting with an empty source list: {}",
                    self.state_file.display(),
                    e
                );
                Vec::new()
            }
        };
        *self.lock() = loaded;
    }
}

fn load_state(path: &Path) -> Result<Vec<SourceConfig>, StoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(
            dir.path().join("state.json"),
            dir.path().join("images"),
        )
    }

    fn cam(name: &str, url: &str) -> SourceConfig {
        SourceConfig::new(name, url, 5)
    }

    #[test]
    fn test_add_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.add(cam("cam1", "rtsp://x")).unwrap();
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("cam1").unwrap().url, "rtsp://x");
        assert!(store.get("cam2").is_none());
    }

    #[test]
    fn test_add_rejects_duplicate_name_and_url() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();

        let err = store.add(cam("cam1", "rtsp://y")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));

        let err = store.add(cam("cam2", "rtsp://x")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUrl(_)));

        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_add_rejects_existing_folder() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(dir.path().join("images/cam1")).unwrap();

        let err = store.add(cam("cam1", "rtsp://x")).unwrap_err();
        assert!(matches!(err, StoreError::FolderExists(_)));
    }

    #[test]
    fn test_add_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.add(cam("cam1", "rtsp://x").tap_zero_interval()).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    trait Tap {
        fn tap_zero_interval(self) -> Self;
    }
    impl Tap for SourceConfig {
        fn tap_zero_interval(mut self) -> Self {
            self.interval_minutes = 0;
            self
        }
    }

    #[test]
    fn test_update_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();
        store.add(cam("cam2", "rtsp://y")).unwrap();

        let mut updated = cam("cam1", "rtsp://z");
        updated.interval_minutes = 10;
        store.update("cam1", updated).unwrap();

        let got = store.get("cam1").unwrap();
        assert_eq!(got.url, "rtsp://z");
        assert_eq!(got.interval_minutes, 10);
        // Order preserved
        assert_eq!(store.list()[0].name, "cam1");
    }

    #[test]
    fn test_update_rejects_rename_and_unknown() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();

        let err = store.update("cam1", cam("cam9", "rtsp://x")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Invalid(ConfigInvalid::NameMismatch { .. })
        ));

        let err = store.update("ghost", cam("ghost", "rtsp://g")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_update_rejects_url_collision_with_other_source() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();
        store.add(cam("cam2", "rtsp://y")).unwrap();

        let err = store.update("cam2", cam("cam2", "rtsp://x")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUrl(_)));

        // Keeping its own url is fine
        store.update("cam2", cam("cam2", "rtsp://y")).unwrap();
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();

        let removed = store.remove("cam1").unwrap();
        assert_eq!(removed.name, "cam1");
        assert!(store.list().is_empty());

        assert!(matches!(
            store.remove("cam1").unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_save_load_round_trip_with_times() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut cfg = cam("cam1", "rtsp://x");
        cfg.use_save_time_interval = true;
        cfg.save_time_start = Some(NaiveTime::from_hms_opt(6, 15, 30).unwrap());
        cfg.save_time_end = Some(NaiveTime::from_hms_opt(22, 0, 1).unwrap());
        store.add(cfg).unwrap();
        store.add(cam("cam2", "rtsp://y")).unwrap();

        let before = store.list();
        store.save().unwrap();

        let reloaded = ConfigStore::new(
            dir.path().join("state.json"),
            dir.path().join("images"),
        );
        reloaded.load();

        assert_eq!(reloaded.list(), before);
        assert_eq!(
            reloaded.get("cam1").unwrap().save_time_start,
            Some(NaiveTime::from_hms_opt(6, 15, 30).unwrap())
        );
    }

    #[test]
    fn test_save_creates_source_folders() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();
        store.save().unwrap();

        assert!(dir.path().join("images/cam1").is_dir());
    }

    #[test]
    fn test_load_missing_file_yields_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.load();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_yields_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("state.json"), "{not json").unwrap();

        let store = store(&dir);
        store.load();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_load_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.add(cam("cam1", "rtsp://x")).unwrap();

        // No state file on disk: load degrades to empty, dropping the
        // in-memory entry rather than merging.
        store.load();
        assert!(store.list().is_empty());
    }
}
