//! Playback settings persistence
//!
//! Volume, mute and playback mode survive across sessions. Values are stored
//! as primitive strings under fixed keys; the store itself is supplied by the
//! host (local storage, a preferences file, ...).
//!
//! # Example
//!
//! ```rust
//! use linktune_playback::settings::{MemorySettingsStore, PlayerSettings};
//!
//! let store = MemorySettingsStore::new();
//! let settings = PlayerSettings::load(&store);
//! assert_eq!(settings.volume, 0.8);
//!
//! PlayerSettings::save_volume(&store, 0.5);
//! assert_eq!(PlayerSettings::load(&store).volume, 0.5);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::SettingsError;
use crate::types::PlaybackMode;

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Output volume setting (float 0-1)
pub const SETTING_VOLUME: &str = "player.volume";

/// Mute flag setting ("true" / "false")
pub const SETTING_MUTED: &str = "player.muted";

/// Playback mode setting ("loop", "one", "shuffle")
pub const SETTING_MODE: &str = "player.mode";

/// Default output volume
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Key-value persistence for player settings
pub trait SettingsStore: Send + Sync {
    /// Read a value, `Ok(None)` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process settings store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings store backed by a flat JSON object on disk
///
/// The file is created on first write and rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettingsStore {
    /// Open a store, reading existing values if the file exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| SettingsError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&*values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Player settings restored at engine construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Output volume (0.0-1.0)
    pub volume: f32,

    /// Mute flag
    pub muted: bool,

    /// Playback mode
    pub mode: PlaybackMode,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            muted: false,
            mode: PlaybackMode::Loop,
        }
    }
}

impl PlayerSettings {
    /// Load settings, falling back to defaults for missing or malformed values
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();

        let volume = read(store, SETTING_VOLUME)
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(defaults.volume);

        let muted = read(store, SETTING_MUTED).is_some_and(|v| v == "true");

        let mode = read(store, SETTING_MODE)
            .and_then(|v| v.parse::<PlaybackMode>().ok())
            .unwrap_or(defaults.mode);

        Self {
            volume,
            muted,
            mode,
        }
    }

    pub fn save_volume(store: &dyn SettingsStore, volume: f32) {
        write(store, SETTING_VOLUME, &volume.to_string());
    }

    pub fn save_muted(store: &dyn SettingsStore, muted: bool) {
        write(store, SETTING_MUTED, if muted { "true" } else { "false" });
    }

    pub fn save_mode(store: &dyn SettingsStore, mode: PlaybackMode) {
        write(store, SETTING_MODE, mode.as_str());
    }
}

fn read(store: &dyn SettingsStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to read setting, using default");
            None
        }
    }
}

fn write(store: &dyn SettingsStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        warn!(key, error = %e, "Failed to persist setting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SettingsError::Poisoned)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(SettingsError::Poisoned)
        }
    }

    #[test]
    fn defaults_when_empty() {
        let store = MemorySettingsStore::new();
        assert_eq!(PlayerSettings::load(&store), PlayerSettings::default());
    }

    #[test]
    fn malformed_values_fall_back() {
        let store = MemorySettingsStore::new();
        store.set(SETTING_VOLUME, "loud").unwrap();
        store.set(SETTING_MUTED, "yes").unwrap();
        store.set(SETTING_MODE, "random").unwrap();

        let settings = PlayerSettings::load(&store);
        assert_eq!(settings.volume, DEFAULT_VOLUME);
        assert!(!settings.muted);
        assert_eq!(settings.mode, PlaybackMode::Loop);
    }

    #[test]
    fn volume_is_clamped_and_rejects_nan() {
        let store = MemorySettingsStore::new();
        store.set(SETTING_VOLUME, "3.5").unwrap();
        assert_eq!(PlayerSettings::load(&store).volume, 1.0);

        store.set(SETTING_VOLUME, "NaN").unwrap();
        assert_eq!(PlayerSettings::load(&store).volume, DEFAULT_VOLUME);
    }

    #[test]
    fn saved_values_round_trip() {
        let store = MemorySettingsStore::new();
        PlayerSettings::save_volume(&store, 0.25);
        PlayerSettings::save_muted(&store, true);
        PlayerSettings::save_mode(&store, PlaybackMode::Shuffle);

        let loaded = PlayerSettings::load(&store);
        assert_eq!(loaded.volume, 0.25);
        assert!(loaded.muted);
        assert_eq!(loaded.mode, PlaybackMode::Shuffle);
    }

    #[test]
    fn failing_store_never_panics() {
        let settings = PlayerSettings::load(&BrokenStore);
        assert_eq!(settings, PlayerSettings::default());
        PlayerSettings::save_volume(&BrokenStore, 0.1);
    }

    #[test]
    fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("player.json");

        {
            let store = JsonFileSettingsStore::open(&path).unwrap();
            store.set(SETTING_MODE, "one").unwrap();
            store.set(SETTING_VOLUME, "0.4").unwrap();
        }

        let store = JsonFileSettingsStore::open(&path).unwrap();
        let settings = PlayerSettings::load(&store);
        assert_eq!(settings.mode, PlaybackMode::RepeatOne);
        assert_eq!(settings.volume, 0.4);
    }

    #[test]
    fn json_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileSettingsStore::open(&path),
            Err(SettingsError::Serialization(_))
        ));
    }
}
