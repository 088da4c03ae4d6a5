use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Frame rate the render scheduler and engine pacing are configured with.
pub const TARGET_FPS: u32 = 30;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub presets: PresetConfig,
}

impl AppConfig {
    /// Loads the configuration from a JSON file. A missing file yields the
    /// defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(?path, "config file missing, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        tracing::debug!(?path, "loaded config");
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::debug!(?path, "saved config");
        Ok(())
    }
}

/// Surface and pacing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_fps: TARGET_FPS,
            width: 640,
            height: 360,
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            channels: 2,
        }
    }
}

/// Persisted preset directory. Empty means "no presets".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    #[serde(default)]
    pub directory: String,
}

/// Identifies a change subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Configuration service injected into visualiser elements. It owns the one
/// persisted value the elements care about: the preset directory.
pub trait ConfigService: Send + Sync {
    fn preset_directory(&self) -> String;
    fn set_preset_directory(&self, directory: &str) -> Result<()>;
    /// Registers a callback invoked with the new directory after each change.
    /// Notifications arrive in the order the changes were stored.
    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-memory [`ConfigService`] with an optional JSON backing file that is
/// rewritten on every change.
///
/// Changes are serialised together with their notifications, so subscribers
/// must not set the directory from inside a callback.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<SharedState>>,
    notify: Arc<Mutex<()>>,
}

struct SharedState {
    config: AppConfig,
    path: Option<PathBuf>,
    subscribers: Vec<(SubscriptionId, Arc<dyn Fn(&str) + Send + Sync>)>,
    next_id: u64,
}

impl SharedConfig {
    pub fn new(config: AppConfig) -> Self {
        Self::build(config, None)
    }

    /// Loads `path` (or defaults when it does not exist) and persists every
    /// subsequent change back to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AppConfig::load(&path)?;
        Ok(Self::build(config, Some(path)))
    }

    fn build(config: AppConfig, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState {
                config,
                path,
                subscribers: Vec::new(),
                next_id: 0,
            })),
            notify: Arc::new(Mutex::new(())),
        }
    }

    /// Snapshot of the whole configuration.
    pub fn snapshot(&self) -> AppConfig {
        self.lock().config.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SharedConfig")
            .field("config", &state.config)
            .field("path", &state.path)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl ConfigService for SharedConfig {
    fn preset_directory(&self) -> String {
        self.lock().config.presets.directory.clone()
    }

    fn set_preset_directory(&self, directory: &str) -> Result<()> {
        let _notifying = self
            .notify
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Callbacks run without the state lock so they may read the config back.
        let subscribers = {
            let mut state = self.lock();
            let mut updated = state.config.clone();
            updated.presets.directory = directory.to_string();
            if let Some(path) = &state.path {
                updated.save(path).map_err(|err| {
                    VisualiserError::msg(format!(
                        "failed to persist preset directory to {}: {err}",
                        path.display()
                    ))
                })?;
            }
            state.config = updated;
            state
                .subscribers
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect::<Vec<_>>()
        };

        tracing::info!(directory, "preset directory changed");
        for callback in subscribers {
            callback(directory);
        }
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscribers.push((id, Arc::from(callback)));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.retain(|(existing, _)| *existing != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn defaults_target_thirty_fps_stereo() {
        let config = AppConfig::default();
        assert_eq!(config.render.target_fps, 30);
        assert_eq!(config.audio.channels, 2);
        assert!(config.presets.directory.is_empty());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, VisualiserError::Json(_)));
    }

    #[test]
    fn set_persists_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = SharedConfig::open(&path).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        config.subscribe(Box::new(move |directory: &str| {
            assert_eq!(directory, "/presets");
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        config.set_preset_directory("/presets").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.preset_directory(), "/presets");
        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.presets.directory, "/presets");
    }

    #[test]
    fn concurrent_changes_notify_in_storage_order() {
        let config = SharedConfig::new(AppConfig::default());
        let last_seen = Arc::new(Mutex::new(String::new()));
        let seen = last_seen.clone();
        config.subscribe(Box::new(move |directory: &str| {
            std::thread::sleep(std::time::Duration::from_micros(50));
            *seen.lock().unwrap() = directory.to_string();
        }));

        let writers: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|directory| {
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        config.set_preset_directory(directory).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(*last_seen.lock().unwrap(), config.preset_directory());
    }

    #[test]
    fn unsubscribed_callbacks_are_not_called() {
        let config = SharedConfig::new(AppConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = config.subscribe(Box::new(move |_: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        config.unsubscribe(id);
        config.set_preset_directory("elsewhere").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
