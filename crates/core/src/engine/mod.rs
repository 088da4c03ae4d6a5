//! Visualization engine boundary. The engine itself is a black box behind
//! [`VisualizationEngine`]; [`EngineHandle`] owns one instance and is the
//! single lock that serialises rendering, playlist rebuilds, resizes and PCM
//! ingestion against each other.

use std::{
    fmt,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{surface::RenderSurfaceContext, InitError};

mod spectrum;

pub use spectrum::{SpectrumEngine, SpectrumEngineFactory};

/// Selection weights attached to a preset. Loader-populated entries use the
/// default of `(3, 3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub hard_cut: u8,
    pub soft_cut: u8,
}

impl Default for Rating {
    fn default() -> Self {
        Self {
            hard_cut: 3,
            soft_cut: 3,
        }
    }
}

/// One preset in the engine playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub path: PathBuf,
    pub display_name: String,
    pub rating: Rating,
}

impl PlaylistEntry {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            rating: Rating::default(),
        }
    }
}

/// Introspection data about the most recently rendered frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame: u64,
    pub preset_index: Option<usize>,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Contract of the external rendering engine. Implementations are only
/// called while their GPU context is alive; dropping the box destroys the
/// engine.
pub trait VisualizationEngine: Send {
    fn set_window_size(&mut self, width: u32, height: u32);
    fn set_target_fps(&mut self, fps: u32);
    /// Ingests `frames` interleaved stereo frames from `samples`.
    fn push_pcm(&mut self, samples: &[f32], frames: usize);
    fn render_frame(&mut self);
    fn clear_playlist(&mut self);
    fn add_preset(&mut self, entry: PlaylistEntry);
    fn playlist_size(&self) -> usize;

    fn frame_stats(&self) -> FrameStats {
        FrameStats::default()
    }
}

/// Produces engines for a live surface.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        surface: &RenderSurfaceContext,
    ) -> Result<Box<dyn VisualizationEngine>, InitError>;
}

/// Exclusive owner of one engine instance. Every operation is a silent no-op
/// once the engine has been destroyed.
pub struct EngineHandle {
    engine: Mutex<Option<Box<dyn VisualizationEngine>>>,
}

impl EngineHandle {
    /// Creates an engine for `surface` and configures its pacing.
    pub fn create(
        factory: &dyn EngineFactory,
        surface: &RenderSurfaceContext,
        target_fps: u32,
    ) -> Result<Self, InitError> {
        if surface.is_released() {
            return Err(InitError::EngineInitFailed(
                "GPU context is not alive".to_string(),
            ));
        }
        let mut engine = factory.create(surface)?;
        engine.set_target_fps(target_fps);
        Ok(Self::from_engine(engine))
    }

    pub fn from_engine(engine: Box<dyn VisualizationEngine>) -> Self {
        Self {
            engine: Mutex::new(Some(engine)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    pub fn set_window_size(&self, width: u32, height: u32) {
        if let Some(engine) = self.lock().as_mut() {
            engine.set_window_size(width, height);
        }
    }

    pub fn set_target_fps(&self, fps: u32) {
        if let Some(engine) = self.lock().as_mut() {
            engine.set_target_fps(fps);
        }
    }

    pub fn push_pcm(&self, samples: &[f32], frames: usize) {
        if let Some(engine) = self.lock().as_mut() {
            engine.push_pcm(samples, frames);
        }
    }

    /// Renders one frame. Returns `false` when there is no engine.
    pub fn render_frame(&self) -> bool {
        match self.lock().as_mut() {
            Some(engine) => {
                engine.render_frame();
                true
            }
            None => false,
        }
    }

    /// Clears the playlist and adds `entries` while holding the lock for the
    /// whole rebuild, so a render observes either the old or the new set.
    pub fn replace_playlist(&self, entries: Vec<PlaylistEntry>) -> usize {
        let mut guard = self.lock();
        let Some(engine) = guard.as_mut() else {
            return 0;
        };
        engine.clear_playlist();
        for entry in entries {
            engine.add_preset(entry);
        }
        engine.playlist_size()
    }

    pub fn clear_playlist(&self) {
        if let Some(engine) = self.lock().as_mut() {
            engine.clear_playlist();
        }
    }

    pub fn playlist_size(&self) -> usize {
        self.lock()
            .as_ref()
            .map(|engine| engine.playlist_size())
            .unwrap_or(0)
    }

    pub fn frame_stats(&self) -> Option<FrameStats> {
        self.lock().as_ref().map(|engine| engine.frame_stats())
    }

    /// Releases the engine. Returns `true` only for the call that actually
    /// destroyed it.
    pub fn destroy(&self) -> bool {
        let engine = self.lock().take();
        match engine {
            Some(engine) => {
                drop(engine);
                tracing::debug!("visualization engine destroyed");
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn VisualizationEngine>>> {
        // A panic inside the engine must not take the audio thread down too.
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("live", &self.is_live())
            .finish()
    }
}
