//! Test doubles shared by the unit tests of several modules.

use std::{
    sync::{Arc, Mutex},
    thread,
};

use crate::{
    engine::{EngineFactory, PlaylistEntry, VisualizationEngine},
    status::StatusSink,
    surface::{
        ContextId, HeadlessWindowSystem, PixelFormat, PixelFormatId, PlatformError,
        RenderSurfaceContext, WindowHandle, WindowSystem,
    },
    InitError,
};

/// Ordered, shared journal of calls made across components.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Engine that journals every call. Renders record the playlist size they
/// observed.
pub struct RecordingEngine {
    log: EventLog,
    playlist: Vec<PlaylistEntry>,
    pcm_frames: Arc<Mutex<Vec<[f32; 2]>>>,
}

impl RecordingEngine {
    pub fn new(log: EventLog) -> Self {
        Self::with_pcm(log, Arc::default())
    }

    pub fn with_pcm(log: EventLog, pcm_frames: Arc<Mutex<Vec<[f32; 2]>>>) -> Self {
        Self {
            log,
            playlist: Vec::new(),
            pcm_frames,
        }
    }
}

impl VisualizationEngine for RecordingEngine {
    fn set_window_size(&mut self, width: u32, height: u32) {
        self.log.push(format!("engine.resize {width}x{height}"));
    }

    fn set_target_fps(&mut self, fps: u32) {
        self.log.push(format!("engine.fps {fps}"));
    }

    fn push_pcm(&mut self, samples: &[f32], frames: usize) {
        self.log.push(format!("engine.pcm {frames}"));
        let mut stored = self.pcm_frames.lock().unwrap();
        for pair in samples.chunks_exact(2).take(frames) {
            stored.push([pair[0], pair[1]]);
        }
    }

    fn render_frame(&mut self) {
        self.log.push(format!("engine.render {}", self.playlist.len()));
    }

    fn clear_playlist(&mut self) {
        self.playlist.clear();
    }

    fn add_preset(&mut self, entry: PlaylistEntry) {
        self.playlist.push(entry);
    }

    fn playlist_size(&self) -> usize {
        self.playlist.len()
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.log.push("engine.destroy");
    }
}

/// Factory for [`RecordingEngine`]s, optionally failing.
#[derive(Clone, Default)]
pub struct RecordingEngineFactory {
    pub log: EventLog,
    pub pcm_frames: Arc<Mutex<Vec<[f32; 2]>>>,
    pub fail: bool,
}

impl EngineFactory for RecordingEngineFactory {
    fn create(
        &self,
        _surface: &RenderSurfaceContext,
    ) -> Result<Box<dyn VisualizationEngine>, InitError> {
        if self.fail {
            return Err(InitError::EngineInitFailed("refused by test".to_string()));
        }
        self.log.push("engine.create");
        Ok(Box::new(RecordingEngine::with_pcm(
            self.log.clone(),
            self.pcm_frames.clone(),
        )))
    }
}

/// Status sink that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    info: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingStatus {
    pub fn info_lines(&self) -> Vec<String> {
        self.info.lock().unwrap().clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingStatus {
    fn info(&self, line: &str) {
        self.info.lock().unwrap().push(line.to_string());
    }

    fn error(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
    }
}

/// Headless window system that also journals presents, context release and
/// which thread gave up the current context.
pub struct LoggingWindowSystem {
    pub inner: Arc<HeadlessWindowSystem>,
    pub log: EventLog,
}

impl WindowSystem for LoggingWindowSystem {
    fn choose_pixel_format(
        &self,
        window: WindowHandle,
        format: &PixelFormat,
    ) -> Option<PixelFormatId> {
        self.inner.choose_pixel_format(window, format)
    }

    fn set_pixel_format(
        &self,
        window: WindowHandle,
        id: PixelFormatId,
        format: &PixelFormat,
    ) -> Result<(), PlatformError> {
        self.inner.set_pixel_format(window, id, format)
    }

    fn create_context(&self, window: WindowHandle) -> Result<ContextId, PlatformError> {
        self.inner.create_context(window)
    }

    fn make_current(&self, window: WindowHandle, context: ContextId) -> Result<(), PlatformError> {
        self.inner.make_current(window, context)
    }

    fn release_current(&self, window: WindowHandle, context: ContextId) {
        let thread = thread::current();
        self.log.push(format!(
            "surface.unbind {}",
            thread.name().unwrap_or("unnamed")
        ));
        self.inner.release_current(window, context);
    }

    fn version_string(&self, context: ContextId) -> Option<String> {
        self.inner.version_string(context)
    }

    fn swap_buffers(&self, window: WindowHandle) {
        self.log.push("surface.present");
        self.inner.swap_buffers(window);
    }

    fn delete_context(&self, context: ContextId) {
        self.log.push("surface.release");
        self.inner.delete_context(context);
    }
}
