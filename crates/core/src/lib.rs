//! Core library for the preset visualiser.
//!
//! Binds a captured audio stream to an audio-reactive visualization engine
//! rendering into a host window. Each module owns one subsystem: the GPU
//! surface lifecycle, the engine boundary, PCM ingestion, preset playlist
//! loading and the render scheduler. [`Visualiser`] composes them for a
//! single window and owns their teardown order.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod playlist;
pub mod scheduler;
pub mod status;
pub mod surface;
pub mod visualiser;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::{AudioBatch, CaptureHub, CaptureSink, SampleData};
pub use config::{AppConfig, AudioConfig, ConfigService, RenderConfig, SharedConfig, TARGET_FPS};
pub use engine::{
    EngineFactory, EngineHandle, FrameStats, PlaylistEntry, Rating, SpectrumEngineFactory,
    VisualizationEngine,
};
pub use error::{InitError, Result, VisualiserError};
pub use playlist::{scan_presets, AbortSignal, PresetScan};
pub use scheduler::{frame_interval, RenderScheduler};
pub use status::{StatusSink, TracingStatusSink};
pub use surface::{
    ContextManager, CurrentContext, GlVersion, HeadlessWindowSystem, RenderSurfaceContext,
    WindowHandle, WindowSystem,
};
pub use visualiser::{
    ElementState, FolderPicker, RenderableElement, Visualiser, VisualiserServices,
    WindowEventSink,
};
