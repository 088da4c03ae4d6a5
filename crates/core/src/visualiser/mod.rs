//! The visualiser element: one window's GPU surface, engine, playlist,
//! render scheduler and capture registration, torn down in a fixed order.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    audio::{CaptureHub, EngineIngest, ListenerId},
    config::{ConfigService, SubscriptionId},
    engine::{EngineFactory, EngineHandle, FrameStats},
    playlist::{self, AbortSignal},
    scheduler::{frame_interval, RenderScheduler},
    status::StatusSink,
    surface::{ContextManager, CurrentContext, RenderSurfaceContext, WindowHandle, WindowSystem},
    Result,
};

/// Host notifications about the element's window.
pub trait WindowEventSink {
    fn on_resize(&self, width: u32, height: u32);
    fn on_double_click(&self);
    fn on_destroy(&mut self);
}

/// What the host needs to know to embed the element.
pub trait RenderableElement {
    fn window(&self) -> WindowHandle;
    fn state(&self) -> ElementState;
}

/// Synchronous folder chooser. `None` means the user cancelled.
pub trait FolderPicker: Send + Sync {
    fn pick_folder(&self, title: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Initialisation failed; the window exists but nothing renders.
    Inert,
    Live,
    Destroyed,
}

/// Collaborators injected into every element.
#[derive(Clone)]
pub struct VisualiserServices {
    pub window_system: Arc<dyn WindowSystem>,
    pub engines: Arc<dyn EngineFactory>,
    pub capture: Arc<CaptureHub>,
    pub config: Arc<dyn ConfigService>,
    pub status: Arc<dyn StatusSink>,
    pub folders: Arc<dyn FolderPicker>,
    pub target_fps: u32,
}

struct LiveParts {
    surface: Arc<RenderSurfaceContext>,
    engine: Arc<EngineHandle>,
    scheduler: RenderScheduler,
    listener: ListenerId,
    subscription: SubscriptionId,
}

/// A visualisation bound to one host window.
///
/// The element exclusively owns the engine and releases it exactly once:
/// after the scheduler has stopped and before the GPU context is released.
pub struct Visualiser {
    window: WindowHandle,
    services: VisualiserServices,
    abort: AbortSignal,
    live: Option<LiveParts>,
    state: ElementState,
}

impl Visualiser {
    /// Brings the element up for `window`. Failures are reported once to the
    /// status sink and leave the element inert.
    pub fn create(window: WindowHandle, services: VisualiserServices) -> Self {
        let abort = AbortSignal::new();
        let (live, state) = match initialize(window, &services, &abort) {
            Ok(live) => (Some(live), ElementState::Live),
            Err(err) => {
                services
                    .status
                    .error(&format!("visualiser initialization failed: {err}"));
                (None, ElementState::Inert)
            }
        };

        Self {
            window,
            services,
            abort,
            live,
            state,
        }
    }

    pub fn playlist_size(&self) -> usize {
        self.live
            .as_ref()
            .map(|live| live.engine.playlist_size())
            .unwrap_or(0)
    }

    pub fn frame_stats(&self) -> Option<FrameStats> {
        self.live.as_ref().and_then(|live| live.engine.frame_stats())
    }

    pub fn ticks(&self) -> u64 {
        self.live
            .as_ref()
            .map(|live| live.scheduler.tick_count())
            .unwrap_or(0)
    }

    pub fn surface_version(&self) -> Option<&str> {
        self.live.as_ref().map(|live| live.surface.version_string())
    }

    fn teardown(&mut self) {
        self.abort.raise();
        let Some(mut live) = self.live.take() else {
            if self.state == ElementState::Inert {
                self.state = ElementState::Destroyed;
            }
            return;
        };

        self.services.config.unsubscribe(live.subscription);
        live.scheduler.stop();
        self.services.capture.remove_listener(live.listener);
        live.engine.destroy();
        live.surface.teardown();
        self.state = ElementState::Destroyed;
        tracing::info!(window = ?self.window, "visualiser destroyed");
    }
}

fn initialize(
    window: WindowHandle,
    services: &VisualiserServices,
    abort: &AbortSignal,
) -> Result<LiveParts> {
    let surface = ContextManager::new(services.window_system.clone())
        .initialize(window, services.status.as_ref())?;
    let surface = Arc::new(surface);
    let engine = Arc::new(EngineHandle::create(
        services.engines.as_ref(),
        &surface,
        services.target_fps,
    )?);

    let directory = services.config.preset_directory();
    if let Err(err) = playlist::reload(Path::new(&directory), abort, &engine) {
        services
            .status
            .error(&format!("failed to load presets: {err}"));
    }
    services.status.info(&format!(
        "engine created, presets directory: '{directory}'"
    ));

    let scheduler = {
        let engine = engine.clone();
        let surface = surface.clone();
        // Bound on the first tick and released when the render thread exits.
        let mut current: Option<CurrentContext> = None;
        let mut reported = false;
        RenderScheduler::start(frame_interval(services.target_fps), move || {
            if current.is_none() {
                match surface.make_current() {
                    Ok(bound) => current = Some(bound),
                    Err(err) => {
                        if !reported {
                            tracing::error!(%err, "GPU context unavailable on render thread");
                            reported = true;
                        }
                        return;
                    }
                }
            }
            if engine.render_frame() {
                surface.present();
            }
        })
    };
    let scheduler = match scheduler {
        Ok(scheduler) => scheduler,
        Err(err) => {
            engine.destroy();
            surface.teardown();
            return Err(err);
        }
    };

    let listener = services
        .capture
        .add_listener(Arc::new(EngineIngest::new(engine.clone())));
    let subscription = {
        let engine = engine.clone();
        let abort = abort.clone();
        let status = services.status.clone();
        services.config.subscribe(Box::new(move |directory: &str| {
            match playlist::reload(Path::new(directory), &abort, &engine) {
                Ok(count) => status.info(&format!(
                    "new playlist size: {count}, presets directory: '{directory}'"
                )),
                Err(err) => status.error(&format!("failed to load presets: {err}")),
            }
        }))
    };

    tracing::info!(?window, version = surface.version_string(), "visualiser live");
    Ok(LiveParts {
        surface,
        engine,
        scheduler,
        listener,
        subscription,
    })
}

impl WindowEventSink for Visualiser {
    fn on_resize(&self, width: u32, height: u32) {
        if let Some(live) = &self.live {
            live.engine.set_window_size(width, height);
        }
    }

    /// Lets the user choose a new preset folder. Storing it triggers the
    /// reload through the config subscription.
    fn on_double_click(&self) {
        if self.live.is_none() {
            return;
        }
        let Some(folder) = self.services.folders.pick_folder("Choose presets folder") else {
            return;
        };
        let folder = folder.to_string_lossy();
        if let Err(err) = self.services.config.set_preset_directory(&folder) {
            self.services
                .status
                .error(&format!("failed to store presets directory: {err}"));
        }
    }

    fn on_destroy(&mut self) {
        self.teardown();
    }
}

impl RenderableElement for Visualiser {
    fn window(&self) -> WindowHandle {
        self.window
    }

    fn state(&self) -> ElementState {
        self.state
    }
}

impl Drop for Visualiser {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Visualiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Visualiser")
            .field("window", &self.window)
            .field("state", &self.state)
            .field("playlist", &self.playlist_size())
            .finish()
    }
}
