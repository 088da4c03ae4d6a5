//! Render surface lifecycle: pixel-format negotiation, GPU context creation
//! and version gating, buffer presentation and context release.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{status::StatusSink, InitError};

mod headless;

pub use headless::HeadlessWindowSystem;

/// Opaque window identifier supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Platform index of a negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormatId(pub u32);

/// Platform GPU context identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Requested pixel layout for the window surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub color_bits: u8,
    pub alpha_bits: u8,
    pub depth_bits: u8,
    pub double_buffered: bool,
}

impl PixelFormat {
    /// 32-bit RGBA, 24-bit depth, double buffered.
    pub const RGBA32: PixelFormat = PixelFormat {
        color_bits: 32,
        alpha_bits: 8,
        depth_bits: 24,
        double_buffered: true,
    };
}

/// Failure reported by a window-system primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/// Primitives the host window system provides for building a GPU surface.
pub trait WindowSystem: Send + Sync {
    fn choose_pixel_format(&self, window: WindowHandle, format: &PixelFormat)
        -> Option<PixelFormatId>;
    fn set_pixel_format(
        &self,
        window: WindowHandle,
        id: PixelFormatId,
        format: &PixelFormat,
    ) -> Result<(), PlatformError>;
    fn create_context(&self, window: WindowHandle) -> Result<ContextId, PlatformError>;
    /// Makes `context` current on the calling thread.
    fn make_current(&self, window: WindowHandle, context: ContextId) -> Result<(), PlatformError>;
    /// Detaches `context` from the calling thread if it is current there.
    fn release_current(&self, window: WindowHandle, context: ContextId);
    /// Version string reported by a current context, e.g. `"4.6.0 NVIDIA"`.
    fn version_string(&self, context: ContextId) -> Option<String>;
    fn swap_buffers(&self, window: WindowHandle);
    fn delete_context(&self, context: ContextId);
}

/// `major.minor` pair parsed from a context version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    /// `major * 10 + minor` threshold below which shaders are unavailable.
    pub const MIN_SHADER_SCORE: u32 = 20;

    /// Reads the leading `major.minor` from a version string. Whitespace
    /// before either number is skipped and anything after the minor number
    /// is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let (major, rest) = leading_number(text.trim_start())?;
        let rest = rest.strip_prefix('.')?;
        let (minor, _) = leading_number(rest.trim_start())?;
        Some(Self { major, minor })
    }

    pub fn score(self) -> u32 {
        self.major.saturating_mul(10).saturating_add(self.minor)
    }

    pub fn supports_shaders(self) -> bool {
        self.score() >= Self::MIN_SHADER_SCORE
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn leading_number(text: &str) -> Option<(u32, &str)> {
    let end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

/// Builds GPU surfaces for windows on top of a [`WindowSystem`].
#[derive(Clone)]
pub struct ContextManager {
    system: Arc<dyn WindowSystem>,
}

impl ContextManager {
    pub fn new(system: Arc<dyn WindowSystem>) -> Self {
        Self { system }
    }

    /// Negotiates an RGBA32 pixel format, creates and activates a context,
    /// and checks that it supports shaders. The version string is reported
    /// to `status` as soon as it is known. A context created along the way
    /// is released again if a later step fails.
    pub fn initialize(
        &self,
        window: WindowHandle,
        status: &dyn StatusSink,
    ) -> Result<RenderSurfaceContext, InitError> {
        let format = PixelFormat::RGBA32;
        let pixel_format = self
            .system
            .choose_pixel_format(window, &format)
            .ok_or(InitError::UnsupportedPixelFormat)?;
        self.system
            .set_pixel_format(window, pixel_format, &format)
            .map_err(|err| {
                tracing::warn!(?window, %err, "set pixel format failed");
                InitError::UnsupportedPixelFormat
            })?;

        let context = self
            .system
            .create_context(window)
            .map_err(|err| InitError::ContextCreationFailed(err.to_string()))?;
        let mut surface = RenderSurfaceContext {
            window,
            context,
            pixel_format,
            format,
            version: GlVersion { major: 0, minor: 0 },
            version_string: String::new(),
            system: self.system.clone(),
            released: AtomicBool::new(false),
        };

        // `surface` releases the context on drop from here on.
        self.system
            .make_current(window, context)
            .map_err(|err| InitError::ContextCreationFailed(err.to_string()))?;
        let version_string = self.system.version_string(context).ok_or_else(|| {
            InitError::ContextCreationFailed("context reported no version".to_string())
        })?;
        status.info(&format!("GPU version: {version_string}"));

        let version = GlVersion::parse(&version_string)
            .filter(|version| version.supports_shaders())
            .ok_or_else(|| InitError::UnsupportedVersion(version_string.clone()))?;

        // Free the context for whichever thread renders into it.
        self.system.release_current(window, context);
        tracing::info!(?window, %version, "GPU context ready");
        surface.version = version;
        surface.version_string = version_string;
        Ok(surface)
    }
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextManager").finish()
    }
}

/// A live GPU context bound to one window. It is released exactly once,
/// either by [`RenderSurfaceContext::teardown`] or on drop.
pub struct RenderSurfaceContext {
    window: WindowHandle,
    context: ContextId,
    pixel_format: PixelFormatId,
    format: PixelFormat,
    version: GlVersion,
    version_string: String,
    system: Arc<dyn WindowSystem>,
    released: AtomicBool,
}

impl RenderSurfaceContext {
    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn pixel_format(&self) -> (PixelFormatId, PixelFormat) {
        (self.pixel_format, self.format)
    }

    pub fn version(&self) -> GlVersion {
        self.version
    }

    pub fn version_string(&self) -> &str {
        &self.version_string
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Makes the context current on the calling thread until the returned
    /// guard is dropped. The guard must be dropped on the same thread.
    pub fn make_current(self: &Arc<Self>) -> Result<CurrentContext, PlatformError> {
        if self.is_released() {
            return Err(PlatformError("GPU context has been released".to_string()));
        }
        self.system.make_current(self.window, self.context)?;
        Ok(CurrentContext {
            surface: self.clone(),
        })
    }

    /// Swaps the window's buffers. Does nothing once the context is gone.
    pub fn present(&self) {
        if self.is_released() {
            return;
        }
        self.system.swap_buffers(self.window);
    }

    /// Releases the GPU context. Must run after the engine that used it has
    /// been destroyed. Later calls are no-ops.
    pub fn teardown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(window = ?self.window, context = ?self.context, "releasing GPU context");
        self.system.delete_context(self.context);
    }
}

impl Drop for RenderSurfaceContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A surface's context bound to the thread that created this guard.
#[derive(Debug)]
pub struct CurrentContext {
    surface: Arc<RenderSurfaceContext>,
}

impl CurrentContext {
    pub fn surface(&self) -> &RenderSurfaceContext {
        &self.surface
    }
}

impl Drop for CurrentContext {
    fn drop(&mut self) {
        if !self.surface.is_released() {
            self.surface
                .system
                .release_current(self.surface.window, self.surface.context);
        }
    }
}

impl fmt::Debug for RenderSurfaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSurfaceContext")
            .field("window", &self.window)
            .field("context", &self.context)
            .field("pixel_format", &self.pixel_format)
            .field("version", &self.version_string)
            .field("released", &self.is_released())
            .finish()
    }
}
