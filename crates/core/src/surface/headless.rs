use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    thread::{self, ThreadId},
};

use super::{ContextId, PixelFormat, PixelFormatId, PlatformError, WindowHandle, WindowSystem};

/// In-process window system with no real display behind it. Contexts are
/// bookkeeping entries and presenting only counts swaps, which makes it
/// usable both for offscreen sessions and for exercising failure paths.
///
/// Like a real GL driver, a context is current per thread: version queries
/// and swaps only take effect on a thread the context was made current on.
/// Swaps from any other thread are counted separately.
#[derive(Debug)]
pub struct HeadlessWindowSystem {
    version: Option<String>,
    fail_pixel_format: bool,
    fail_context: bool,
    state: Mutex<HeadlessState>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_context: u64,
    live: HashSet<ContextId>,
    formats: HashMap<WindowHandle, PixelFormatId>,
    current: HashMap<ThreadId, (WindowHandle, ContextId)>,
    swaps: u64,
    unbound_swaps: u64,
}

impl Default for HeadlessWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessWindowSystem {
    pub const DEFAULT_VERSION: &'static str = "3.3.0 headless";

    pub fn new() -> Self {
        Self {
            version: Some(Self::DEFAULT_VERSION.to_string()),
            fail_pixel_format: false,
            fail_context: false,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Version string reported by every context this system creates.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Contexts report no version string at all.
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// No pixel format matches any request.
    pub fn failing_pixel_format(mut self) -> Self {
        self.fail_pixel_format = true;
        self
    }

    /// Context creation is refused.
    pub fn failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    pub fn swap_count(&self) -> u64 {
        self.lock().swaps
    }

    /// Swaps requested from a thread with no current context for the window.
    pub fn unbound_swaps(&self) -> u64 {
        self.lock().unbound_swaps
    }

    pub fn live_contexts(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WindowSystem for HeadlessWindowSystem {
    fn choose_pixel_format(
        &self,
        _window: WindowHandle,
        format: &PixelFormat,
    ) -> Option<PixelFormatId> {
        if self.fail_pixel_format || format.color_bits > 32 {
            return None;
        }
        Some(PixelFormatId(1))
    }

    fn set_pixel_format(
        &self,
        window: WindowHandle,
        id: PixelFormatId,
        _format: &PixelFormat,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        match state.formats.get(&window) {
            Some(existing) if *existing != id => Err(PlatformError(format!(
                "window {window:?} already uses pixel format {existing:?}"
            ))),
            _ => {
                state.formats.insert(window, id);
                Ok(())
            }
        }
    }

    fn create_context(&self, window: WindowHandle) -> Result<ContextId, PlatformError> {
        if self.fail_context {
            return Err(PlatformError("context creation refused".to_string()));
        }
        let mut state = self.lock();
        if !state.formats.contains_key(&window) {
            return Err(PlatformError(format!("window {window:?} has no pixel format")));
        }
        state.next_context += 1;
        let id = ContextId(state.next_context);
        state.live.insert(id);
        Ok(id)
    }

    fn make_current(&self, window: WindowHandle, context: ContextId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if !state.live.contains(&context) {
            return Err(PlatformError(format!("context {context:?} is not live")));
        }
        let me = thread::current().id();
        if let Some((owner, _)) = state
            .current
            .iter()
            .find(|(owner, (_, bound))| **owner != me && *bound == context)
        {
            return Err(PlatformError(format!(
                "context {context:?} is current on thread {owner:?}"
            )));
        }
        state.current.insert(me, (window, context));
        Ok(())
    }

    fn release_current(&self, _window: WindowHandle, context: ContextId) {
        let mut state = self.lock();
        let me = thread::current().id();
        if state.current.get(&me).map(|(_, bound)| *bound) == Some(context) {
            state.current.remove(&me);
        }
    }

    fn version_string(&self, context: ContextId) -> Option<String> {
        let state = self.lock();
        let current = state.current.get(&thread::current().id());
        if !state.live.contains(&context) || current.map(|(_, bound)| *bound) != Some(context) {
            return None;
        }
        self.version.clone()
    }

    fn swap_buffers(&self, window: WindowHandle) {
        let mut state = self.lock();
        let current = state.current.get(&thread::current().id());
        if current.map(|(bound, _)| *bound) == Some(window) {
            state.swaps += 1;
        } else {
            state.unbound_swaps += 1;
        }
    }

    fn delete_context(&self, context: ContextId) {
        let mut state = self.lock();
        state.live.remove(&context);
        state.current.retain(|_, (_, bound)| *bound != context);
    }
}
