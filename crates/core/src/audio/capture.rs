use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use super::AudioBatch;

/// Receives audio batches on the audio-delivery thread.
pub trait CaptureSink: Send + Sync {
    fn on_batch(&self, batch: &AudioBatch<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out point between the audio pipeline and registered listeners.
///
/// Delivery is synchronous and holds the listener table for reading, so once
/// [`CaptureHub::remove_listener`] returns the removed sink sees no further
/// batches.
#[derive(Default)]
pub struct CaptureHub {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn CaptureSink>)>>,
    next_id: AtomicU64,
}

impl CaptureHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, sink: Arc<dyn CaptureSink>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, sink));
        tracing::debug!(?id, "capture listener added");
        id
    }

    /// Returns `false` when `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(?id, "capture listener removed");
        }
        removed
    }

    /// Hands `batch` to every listener in registration order and returns how
    /// many were called.
    pub fn deliver(&self, batch: &AudioBatch<'_>) -> usize {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, sink) in listeners.iter() {
            sink.on_batch(batch);
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl fmt::Debug for CaptureHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
