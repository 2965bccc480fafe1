use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{HiveError, Result};

/// Grants access to the shared screen of the conferencing session
pub trait CaptureSource: Send + Sync {
    fn acquire(&self) -> Result<Arc<dyn CaptureStream>>;
}

/// An acquired capture. Must be released exactly once when the session ends.
pub trait CaptureStream: Send + Sync {
    /// Best-effort still frame as a data URL
    fn snapshot(&self) -> Option<String>;

    fn release(&self);

    fn is_active(&self) -> bool;
}

/// Capture fed by clients that upload frames of their shared screen.
///
/// Frames pushed while no stream is acquired are dropped.
#[derive(Clone)]
pub struct PushedFrameCapture {
    enabled: bool,
    inner: Arc<FrameSlot>,
}

struct FrameSlot {
    active: AtomicBool,
    latest: RwLock<Option<String>>,
}

impl FrameSlot {
    fn store(&self, frame: Option<String>) {
        match self.latest.write() {
            Ok(mut guard) => *guard = frame,
            Err(poisoned) => *poisoned.into_inner() = frame,
        }
    }

    fn load(&self) -> Option<String> {
        match self.latest.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PushedFrameCapture {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Arc::new(FrameSlot {
                active: AtomicBool::new(false),
                latest: RwLock::new(None),
            }),
        }
    }

    /// Stores the latest frame. Returns false when no capture is active.
    pub fn push_frame(&self, frame: String) -> bool {
        if !self.inner.active.load(Ordering::Acquire) {
            tracing::debug!("Dropping frame pushed without an active capture");
            return false;
        }
        self.inner.store(Some(frame));
        true
    }
}

impl CaptureSource for PushedFrameCapture {
    fn acquire(&self) -> Result<Arc<dyn CaptureStream>> {
        if !self.enabled {
            return Err(HiveError::CaptureDenied);
        }
        self.inner.store(None);
        self.inner.active.store(true, Ordering::Release);
        tracing::info!("Screen capture acquired");
        Ok(Arc::new(PushedFrameStream {
            slot: self.inner.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

struct PushedFrameStream {
    slot: Arc<FrameSlot>,
    released: AtomicBool,
}

impl CaptureStream for PushedFrameStream {
    fn snapshot(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        self.slot.load()
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.slot.active.store(false, Ordering::Release);
        self.slot.store(None);
        tracing::info!("Screen capture released");
    }

    fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }
}
