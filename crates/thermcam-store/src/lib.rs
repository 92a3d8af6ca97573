//! State shared between the acquisition loop and the stream server.

mod health;

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thermcam_types::frame::ProcessedFrame;
use tracing::warn;

pub use health::{health_channel, HealthHandle, HealthReporter};

/// Single-slot holder of the most recent processed frame.
///
/// Publishing swaps in a whole new snapshot; readers clone an `Arc` to
/// whichever snapshot is current and never see a partial frame. Frames the
/// readers did not get to in time are simply replaced.
#[derive(Clone, Default)]
pub struct FrameStore {
    slot: Arc<ArcSwapOption<ProcessedFrame>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current frame. A frame that is not newer than the stored
    /// one is refused and `false` is returned.
    pub fn publish(&self, frame: ProcessedFrame) -> bool {
        if let Some(current) = &*self.slot.load() {
            if frame.sequence() <= current.sequence() {
                warn!(
                    "Refusing stale frame {} (store holds {})",
                    frame.sequence(),
                    current.sequence()
                );
                return false;
            }
        }
        self.slot.store(Some(Arc::new(frame)));
        true
    }

    pub fn latest(&self) -> Option<Arc<ProcessedFrame>> {
        self.slot.load_full()
    }

    pub fn latest_sequence(&self) -> Option<u64> {
        (*self.slot.load()).as_ref().map(|frame| frame.sequence())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}
