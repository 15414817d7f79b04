use super::HandleGuard;
use crate::engine::{MediaSource, StreamDescriptor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A device source, or an aggregate when `children` is non-empty
#[derive(Debug)]
pub(super) struct VirtualSource {
    id: String,
    streams: Vec<StreamDescriptor>,
    children: Vec<Arc<dyn MediaSource>>,
    shut_down: AtomicBool,
    _guard: HandleGuard,
}

impl VirtualSource {
    pub(super) fn new(
        id: String,
        streams: Vec<StreamDescriptor>,
        children: Vec<Arc<dyn MediaSource>>,
        guard: HandleGuard,
    ) -> Self {
        Self {
            id,
            streams,
            children,
            shut_down: AtomicBool::new(false),
            _guard: guard,
        }
    }
}

impl MediaSource for VirtualSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        self.streams.clone()
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for child in &self.children {
            child.shutdown();
        }
        debug!(source = %self.id, "virtual source shut down");
    }
}
