use std::sync::Arc;

use async_trait::async_trait;
use hopper_core::{Driver, Looper, Queue, QueueError, SharedClock, SystemClock, TimeoutLooper};
use tracing::info;

use crate::queue::MemoryQueue;

/// Creates [`MemoryQueue`]s sharing one clock and looper template.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    looper: Box<dyn Looper>,
    clock: SharedClock,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            looper: Box::new(TimeoutLooper::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Each queue gets its own copy of `looper`.
    pub fn with_looper(mut self, looper: impl Looper + 'static) -> Self {
        self.looper = Box::new(looper);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Concrete counterpart of [`Driver::create_queue`].
    pub fn queue(&self, name: &str) -> MemoryQueue {
        info!(queue = %name, "created in-memory queue");
        MemoryQueue::new(name, self.looper.clone_box(), self.clock.clone())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn create_queue(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError> {
        Ok(Arc::new(self.queue(name)))
    }
}
