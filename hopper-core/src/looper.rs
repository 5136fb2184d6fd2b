//! Dispatch loop drivers.
//!
//! A queue hands its looper a [`Runnable`] performing one dispatch tick. The
//! looper decides when ticks happen: [`TimeoutLooper`] on a timer,
//! [`StepLooper`] only when a test calls [`StepLooper::forward`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::duration::Duration;
use crate::error::QueueError;

pub type Tick = BoxFuture<'static, Result<(), QueueError>>;

/// One dispatch tick of a queue.
pub type Runnable = Arc<dyn Fn() -> Tick + Send + Sync>;

/// Drives a queue's dispatch ticks.
#[async_trait]
pub trait Looper: Send + Sync + fmt::Debug {
    /// Install the tick to run. Called by the queue before `start`.
    fn configure(&self, runnable: Runnable);

    async fn start(&self);

    /// Stop scheduling ticks. Returns once no tick is running.
    async fn stop(&self);

    /// A fresh, unconfigured looper with the same settings.
    fn clone_box(&self) -> Box<dyn Looper>;
}

impl Clone for Box<dyn Looper> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Clone, Default)]
struct RunnableSlot(Arc<Mutex<Option<Runnable>>>);

impl RunnableSlot {
    fn set(&self, runnable: Runnable) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(runnable);
    }

    fn get(&self) -> Option<Runnable> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Runs a tick, waits `delay`, and repeats until stopped.
pub struct TimeoutLooper {
    delay: Duration,
    runnable: RunnableSlot,
    running: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TimeoutLooper {
    pub const DEFAULT_DELAY: Duration = Duration::milliseconds(16);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            runnable: RunnableSlot::default(),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for TimeoutLooper {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl fmt::Debug for TimeoutLooper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutLooper")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Looper for TimeoutLooper {
    fn configure(&self, runnable: Runnable) {
        self.runnable.set(runnable);
    }

    async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }
        let Some(tick) = self.runnable.get() else {
            warn!("timeout looper started before being configured");
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let delay = self.delay.to_std();
        let handle = tokio::spawn(async move {
            while !cancelled.is_cancelled() {
                if let Err(error) = tick().await {
                    error!(%error, "dispatch tick failed");
                }
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            debug!("timeout looper stopped");
        });
        *running = Some((token, handle));
    }

    async fn stop(&self) {
        let Some((token, handle)) = self.running.lock().await.take() else {
            return;
        };
        token.cancel();
        if let Err(error) = handle.await {
            error!(%error, "timeout looper task ended abnormally");
        }
    }

    fn clone_box(&self) -> Box<dyn Looper> {
        Box::new(Self::new(self.delay))
    }
}

/// A looper that only ticks on demand.
///
/// Clones share the installed tick, so a test can keep one handle and give
/// another to the queue:
///
/// ```rust,no_run
/// # use hopper_core::{Queue, StepLooper, QueueError};
/// # async fn example(queue: &dyn Queue) -> Result<(), QueueError> {
/// let looper = StepLooper::new();
/// queue.set_looper(Box::new(looper.clone())).await;
/// queue.start_processing().await?;
/// looper.forward().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct StepLooper {
    runnable: RunnableSlot,
}

impl StepLooper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run exactly one tick and report its outcome.
    pub async fn forward(&self) -> Result<(), QueueError> {
        match self.runnable.get() {
            Some(tick) => tick().await,
            None => {
                debug!("step looper forwarded before being configured");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for StepLooper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepLooper")
            .field("configured", &self.runnable.get().is_some())
            .finish()
    }
}

#[async_trait]
impl Looper for StepLooper {
    fn configure(&self, runnable: Runnable) {
        self.runnable.set(runnable);
    }

    async fn start(&self) {}

    async fn stop(&self) {}

    fn clone_box(&self) -> Box<dyn Looper> {
        Box::new(Self::new())
    }
}

/// The looper currently driving a queue, plus the tick it was configured with.
pub struct LooperSlot {
    runnable: Runnable,
    looper: tokio::sync::Mutex<Box<dyn Looper>>,
}

impl LooperSlot {
    pub fn new(looper: Box<dyn Looper>, runnable: Runnable) -> Self {
        looper.configure(runnable.clone());
        Self {
            runnable,
            looper: tokio::sync::Mutex::new(looper),
        }
    }

    /// Stop the current looper and install `looper` in its place.
    pub async fn replace(&self, looper: Box<dyn Looper>) {
        let mut current = self.looper.lock().await;
        current.stop().await;
        looper.configure(self.runnable.clone());
        *current = looper;
    }

    pub async fn start(&self) {
        self.looper.lock().await.start().await;
    }

    pub async fn stop(&self) {
        self.looper.lock().await.stop().await;
    }
}

impl fmt::Debug for LooperSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LooperSlot").finish_non_exhaustive()
    }
}
