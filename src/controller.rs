use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::error::{EngineError, Result};

/// One scheduled frame tick.
pub type Frame = BoxFuture<'static, ()>;

/// The host's per-frame scheduling primitive.
pub trait FrameHost: Send + Sync + 'static {
    /// Arranges for `frame` to run on the next frame.
    fn request_frame(&self, frame: Frame) -> FrameRequest;
}

/// A pending frame that can still be cancelled.
pub struct FrameRequest {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl FrameRequest {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Drops the frame if it has not started. A running frame is unaffected.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Runs frames on a tokio runtime, one `frame_interval` after each request.
pub struct TokioFrameHost {
    runtime: Handle,
    frame_interval: Duration,
}

impl TokioFrameHost {
    pub fn new(runtime: Handle, frame_interval: Duration) -> Self {
        Self {
            runtime,
            frame_interval,
        }
    }

    /// Uses the runtime the caller is running on.
    pub fn current(frame_interval: Duration) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::new(runtime, frame_interval))
    }
}

impl FrameHost for TokioFrameHost {
    fn request_frame(&self, frame: Frame) -> FrameRequest {
        let interval = self.frame_interval;
        let runtime = self.runtime.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            // detached, so aborting the timer never interrupts a running tick
            runtime.spawn(frame);
        });
        FrameRequest::new(move || timer.abort())
    }
}

/// Queues frames until the embedder steps them explicitly.
#[derive(Clone, Default)]
pub struct ManualFrameHost {
    inner: Arc<ManualQueue>,
}

#[derive(Default)]
struct ManualQueue {
    next_id: AtomicU64,
    frames: Mutex<VecDeque<(u64, Frame)>>,
}

impl ManualFrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.inner.frames.lock().len()
    }

    /// Runs the oldest pending frame to completion. Returns false if none was queued.
    pub async fn step(&self) -> bool {
        let next = self.inner.frames.lock().pop_front();
        match next {
            Some((_, frame)) => {
                frame.await;
                true
            }
            None => false,
        }
    }

    /// Steps up to `frames` frames; returns how many ran.
    pub async fn run(&self, frames: usize) -> usize {
        let mut ran = 0;
        while ran < frames && self.step().await {
            ran += 1;
        }
        ran
    }
}

impl FrameHost for ManualFrameHost {
    fn request_frame(&self, frame: Frame) -> FrameRequest {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.frames.lock().push_back((id, frame));
        let queue = Arc::clone(&self.inner);
        FrameRequest::new(move || queue.frames.lock().retain(|(queued, _)| *queued != id))
    }
}

/// Frame-loop state: stop flag, loop epoch and the pending frame.
pub(crate) struct Controller {
    host: Arc<dyn FrameHost>,
    stopping: AtomicBool,
    epoch: AtomicU64,
    frames: AtomicU64,
    // pending frame and the epoch that scheduled it
    pending: Mutex<Option<(u64, FrameRequest)>>,
    fault: Mutex<Option<EngineError>>,
}

impl Controller {
    pub(crate) fn new(host: Arc<dyn FrameHost>) -> Self {
        Self {
            host,
            stopping: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            pending: Mutex::new(None),
            fault: Mutex::new(None),
        }
    }

    /// Clears the stop flag and opens a new loop epoch.
    pub(crate) fn begin(&self) -> u64 {
        self.stopping.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sets the stop flag and cancels the pending frame, if any.
    pub(crate) fn halt(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let pending = self.pending.lock().take();
        if let Some((_, request)) = pending {
            request.cancel();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.stopping.load(Ordering::SeqCst)
    }

    /// True while no later `begin` has replaced `epoch`.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// True when the tick of `epoch` must not go any further.
    pub(crate) fn should_abort(&self, epoch: u64) -> bool {
        self.stopping.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch
    }

    pub(crate) fn schedule(&self, epoch: u64, frame: Frame) {
        let request = self.host.request_frame(frame);
        let previous = self.pending.lock().replace((epoch, request));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
    }

    /// Forgets the pending request once its frame is running.
    pub(crate) fn frame_started(&self, epoch: u64) {
        let mut pending = self.pending.lock();
        if matches!(*pending, Some((scheduled, _)) if scheduled == epoch) {
            pending.take();
        }
    }

    pub(crate) fn frame_completed(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub(crate) fn record_fault(&self, err: EngineError) {
        *self.fault.lock() = Some(err);
    }

    pub(crate) fn take_fault(&self) -> Option<EngineError> {
        self.fault.lock().take()
    }
}
