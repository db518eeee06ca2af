//! Background render worker
//!
//! Conversion runs on a dedicated thread so the UI thread never blocks on it.
//! Requests carry a generation number; the worker drains its queue before
//! each render and only renders the newest request, so a burst of dispatches
//! costs one conversion.

use crate::coordinates::Viewport;
use crate::error::PreviewError;
use crate::virtual_scroll::{RenderStatistics, VirtualScrollPreview};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a render was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Result will be displayed
    Authoritative,
    /// Warm-up render; result is only cached
    Speculative,
}

/// Snapshot of everything a render needs, taken at dispatch time
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub generation: u64,
    pub kind: RequestKind,
    pub source: Arc<str>,
    /// Hash of `source`, echoed back for cache keying
    pub source_hash: u64,
    pub viewport: Viewport,
}

/// Successful render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Unstyled HTML fragment
    pub html: String,
    pub line_offset: usize,
    pub statistics: RenderStatistics,
}

/// Completion delivered back to the UI thread
#[derive(Debug)]
pub struct RenderResponse {
    pub generation: u64,
    pub kind: RequestKind,
    pub source_hash: u64,
    pub result: Result<RenderOutput, PreviewError>,
    /// Time spent converting
    pub duration: Duration,
    /// Older requests dropped in favor of this one
    pub superseded: usize,
}

enum WorkerMessage {
    Render(RenderRequest),
    Shutdown,
}

/// Handle to the render thread
pub struct RenderWorker {
    tx: Sender<WorkerMessage>,
    rx: Receiver<RenderResponse>,
    /// Requests submitted but not yet answered or dropped
    pending: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Start the worker thread rendering through `preview`
    pub fn spawn(preview: VirtualScrollPreview) -> Result<Self, PreviewError> {
        let (tx, request_rx) = channel::unbounded::<WorkerMessage>();
        let (response_tx, rx) = channel::unbounded::<RenderResponse>();
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_worker = pending.clone();

        let handle = thread::Builder::new()
            .name("preview-render".into())
            .spawn(move || {
                debug!("render worker started");
                run(preview, request_rx, response_tx, pending_worker);
                debug!("render worker stopped");
            })
            .map_err(|err| PreviewError::WorkerSpawn(err.to_string()))?;

        Ok(Self {
            tx,
            rx,
            pending,
            handle: Some(handle),
        })
    }

    /// Queue a render; returns immediately
    pub fn submit(&self, request: RenderRequest) -> Result<(), PreviewError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(WorkerMessage::Render(request)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            PreviewError::WorkerDisconnected
        })
    }

    /// True when no submitted request is still waiting or rendering
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// Next completion if one is ready
    pub fn try_recv(&self) -> Result<Option<RenderResponse>, PreviewError> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PreviewError::WorkerDisconnected),
        }
    }

    /// Block up to `timeout` for the next completion
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<RenderResponse>, PreviewError> {
        match self.rx.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PreviewError::WorkerDisconnected),
        }
    }

    /// Stop the thread and wait for the current render to finish
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if handle.join().is_err() {
            warn!("render worker exited abnormally");
        }
        info!("render worker shut down");
    }
}

/// Dropping detaches the thread. A conversion in progress runs to completion
/// in the background and its result is discarded.
impl Drop for RenderWorker {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            let _ = self.tx.send(WorkerMessage::Shutdown);
            debug!("render worker detached");
        }
    }
}

fn run(
    preview: VirtualScrollPreview,
    requests: Receiver<WorkerMessage>,
    responses: Sender<RenderResponse>,
    pending: Arc<AtomicUsize>,
) {
    while let Ok(message) = requests.recv() {
        let first = match message {
            WorkerMessage::Render(request) => request,
            WorkerMessage::Shutdown => return,
        };

        // Drain anything that queued up behind it
        let mut batch = vec![first];
        let mut shutdown = false;
        for message in requests.try_iter() {
            match message {
                WorkerMessage::Render(request) => batch.push(request),
                WorkerMessage::Shutdown => {
                    shutdown = true;
                    break;
                }
            }
        }

        let drained = batch.len();
        let Some(request) = select_latest(batch) else {
            continue;
        };
        if drained > 1 {
            debug!(
                generation = request.generation,
                dropped = drained - 1,
                "coalesced queued render requests"
            );
        }

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let (html, line_offset) = preview.render_viewport(&request.source, &request.viewport);
            RenderOutput {
                html,
                line_offset,
                statistics: preview.get_statistics(),
            }
        }))
        .map_err(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(generation = request.generation, %message, "render panicked");
            PreviewError::WorkerPanicked(message)
        });
        let duration = start.elapsed();

        pending.fetch_sub(drained, Ordering::AcqRel);

        let response = RenderResponse {
            generation: request.generation,
            kind: request.kind,
            source_hash: request.source_hash,
            result,
            duration,
            superseded: drained - 1,
        };
        if responses.send(response).is_err() || shutdown {
            return;
        }
    }
}

/// Newest authoritative request, or the newest request when none is authoritative
fn select_latest(batch: Vec<RenderRequest>) -> Option<RenderRequest> {
    let authoritative = batch
        .iter()
        .rposition(|request| request.kind == RequestKind::Authoritative);
    let mut batch = batch;
    match authoritative {
        Some(index) => Some(batch.swap_remove(index)),
        None => batch.pop(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
