//! The "next tick" queue.
//!
//! Work registered with [`TickScheduler::run_after_flush`] runs after the
//! patch flush of the next tick, in registration order. The queue is taken
//! as a whole before the tasks run, so a task that registers more work
//! pushes it into the following tick instead of extending the current one.
//!
//! Animation frames run at the start of a tick, before the flush, so the
//! mutations they make travel in that tick's batch. Every callback of one
//! frame sees the same timestamp.

use dom::Document;
use log::trace;
use std::collections::VecDeque;

/// Follow-up work run after a flush. It may schedule more work.
pub type AfterFlushTask = Box<dyn FnOnce(&mut Document, &mut TickScheduler)>;

/// Animation frame callback, given the frame timestamp in milliseconds
/// since the document was created.
pub type FrameCallback = Box<dyn FnOnce(&mut Document, &mut TickScheduler, f64)>;

/// Handle for cancelling a requested animation frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Cooperative task queue over a single execution context.
#[derive(Default)]
pub struct TickScheduler {
    queue: VecDeque<AfterFlushTask>,
    frames: Vec<(FrameHandle, FrameCallback)>,
    next_frame: u64,
    requested: bool,
    /// Number of tasks run during this session.
    ran: u64,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` for the next tick and request one.
    pub fn run_after_flush<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Document, &mut Self) + 'static,
    {
        self.queue.push_back(Box::new(task));
        self.requested = true;
    }

    /// Run `callback` at the start of the next tick.
    pub fn request_animation_frame<F>(&mut self, callback: F) -> FrameHandle
    where
        F: FnOnce(&mut Document, &mut Self, f64) + 'static,
    {
        self.next_frame += 1;
        let handle = FrameHandle(self.next_frame);
        self.frames.push((handle, Box::new(callback)));
        self.requested = true;
        handle
    }

    /// Drop a frame callback that has not run yet.
    pub fn cancel_animation_frame(&mut self, handle: FrameHandle) -> bool {
        let before = self.frames.len();
        self.frames.retain(|(queued, _)| *queued != handle);
        before != self.frames.len()
    }

    /// Frame callbacks waiting for the next tick.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Run the frame callbacks requested before this call with one shared
    /// timestamp. Frames requested meanwhile wait for the next tick.
    pub fn run_frames(&mut self, document: &mut Document) -> usize {
        let ready = core::mem::take(&mut self.frames);
        let count = ready.len();
        if count == 0 {
            return 0;
        }
        let timestamp = document.now();
        for (_, callback) in ready {
            callback(document, self, timestamp);
        }
        trace!("ran {count} animation frame callbacks at {timestamp:.3}ms");
        count
    }

    /// Ask for a tick without queueing work, e.g. after a host event.
    pub fn request_tick(&mut self) {
        self.requested = true;
    }

    /// Whether a tick has been asked for since the last one started.
    pub fn is_tick_requested(&self) -> bool {
        self.requested
    }

    /// Tasks waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn ran(&self) -> u64 {
        self.ran
    }

    /// Start a tick: clears the request flag.
    pub(crate) fn begin_tick(&mut self) {
        self.requested = false;
    }

    /// Run the tasks queued before this call, oldest first. Returns how many
    /// ran.
    pub fn run(&mut self, document: &mut Document) -> usize {
        let ready = core::mem::take(&mut self.queue);
        let count = ready.len();
        for task in ready {
            task(document, self);
        }
        self.ran = self.ran.saturating_add(count as u64);
        if count > 0 {
            trace!("ran {count} after-flush tasks, {} deferred to the next tick", self.queue.len());
        }
        count
    }
}
