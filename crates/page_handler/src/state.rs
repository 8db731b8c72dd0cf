use crate::config::RuntimeConfig;
use crate::scheduler::{FrameHandle, TickScheduler};
use crate::telemetry::{FlushCounters, flush_counters_json, maybe_emit};
use bridge::{BridgeError, InboundEvent, PatchBatch};
use container::{CapabilityMissingError, Registry};
use dom::{DispatchOutcome, Document, DocumentOptions, DomError, Hydrator};
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info_span;

/// Result of one tick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Operations handed to the bridge during this tick.
    pub ops_sent: usize,
    pub frames_run: usize,
    pub tasks_run: usize,
    pub observers_notified: usize,
    /// Whether another tick has work to do.
    pub more_pending: bool,
}

/// One page: a document plus the machinery that moves its patches to the
/// render host and runs follow-up work between ticks.
pub struct Page {
    document: Document,
    scheduler: TickScheduler,
    outbound: UnboundedSender<PatchBatch>,
    /// Batches flushed but not yet accepted by the bridge, oldest first.
    undelivered: VecDeque<PatchBatch>,
    counters: FlushCounters,
    config: RuntimeConfig,
}

impl Page {
    /// Create a page whose document resolves its capabilities from `registry`.
    pub fn new(
        registry: Arc<Registry>,
        config: RuntimeConfig,
        outbound: UnboundedSender<PatchBatch>,
    ) -> Result<Self, CapabilityMissingError> {
        let options = DocumentOptions {
            coalesce: config.coalesce,
            ..DocumentOptions::default()
        };
        let document = Document::with_options(registry, options)?;
        Ok(Self::with_document(document, config, outbound))
    }

    /// Wrap an existing document.
    pub fn with_document(mut document: Document, config: RuntimeConfig, outbound: UnboundedSender<PatchBatch>) -> Self {
        document.set_coalescing(config.coalesce);
        Self {
            document,
            scheduler: TickScheduler::new(),
            outbound,
            undelivered: VecDeque::new(),
            counters: FlushCounters::default(),
            config,
        }
    }

    #[inline]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access to the document. Mutations are picked up by the next
    /// tick, which this requests.
    pub fn document_mut(&mut self) -> &mut Document {
        self.scheduler.request_tick();
        &mut self.document
    }

    #[inline]
    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn counters(&self) -> FlushCounters {
        FlushCounters {
            patches: self.document.patch_counters(),
            ..self.counters
        }
    }

    /// Batches still waiting to be accepted by the bridge.
    pub fn undelivered(&self) -> usize {
        self.undelivered.len()
    }

    /// Point the page at a new bridge. Undelivered batches go out first on
    /// the next tick.
    pub fn attach_bridge(&mut self, outbound: UnboundedSender<PatchBatch>) {
        self.outbound = outbound;
        self.scheduler.request_tick();
    }

    /// Queue work for after the next flush.
    pub fn run_after_flush<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Document, &mut TickScheduler) + 'static,
    {
        self.scheduler.run_after_flush(task);
    }

    /// Run `callback` at the start of the next tick, before its flush.
    pub fn request_animation_frame<F>(&mut self, callback: F) -> FrameHandle
    where
        F: FnOnce(&mut Document, &mut TickScheduler, f64) + 'static,
    {
        self.scheduler.request_animation_frame(callback)
    }

    pub fn cancel_animation_frame(&mut self, handle: FrameHandle) -> bool {
        self.scheduler.cancel_animation_frame(handle)
    }

    /// A hydrator for the current generation, bounded by the configured
    /// component depth.
    pub fn hydrator(&self) -> Hydrator<'static> {
        Hydrator::new(self.document.hydration_ticket(), self.config.hydration_depth)
    }

    /// Whether anything is left for another tick.
    pub fn has_pending_work(&self) -> bool {
        self.scheduler.is_tick_requested()
            || self.scheduler.pending() > 0
            || self.scheduler.pending_frames() > 0
            || self.document.pending_patches() > 0
            || self.document.has_pending_records()
            || !self.undelivered.is_empty()
    }

    /// Send queued batches in order. A failed send leaves that batch and
    /// everything after it queued.
    fn deliver(&mut self) -> Result<usize, BridgeError> {
        let mut ops = 0;
        while let Some(batch) = self.undelivered.pop_front() {
            let len = batch.ops.len();
            if let Err(returned) = self.outbound.send(batch) {
                self.undelivered.push_front(returned.0);
                self.counters.send_failures += 1;
                warn!("bridge closed; {} batches kept for retry", self.undelivered.len());
                return Err(BridgeError::ChannelClosed { what: "patch batch" });
            }
            self.counters.batches_sent += 1;
            self.counters.ops_sent += len as u64;
            self.counters.ops_last = len as u64;
            ops += len;
        }
        Ok(ops)
    }

    /// One tick: retry undelivered batches, flush and send, run the
    /// after-flush tasks queued before this tick, then deliver mutation
    /// records.
    pub fn tick(&mut self) -> Result<TickOutcome, BridgeError> {
        let _span = info_span!("page.tick").entered();
        self.scheduler.begin_tick();
        self.counters.ticks += 1;

        let mut ops_sent = self.deliver()?;
        let frames_run = self.scheduler.run_frames(&mut self.document);
        if let Some(batch) = self.document.flush() {
            self.undelivered.push_back(batch);
            ops_sent += self.deliver()?;
        }

        let tasks_run = self.scheduler.run(&mut self.document);
        self.counters.tasks_run += tasks_run as u64;
        let observers_notified = self.document.deliver_mutation_records();
        self.counters.observer_deliveries += observers_notified as u64;

        maybe_emit(self.config.telemetry_enabled, &flush_counters_json(&self.counters()));
        Ok(TickOutcome {
            ops_sent,
            frames_run,
            tasks_run,
            observers_notified,
            more_pending: self.has_pending_work(),
        })
    }

    /// Tick until nothing is pending or the configured bound is reached.
    /// Returns the number of ticks performed.
    pub fn run_until_idle(&mut self) -> Result<usize, BridgeError> {
        for performed in 1..=self.config.max_ticks {
            if !self.tick()?.more_pending {
                return Ok(performed);
            }
        }
        warn!(
            "page still busy after {} ticks; remaining work waits for the next drain",
            self.config.max_ticks
        );
        Ok(self.config.max_ticks)
    }

    /// Replace everything queued with a full snapshot of the current tree
    /// and try to send it.
    pub fn resync(&mut self) -> Result<usize, BridgeError> {
        let superseded = self.undelivered.len();
        self.undelivered.clear();
        self.undelivered.push_back(self.document.full_snapshot_batch());
        self.counters.resyncs += 1;
        debug!("resync queued ({superseded} undelivered batches superseded)");
        self.deliver()
    }

    /// Dispatch a host event. Events for unknown nodes are logged and
    /// dropped; the page keeps serving.
    pub fn handle_host_event(&mut self, event: InboundEvent) -> Option<DispatchOutcome> {
        self.scheduler.request_tick();
        match self.document.dispatch_host_event(event) {
            Ok(outcome) => {
                self.counters.events_dispatched += 1;
                self.counters.handler_errors += outcome.handler_errors as u64;
                Some(outcome)
            }
            Err(DomError::EventTargetMissing { target, event_type }) => {
                self.counters.events_dropped += 1;
                warn!("dropping `{event_type}` for unknown node {target}");
                None
            }
            Err(DomError::Tree(tree_error)) => {
                self.counters.events_dropped += 1;
                error!("host event failed: {tree_error}");
                None
            }
        }
    }
}
