//! Page runtime for the virtual document.
//!
//! This crate drives one or more [`dom::Document`]s the way a page host does:
//! mutations made during a tick are flushed as one patch batch onto the
//! bridge, follow-up work registered with `run_after_flush` runs after that
//! flush, and mutation observers hear about changes after that. Inbound host
//! events are dispatched through the document and followed by another drain.

pub mod config;
/// Page registry and lifecycle
pub mod context;
pub mod events;
/// Host event loop over tokio channels
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use context::{ContextError, PageLifecycle, Query, RuntimeContext, safe_execute};
pub use events::{EventCenter, Subscription};
pub use runtime::serve;
pub use scheduler::{AfterFlushTask, FrameCallback, FrameHandle, TickScheduler};
pub use state::{Page, TickOutcome};
pub use telemetry::FlushCounters;
