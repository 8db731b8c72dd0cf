//! Log routing for the document runtime.
//!
//! Handler failures, dropped host events and scheduler warnings all funnel
//! through a `HostLogger` so an embedder can redirect them. The default
//! implementation prints using the `log` crate.

use log::{debug, error, info, trace, warn};

/// Severity attached to a message routed through a [`HostLogger`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for runtime diagnostics.
pub trait HostLogger: Send + Sync {
    /// Record one message at the given level.
    fn log(&self, level: LogLevel, message: &str);
}

/// Console provides helper functions to print messages emitted by the
/// runtime. This keeps output routing in one place.
pub struct Console;

impl Console {
    /// Print a trace line.
    #[inline]
    pub fn trace<M: AsRef<str>>(message: M) {
        trace!("[DOC]: {}", message.as_ref());
    }

    /// Print a debug line.
    #[inline]
    pub fn debug<M: AsRef<str>>(message: M) {
        debug!("[DOC]: {}", message.as_ref());
    }

    /// Print an informational line.
    #[inline]
    pub fn info<M: AsRef<str>>(message: M) {
        info!("[DOC]: {}", message.as_ref());
    }

    /// Print a warning line.
    #[inline]
    pub fn warn<M: AsRef<str>>(message: M) {
        warn!("[DOC]: {}", message.as_ref());
    }

    /// Print an error line.
    #[inline]
    pub fn error<M: AsRef<str>>(message: M) {
        error!("[DOC]: {}", message.as_ref());
    }

    /// Print a handler failure with its error chain.
    #[inline]
    pub fn exception<M: AsRef<str>>(message: M, chain: Option<&str>) {
        match chain {
            Some(detail) if !detail.is_empty() => {
                error!("[DOC]: {}\n{}", message.as_ref(), detail);
            }
            _ => {
                error!("[DOC]: {}", message.as_ref());
            }
        }
    }
}

/// A `HostLogger` implementation that routes to the `Console` helpers.
pub struct ConsoleLogger;

impl HostLogger for ConsoleLogger {
    #[inline]
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => Console::trace(message),
            LogLevel::Debug => Console::debug(message),
            LogLevel::Info => Console::info(message),
            LogLevel::Warn => Console::warn(message),
            LogLevel::Error => Console::error(message),
        }
    }
}
