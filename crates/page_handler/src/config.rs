//! Configuration settings for the page runtime.
//!
//! This module defines the tick bound, the component expansion depth used by
//! hydration, patch coalescing and telemetry. Configuration can be loaded from
//! environment variables or constructed programmatically.

use std::env;

/// Runtime configuration for a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound of ticks a single `run_until_idle` call performs
    pub max_ticks: usize,
    /// Component expansion depth allowed while building or hydrating
    pub hydration_depth: usize,
    /// Whether repeated writes to the same node slot are folded together
    pub coalesce: bool,
    /// Whether per-tick counters are logged
    pub telemetry_enabled: bool,
}

impl RuntimeConfig {
    /// Construct a new `RuntimeConfig` with explicit values.
    ///
    /// # Arguments
    ///
    /// * `max_ticks` - Tick bound per drain (minimum 1)
    /// * `hydration_depth` - Component expansion depth (minimum 1)
    /// * `coalesce` - Whether pending writes coalesce
    /// * `telemetry_enabled` - Whether to log telemetry counters
    #[inline]
    #[must_use]
    pub const fn new(max_ticks: usize, hydration_depth: usize, coalesce: bool, telemetry_enabled: bool) -> Self {
        Self {
            max_ticks: if max_ticks < 1 { 1 } else { max_ticks },
            hydration_depth: if hydration_depth < 1 { 1 } else { hydration_depth },
            coalesce,
            telemetry_enabled,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `MIRAGE_MAX_TICKS`: Tick bound per drain (default: 64)
    /// - `MIRAGE_HYDRATION_DEPTH`: Component expansion depth (default: 32)
    /// - `MIRAGE_COALESCE`: Set to "0" to disable coalescing (default: enabled)
    /// - `MIRAGE_TELEMETRY`: Set to "1" to enable telemetry (default: disabled)
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`RuntimeConfig::from_env`] with a custom variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_ticks = lookup("MIRAGE_MAX_TICKS")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(64)
            .max(1);
        let hydration_depth = lookup("MIRAGE_HYDRATION_DEPTH")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(32)
            .max(1);
        let coalesce = lookup("MIRAGE_COALESCE").as_deref() != Some("0");
        let telemetry_enabled = lookup("MIRAGE_TELEMETRY").as_deref() == Some("1");
        Self {
            max_ticks,
            hydration_depth,
            coalesce,
            telemetry_enabled,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(64, 32, true, false)
    }
}
