//! Telemetry counters for the page runtime.
//! Kept independent of `Page` internals; callers pass counters explicitly.

use dom::PatchCounters;
use log::info;
use serde::Serialize;

/// Per-page counters, cumulative unless the name says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushCounters {
    pub ticks: u64,
    pub batches_sent: u64,
    pub ops_sent: u64,
    /// Operations in the most recent batch handed to the bridge.
    pub ops_last: u64,
    pub send_failures: u64,
    pub resyncs: u64,
    pub tasks_run: u64,
    pub observer_deliveries: u64,
    pub events_dispatched: u64,
    pub events_dropped: u64,
    pub handler_errors: u64,
    pub patches: PatchCounters,
}

pub fn flush_counters_json(counters: &FlushCounters) -> String {
    serde_json::to_string(counters).unwrap_or_else(|_| String::from("{}"))
}

pub fn maybe_emit(enabled: bool, json_line: &str) {
    if enabled {
        info!(target: "telemetry", "{json_line}");
    }
}
