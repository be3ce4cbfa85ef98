//! Per-kind aggregate counters.
//!
//! Telemetry only: nothing in the dispatch protocol reads these back to make
//! a decision.

use std::collections::BTreeMap;
use std::fmt;

use evtap_core::OperationKind;
use serde::{Deserialize, Serialize};

/// Totals for one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounters {
    pub location_count: u64,
    pub pre_hits: u64,
    pub post_hits: u64,
    pub exception_hits: u64,
    pub deactivated_count: u64,
}

/// Counters for every kind that has at least one attached location.
#[derive(Debug, Clone, Default)]
pub struct AggregateCounters {
    by_kind: BTreeMap<OperationKind, KindCounters>,
}

impl AggregateCounters {
    pub fn new() -> Self {
        AggregateCounters::default()
    }

    pub fn get(&self, kind: OperationKind) -> KindCounters {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    pub(crate) fn entry(&mut self, kind: OperationKind) -> &mut KindCounters {
        self.by_kind.entry(kind).or_default()
    }

    pub(crate) fn location_attached(&mut self, kind: OperationKind) {
        self.entry(kind).location_count += 1;
    }

    pub(crate) fn pre_hit(&mut self, kind: OperationKind) {
        self.entry(kind).pre_hits += 1;
    }

    pub(crate) fn post_hit(&mut self, kind: OperationKind) {
        self.entry(kind).post_hits += 1;
    }

    pub(crate) fn exception_hit(&mut self, kind: OperationKind) {
        self.entry(kind).exception_hits += 1;
    }

    pub(crate) fn deactivated(&mut self, kind: OperationKind) {
        self.entry(kind).deactivated_count += 1;
    }

    /// Snapshot of all kinds seen so far, ordered by kind.
    pub fn report(&self) -> TelemetryReport {
        TelemetryReport {
            rows: self
                .by_kind
                .iter()
                .map(|(kind, counters)| KindTelemetry {
                    kind: *kind,
                    counters: *counters,
                })
                .collect(),
        }
    }
}

/// One row of a [`TelemetryReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindTelemetry {
    pub kind: OperationKind,
    #[serde(flatten)]
    pub counters: KindCounters,
}

/// Serializable telemetry surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub rows: Vec<KindTelemetry>,
}

impl fmt::Display for TelemetryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let c = &row.counters;
            writeln!(
                f,
                "{}: locations={} pre={} post={} exception={} deactivated={}",
                row.kind,
                c.location_count,
                c.pre_hits,
                c.post_hits,
                c.exception_hits,
                c.deactivated_count
            )?;
        }
        Ok(())
    }
}
