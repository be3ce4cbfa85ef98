//! Explicit dispatch context threaded through every call-in.

use crate::config::DispatchConfig;
use crate::controller::InstrumentationController;
use crate::counters::{AggregateCounters, TelemetryReport};
use crate::relay::ValueRelay;
use crate::reporter::ErrorReporter;

/// Shared state of one monitored execution path.
///
/// One context per logical thread of control: the relay slot and the
/// enable gate are not meant to be shared across concurrently running paths.
#[derive(Debug, Default)]
pub struct DispatchContext {
    controller: InstrumentationController,
    relay: ValueRelay,
    reporter: ErrorReporter,
    counters: AggregateCounters,
}

impl DispatchContext {
    pub fn new(config: DispatchConfig) -> Self {
        DispatchContext {
            controller: InstrumentationController::new(config.enabled),
            relay: ValueRelay::new(),
            reporter: ErrorReporter::new(config.ignore_analysis_faults),
            counters: AggregateCounters::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn controller(&self) -> &InstrumentationController {
        &self.controller
    }

    pub fn is_enabled(&self) -> bool {
        self.controller.is_enabled()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.controller.set_enabled(enabled);
    }

    pub fn relay(&self) -> &ValueRelay {
        &self.relay
    }

    pub fn relay_mut(&mut self) -> &mut ValueRelay {
        &mut self.relay
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut ErrorReporter {
        &mut self.reporter
    }

    pub fn counters(&self) -> &AggregateCounters {
        &self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut AggregateCounters {
        &mut self.counters
    }

    pub fn telemetry(&self) -> TelemetryReport {
        self.counters.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flows_into_components() {
        let ctx = DispatchContext::new(DispatchConfig {
            enabled: false,
            ignore_analysis_faults: true,
        });
        assert!(!ctx.is_enabled());
        assert!(ctx.reporter().ignores_analysis_faults());
        assert!(!ctx.relay().is_pending());
        assert!(ctx.telemetry().rows.is_empty());
    }
}
