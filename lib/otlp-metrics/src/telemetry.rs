use metrics::{counter, Counter};

use crate::diagnostics::DiagnosticKind;

/// Internal telemetry for the translator.
#[derive(Clone)]
pub struct Telemetry {
    points_translated: Counter,
    points_dropped: Counter,
    unknown_metric_type: Counter,
    unsupported_aggregation_temporality: Counter,
    source_unavailable: Counter,
}

impl Telemetry {
    /// Registers the translator's counters with the current recorder.
    pub fn register() -> Self {
        Self {
            points_translated: counter!("otlp_translator_points_translated_total"),
            points_dropped: counter!("otlp_translator_points_dropped_total"),
            unknown_metric_type: diagnostics_counter(DiagnosticKind::UnknownMetricType),
            unsupported_aggregation_temporality: diagnostics_counter(
                DiagnosticKind::UnsupportedAggregationTemporality,
            ),
            source_unavailable: diagnostics_counter(DiagnosticKind::SourceUnavailable),
        }
    }

    /// Creates a `Telemetry` whose counters discard everything.
    pub fn noop() -> Self {
        Self {
            points_translated: Counter::noop(),
            points_dropped: Counter::noop(),
            unknown_metric_type: Counter::noop(),
            unsupported_aggregation_temporality: Counter::noop(),
            source_unavailable: Counter::noop(),
        }
    }

    pub(crate) fn points_translated(&self) -> &Counter {
        &self.points_translated
    }

    pub(crate) fn points_dropped(&self) -> &Counter {
        &self.points_dropped
    }

    pub(crate) fn diagnostics(&self, kind: DiagnosticKind) -> &Counter {
        match kind {
            DiagnosticKind::UnknownMetricType => &self.unknown_metric_type,
            DiagnosticKind::UnsupportedAggregationTemporality => &self.unsupported_aggregation_temporality,
            DiagnosticKind::SourceUnavailable => &self.source_unavailable,
        }
    }
}

fn diagnostics_counter(kind: DiagnosticKind) -> Counter {
    counter!("otlp_translator_diagnostics_total", "kind" => kind.as_str())
}
