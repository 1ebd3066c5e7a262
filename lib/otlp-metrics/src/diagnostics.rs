//! Diagnostics for metrics that could not be translated.

use tracing::warn;

/// The kind of a [`Diagnostic`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DiagnosticKind {
    /// The metric had no data or a data type that is not supported.
    UnknownMetricType,

    /// The metric had an aggregation temporality that is not supported for its type.
    UnsupportedAggregationTemporality,

    /// The fallback source provider failed.
    SourceUnavailable,
}

impl DiagnosticKind {
    /// Returns the name of this kind, as used in telemetry labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownMetricType => "unknown_metric_type",
            Self::UnsupportedAggregationTemporality => "unsupported_aggregation_temporality",
            Self::SourceUnavailable => "source_unavailable",
        }
    }
}

/// A problem encountered while translating a batch.
///
/// The affected metric, or the host of the affected resource, is skipped. Translation of the rest of the batch
/// continues.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A metric had no data or an unsupported data type.
    UnknownMetricType {
        /// Name of the skipped metric.
        metric_name: String,
    },

    /// A metric had an aggregation temporality that is not supported for its type.
    UnsupportedAggregationTemporality {
        /// Name of the skipped metric.
        metric_name: String,

        /// Data type of the metric.
        data_type: &'static str,

        /// Raw temporality value.
        temporality: i32,
    },

    /// The fallback source provider failed. The resource is translated without a host.
    SourceUnavailable {
        /// The provider's error.
        error: String,
    },
}

impl Diagnostic {
    /// Returns the kind of this diagnostic.
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::UnknownMetricType { .. } => DiagnosticKind::UnknownMetricType,
            Self::UnsupportedAggregationTemporality { .. } => DiagnosticKind::UnsupportedAggregationTemporality,
            Self::SourceUnavailable { .. } => DiagnosticKind::SourceUnavailable,
        }
    }
}

/// Observes diagnostics as they are encountered.
///
/// Observers are called synchronously, once per skipped metric, from the thread doing the translation.
pub trait DiagnosticObserver: Send + Sync {
    /// Called for each diagnostic.
    fn on_diagnostic(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticObserver for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

/// A [`DiagnosticObserver`] that logs each diagnostic as a warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl DiagnosticObserver for LoggingObserver {
    fn on_diagnostic(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::UnknownMetricType { metric_name } => {
                warn!(metric_name, "Unknown or unsupported metric type.");
            }
            Diagnostic::UnsupportedAggregationTemporality {
                metric_name,
                data_type,
                temporality,
            } => {
                warn!(
                    metric_name,
                    data_type, temporality, "Unknown or unsupported aggregation temporality."
                );
            }
            Diagnostic::SourceUnavailable { error } => {
                warn!(error, "Failed to get fallback source. Translating without host.");
            }
        }
    }
}

/// Summary of a translation call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MapMetricsReport {
    /// Number of points emitted to the consumer.
    pub points_translated: usize,

    /// Number of cumulative observations dropped because their timestamp was not newer than the last one seen.
    pub points_dropped: usize,

    /// Number of [`DiagnosticKind::UnknownMetricType`] diagnostics.
    pub unknown_metric_type: usize,

    /// Number of [`DiagnosticKind::UnsupportedAggregationTemporality`] diagnostics.
    pub unsupported_aggregation_temporality: usize,

    /// Number of [`DiagnosticKind::SourceUnavailable`] diagnostics.
    pub source_unavailable: usize,
}

impl MapMetricsReport {
    /// Returns the number of diagnostics of the given kind.
    pub fn diagnostics(&self, kind: DiagnosticKind) -> usize {
        match kind {
            DiagnosticKind::UnknownMetricType => self.unknown_metric_type,
            DiagnosticKind::UnsupportedAggregationTemporality => self.unsupported_aggregation_temporality,
            DiagnosticKind::SourceUnavailable => self.source_unavailable,
        }
    }

    pub(crate) fn record_diagnostic(&mut self, kind: DiagnosticKind) {
        match kind {
            DiagnosticKind::UnknownMetricType => self.unknown_metric_type += 1,
            DiagnosticKind::UnsupportedAggregationTemporality => self.unsupported_aggregation_temporality += 1,
            DiagnosticKind::SourceUnavailable => self.source_unavailable += 1,
        }
    }

    /// Adds the counts from another report to this one.
    pub fn merge(&mut self, other: &MapMetricsReport) {
        self.points_translated += other.points_translated;
        self.points_dropped += other.points_dropped;
        self.unknown_metric_type += other.unknown_metric_type;
        self.unsupported_aggregation_temporality += other.unsupported_aggregation_temporality;
        self.source_unavailable += other.source_unavailable;
    }
}
