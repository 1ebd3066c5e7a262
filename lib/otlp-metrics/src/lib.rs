//! Translation of OTLP metrics into Datadog-style points.
//!
//! [`Translator`] takes OTLP `ResourceMetrics` and produces [`TranslatedPoint`]s: counts, gauges, rates and
//! distributions, tagged from the resource, scope and data point attributes. Cumulative monotonic series are turned
//! into deltas through a [`DeltaCache`], whose idle entries are expired by a background task on the current Tokio
//! runtime.
//!
//! Metrics that cannot be translated are reported as [`Diagnostic`]s to a [`DiagnosticObserver`], and counted in the
//! [`MapMetricsReport`] returned for each call.
#![deny(missing_docs)]

mod cache;
pub use self::cache::{DeltaCache, SweeperHandle};

mod config;
pub use self::config::{
    ConfigError, HistogramMode, HistogramsConfiguration, MetricsConfiguration, NumberMode, ScopeMetadataTags,
    SummariesConfiguration, SumsConfiguration, TranslatorConfig, TranslatorConfigBuilder,
};

mod diagnostics;
pub use self::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticObserver, LoggingObserver, MapMetricsReport};

mod dimensions;
pub use self::dimensions::{Dimensions, SeriesIdentity};

mod histogram;
pub use self::histogram::{HistogramTranslator, Translation};

mod point;
pub use self::point::{
    BucketLayout, Consumer, DistributionValue, ExponentialBuckets, MetricKind, PointValue, Temporality, TranslatedPoint,
};

mod scope;

mod telemetry;
pub use self::telemetry::Telemetry;

mod translator;
pub use self::translator::{Translator, TranslatorError};
