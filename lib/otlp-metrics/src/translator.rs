use std::sync::{Arc, LazyLock};

use opentelemetry_proto::tonic::{
    metrics::v1::{
        metric::Data, number_data_point, AggregationTemporality, DataPointFlags, Metric, NumberDataPoint,
        ResourceMetrics,
    },
    resource::v1::Resource,
};
use otlp_attributes::{
    origin_id_from_attributes, resource_to_source, tags::Tag, tags_from_attributes, value::scalar_to_string,
    FastHashSet, Source, SourceKind,
};
use snafu::{ResultExt as _, Snafu};
use tokio::runtime::{Handle, TryCurrentError};
use tracing::debug;

use crate::cache::{DeltaCache, SweeperHandle};
use crate::config::TranslatorConfig;
use crate::diagnostics::{Diagnostic, DiagnosticObserver, MapMetricsReport};
use crate::dimensions::Dimensions;
use crate::histogram::{HistogramTranslator, Translation};
use crate::point::{Consumer, MetricKind, PointValue, Temporality, TranslatedPoint};
use crate::scope::scope_metadata_tags;
use crate::telemetry::Telemetry;

// Cumulative monotonic sums reported as per-second rates instead of counts.
static RATE_AS_GAUGE_METRICS: LazyLock<FastHashSet<&'static str>> = LazyLock::new(|| {
    FastHashSet::from_iter([
        "kafka.net.bytes_out.rate",
        "kafka.net.bytes_in.rate",
        "kafka.replication.isr_shrinks.rate",
        "kafka.replication.isr_expands.rate",
        "kafka.replication.leader_elections.rate",
        "jvm.gc.minor_collection_count",
        "jvm.gc.major_collection_count",
        "jvm.gc.minor_collection_time",
        "jvm.gc.major_collection_time",
        "kafka.messages_in.rate",
        "kafka.request.produce.failed.rate",
        "kafka.request.fetch.failed.rate",
        "kafka.replication.unclean_leader_elections.rate",
        "kafka.log.flush_rate.rate",
    ])
});

/// Translator error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum TranslatorError {
    /// The translator was created outside of a Tokio runtime.
    #[snafu(display("no Tokio runtime available to run the delta cache sweeper"))]
    NoRuntime {
        /// The underlying error.
        source: TryCurrentError,
    },
}

/// Translates OTLP metrics into Datadog-style points.
///
/// A translator owns the delta cache used for cumulative series, and the background task that expires idle series
/// from it. The task stops when the translator is dropped or [shut down][Self::shutdown].
///
/// Translation takes `&self`, so a single translator can be shared between threads.
pub struct Translator {
    config: TranslatorConfig,
    cache: DeltaCache,
    histograms: HistogramTranslator,
    observer: Arc<dyn DiagnosticObserver>,
    telemetry: Telemetry,
    sweeper: SweeperHandle,
}

impl Translator {
    /// Creates a new `Translator`.
    ///
    /// Diagnostics for metrics that cannot be translated are delivered to `observer`.
    ///
    /// # Errors
    ///
    /// If called outside of a Tokio runtime, an error is returned.
    pub fn new<O>(config: TranslatorConfig, observer: O) -> Result<Self, TranslatorError>
    where
        O: DiagnosticObserver + 'static,
    {
        let runtime = Handle::try_current().context(NoRuntime)?;

        let cache = DeltaCache::from_config(&config);
        let sweeper = cache.spawn_sweeper(&runtime);
        let histograms = HistogramTranslator::new(&config, cache.clone());

        Ok(Self {
            config,
            cache,
            histograms,
            observer: Arc::new(observer),
            telemetry: Telemetry::register(),
            sweeper,
        })
    }

    /// Replaces the translator's telemetry.
    ///
    /// By default, counters are registered with the global recorder when the translator is created.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Returns the delta cache.
    pub fn cache(&self) -> &DeltaCache {
        &self.cache
    }

    /// Translates a batch of resource metrics, returning the points along with a report.
    pub fn translate(&self, batch: &[ResourceMetrics]) -> (Vec<TranslatedPoint>, MapMetricsReport) {
        let mut points = Vec::new();
        let mut report = MapMetricsReport::default();
        for resource_metrics in batch {
            report.merge(&self.map_metrics(resource_metrics, &mut points));
        }
        (points, report)
    }

    /// Translates the metrics of a single resource, handing each point to `consumer`.
    pub fn map_metrics<C>(&self, resource_metrics: &ResourceMetrics, consumer: &mut C) -> MapMetricsReport
    where
        C: Consumer + ?Sized,
    {
        let mut report = MapMetricsReport::default();

        let empty = Resource::default();
        let resource = resource_metrics.resource.as_ref().unwrap_or(&empty);
        let source = self.resolve_source(resource, &mut report);

        let mut resource_tags = tags_from_attributes(&resource.attributes);
        if self.config.resource_attributes_as_tags() {
            for kv in &resource.attributes {
                if let Some(value) = scalar_to_string(kv) {
                    resource_tags.insert_tag(Tag::from_key_value(&kv.key, &value));
                }
            }
        }

        let mut host = None;
        match source {
            Some(Source {
                kind: SourceKind::Hostname,
                identifier,
            }) if !identifier.is_empty() => host = Some(identifier),
            Some(source @ Source {
                kind: SourceKind::AwsEcsFargate,
                ..
            }) => {
                resource_tags.insert_tag(source.tag());
            }
            _ => {}
        }

        let origin_id = Some(origin_id_from_attributes(&resource.attributes)).filter(|id| !id.is_empty());

        for scope_metrics in &resource_metrics.scope_metrics {
            let mut tags = resource_tags.clone();
            tags.extend(scope_metadata_tags(
                self.config.scope_metadata_tags(),
                scope_metrics.scope.as_ref(),
            ));

            for metric in &scope_metrics.metrics {
                let dims = Dimensions::new(metric.name.as_str())
                    .with_tags(tags.clone())
                    .with_host(host.clone())
                    .with_origin_id(origin_id.clone());

                // Points are buffered so that nothing is handed to the consumer while a cache shard is locked.
                let mut out = Translation::default();
                self.map_metric(metric, &dims, &mut out, &mut report);

                report.points_dropped += out.dropped;
                report.points_translated += out.points.len();
                for point in out.points {
                    consumer.consume(point);
                }
            }
        }

        self.telemetry
            .points_translated()
            .increment(report.points_translated as u64);
        self.telemetry.points_dropped().increment(report.points_dropped as u64);

        report
    }

    /// Stops the delta cache sweeper and waits for it to finish.
    pub async fn shutdown(self) {
        let Self { sweeper, .. } = self;
        sweeper.shutdown().await;
    }

    fn resolve_source(&self, resource: &Resource, report: &mut MapMetricsReport) -> Option<Source> {
        if let Some(source) = resource_to_source(resource) {
            return Some(source);
        }

        match self.config.fallback_source_provider().source() {
            Ok(source) => Some(source),
            Err(e) => {
                self.diagnose(report, Diagnostic::SourceUnavailable { error: e.to_string() });
                None
            }
        }
    }

    fn diagnose(&self, report: &mut MapMetricsReport, diagnostic: Diagnostic) {
        let kind = diagnostic.kind();
        report.record_diagnostic(kind);
        self.telemetry.diagnostics(kind).increment(1);
        self.observer.on_diagnostic(&diagnostic);
    }

    fn unsupported_temporality(
        &self, report: &mut MapMetricsReport, dims: &Dimensions, data_type: &'static str, temporality: i32,
    ) {
        self.diagnose(
            report,
            Diagnostic::UnsupportedAggregationTemporality {
                metric_name: dims.name().to_string(),
                data_type,
                temporality,
            },
        );
    }

    fn map_metric(&self, metric: &Metric, dims: &Dimensions, out: &mut Translation, report: &mut MapMetricsReport) {
        let Some(data) = &metric.data else {
            self.diagnose(
                report,
                Diagnostic::UnknownMetricType {
                    metric_name: metric.name.clone(),
                },
            );
            return;
        };

        match data {
            Data::Gauge(gauge) => map_number_points(dims, &gauge.data_points, MetricKind::Gauge, out),
            Data::Sum(sum) => match AggregationTemporality::try_from(sum.aggregation_temporality) {
                Ok(AggregationTemporality::Cumulative) => {
                    if sum.is_monotonic && self.config.send_monotonic() {
                        self.map_monotonic_points(dims, &sum.data_points, out);
                    } else {
                        // Non-monotonic cumulative sums, and monotonic ones in raw value mode, are gauges.
                        map_number_points(dims, &sum.data_points, MetricKind::Gauge, out);
                    }
                }
                Ok(AggregationTemporality::Delta) => {
                    map_number_points(dims, &sum.data_points, MetricKind::Count, out)
                }
                _ => self.unsupported_temporality(report, dims, "sum", sum.aggregation_temporality),
            },
            Data::Histogram(histogram) => {
                let temporality = match AggregationTemporality::try_from(histogram.aggregation_temporality) {
                    Ok(AggregationTemporality::Cumulative) => Temporality::Cumulative,
                    Ok(AggregationTemporality::Delta) => Temporality::Delta,
                    _ => {
                        self.unsupported_temporality(report, dims, "histogram", histogram.aggregation_temporality);
                        return;
                    }
                };

                for dp in histogram.data_points.iter().filter(|dp| has_recorded_value(dp.flags)) {
                    let point_dims = dims.with_attribute_map(&dp.attributes);
                    merge(out, self.histograms.translate(&point_dims, dp, temporality));
                }
            }
            Data::ExponentialHistogram(histogram) => {
                if !matches!(
                    AggregationTemporality::try_from(histogram.aggregation_temporality),
                    Ok(AggregationTemporality::Delta)
                ) {
                    self.unsupported_temporality(
                        report,
                        dims,
                        "exponential_histogram",
                        histogram.aggregation_temporality,
                    );
                    return;
                }

                for dp in histogram.data_points.iter().filter(|dp| has_recorded_value(dp.flags)) {
                    let point_dims = dims.with_attribute_map(&dp.attributes);
                    merge(out, self.histograms.translate_exponential(&point_dims, dp));
                }
            }
            Data::Summary(summary) => {
                for dp in summary.data_points.iter().filter(|dp| has_recorded_value(dp.flags)) {
                    let point_dims = dims.with_attribute_map(&dp.attributes);
                    merge(out, self.histograms.translate_summary(&point_dims, dp));
                }
            }
        }
    }

    fn map_monotonic_points(&self, dims: &Dimensions, data_points: &[NumberDataPoint], out: &mut Translation) {
        let as_rate = RATE_AS_GAUGE_METRICS.contains(dims.name());

        for dp in data_points.iter().filter(|dp| has_recorded_value(dp.flags)) {
            let point_dims = dims.with_attribute_map(&dp.attributes);
            let Some(value) = finite_value(&point_dims, dp) else {
                continue;
            };

            let observation = self.cache.observe(&point_dims.identity(), dp.time_unix_nano, value);
            if observation.is_stale() {
                debug!(
                    metric_name = point_dims.name(),
                    timestamp = dp.time_unix_nano,
                    "Dropping cumulative point with a timestamp not newer than the last one seen."
                );
                out.dropped += 1;
                continue;
            }

            let translated = if as_rate {
                observation.rate().map(|rate| (MetricKind::Rate, rate))
            } else {
                observation.delta().map(|delta| (MetricKind::Count, delta))
            };

            if let Some((kind, value)) = translated {
                out.points
                    .push(point_dims.to_point(kind, PointValue::Scalar(value), dp.time_unix_nano));
            }
        }
    }
}

fn map_number_points(dims: &Dimensions, data_points: &[NumberDataPoint], kind: MetricKind, out: &mut Translation) {
    for dp in data_points.iter().filter(|dp| has_recorded_value(dp.flags)) {
        let point_dims = dims.with_attribute_map(&dp.attributes);
        if let Some(value) = finite_value(&point_dims, dp) {
            out.points
                .push(point_dims.to_point(kind, PointValue::Scalar(value), dp.time_unix_nano));
        }
    }
}

fn has_recorded_value(flags: u32) -> bool {
    flags & (DataPointFlags::NoRecordedValueMask as u32) == 0
}

fn finite_value(dims: &Dimensions, dp: &NumberDataPoint) -> Option<f64> {
    let value = match dp.value? {
        number_data_point::Value::AsDouble(value) => value,
        number_data_point::Value::AsInt(value) => value as f64,
    };

    if !value.is_finite() {
        debug!(
            metric_name = dims.name(),
            value, "Skipping metric with unsupported value (NaN or Infinity)."
        );
        return None;
    }
    Some(value)
}

fn merge(out: &mut Translation, other: Translation) {
    out.points.extend(other.points);
    out.dropped += other.dropped;
}
