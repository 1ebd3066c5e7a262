//! Histogram and summary translation.

use opentelemetry_proto::tonic::metrics::v1::{
    exponential_histogram_data_point::Buckets, ExponentialHistogramDataPoint, HistogramDataPoint, SummaryDataPoint,
};
use otlp_attributes::tags::Tag;
use tracing::debug;

use crate::cache::{DeltaCache, Observation};
use crate::config::{HistogramMode, TranslatorConfig};
use crate::dimensions::Dimensions;
use crate::point::{
    BucketLayout, DistributionValue, ExponentialBuckets, MetricKind, PointValue, Temporality, TranslatedPoint,
};

/// Points produced from a single data point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Translation {
    /// Points to emit, in order.
    pub points: Vec<TranslatedPoint>,

    /// Number of cumulative observations dropped as stale.
    pub dropped: usize,
}

impl Translation {
    fn push(&mut self, dims: &Dimensions, kind: MetricKind, value: f64, timestamp_ns: u64) {
        self.points
            .push(dims.to_point(kind, PointValue::Scalar(value), timestamp_ns));
    }

    fn record(&mut self, observation: Observation) -> Option<f64> {
        if observation.is_stale() {
            self.dropped += 1;
        }
        observation.delta()
    }
}

/// Translates histogram, exponential histogram and summary data points.
///
/// Cumulative counts are turned into deltas with the shared [`DeltaCache`].
#[derive(Clone)]
pub struct HistogramTranslator {
    mode: HistogramMode,
    send_aggregations: bool,
    quantiles: bool,
    cache: DeltaCache,
}

impl HistogramTranslator {
    /// Creates a new `HistogramTranslator` from the configuration, backed by the given cache.
    pub fn new(config: &TranslatorConfig, cache: DeltaCache) -> Self {
        Self {
            mode: config.histogram_mode(),
            send_aggregations: config.send_histogram_aggregations(),
            quantiles: config.quantiles(),
            cache,
        }
    }

    fn emits_aggregates(&self) -> bool {
        self.mode == HistogramMode::NoBuckets || self.send_aggregations
    }

    /// Translates an explicit-bucket histogram data point.
    pub fn translate(&self, dims: &Dimensions, point: &HistogramDataPoint, temporality: Temporality) -> Translation {
        let mut out = Translation::default();
        let ts = point.time_unix_nano;

        if self.emits_aggregates() {
            self.aggregates(
                &mut out,
                dims,
                ts,
                Aggregates {
                    count: point.count,
                    sum: point.sum,
                    min: point.min,
                    max: point.max,
                },
                temporality,
            );
        }

        match self.mode {
            HistogramMode::NoBuckets => {}
            HistogramMode::Counters => self.bucket_counters(&mut out, dims, point, temporality),
            HistogramMode::Distributions => {
                let value = DistributionValue {
                    count: point.count,
                    sum: finite(dims, "sum", point.sum),
                    min: finite(dims, "min", point.min),
                    max: finite(dims, "max", point.max),
                    temporality,
                    layout: BucketLayout::Explicit {
                        bounds: point.explicit_bounds.clone(),
                        counts: point.bucket_counts.clone(),
                    },
                };
                out.points
                    .push(dims.to_point(MetricKind::Distribution, PointValue::Distribution(value), ts));
            }
        }

        out
    }

    /// Translates an exponential histogram data point.
    ///
    /// Only delta exponential histograms are supported.
    pub fn translate_exponential(&self, dims: &Dimensions, point: &ExponentialHistogramDataPoint) -> Translation {
        let mut out = Translation::default();
        let ts = point.time_unix_nano;

        if self.emits_aggregates() {
            self.aggregates(
                &mut out,
                dims,
                ts,
                Aggregates {
                    count: point.count,
                    sum: point.sum,
                    min: point.min,
                    max: point.max,
                },
                Temporality::Delta,
            );
        }

        if self.mode != HistogramMode::NoBuckets {
            let value = DistributionValue {
                count: point.count,
                sum: finite(dims, "sum", point.sum),
                min: finite(dims, "min", point.min),
                max: finite(dims, "max", point.max),
                temporality: Temporality::Delta,
                layout: BucketLayout::Exponential {
                    scale: point.scale,
                    zero_count: point.zero_count,
                    positive: exponential_buckets(point.positive.as_ref()),
                    negative: exponential_buckets(point.negative.as_ref()),
                },
            };
            out.points
                .push(dims.to_point(MetricKind::Distribution, PointValue::Distribution(value), ts));
        }

        out
    }

    /// Translates a summary data point.
    ///
    /// `.count` and `.sum` are cumulative and reported as deltas. Quantiles are reported as `.quantile` gauges tagged
    /// with `quantile:<q>` when enabled.
    pub fn translate_summary(&self, dims: &Dimensions, point: &SummaryDataPoint) -> Translation {
        let mut out = Translation::default();
        let ts = point.time_unix_nano;

        let count_dims = dims.with_suffix("count");
        if let Some(delta) = out.record(self.cache.observe(&count_dims.identity(), ts, point.count as f64)) {
            out.push(&count_dims, MetricKind::Count, delta, ts);
        }

        if point.sum.is_finite() {
            let sum_dims = dims.with_suffix("sum");
            if let Some(delta) = out.record(self.cache.observe(&sum_dims.identity(), ts, point.sum)) {
                out.push(&sum_dims, MetricKind::Count, delta, ts);
            }
        } else {
            debug!(metric_name = dims.name(), sum = point.sum, "Skipping non-finite summary sum.");
        }

        if self.quantiles {
            let quantile_dims = dims.with_suffix("quantile");
            for quantile in &point.quantile_values {
                if !quantile.value.is_finite() {
                    debug!(
                        metric_name = dims.name(),
                        quantile = quantile.quantile,
                        "Skipping non-finite quantile value."
                    );
                    continue;
                }

                let tagged = quantile_dims.add_tags([Tag::from_key_value("quantile", &quantile.quantile.to_string())]);
                out.push(&tagged, MetricKind::Gauge, quantile.value, ts);
            }
        }

        out
    }

    fn aggregates(
        &self, out: &mut Translation, dims: &Dimensions, ts: u64, aggregates: Aggregates, temporality: Temporality,
    ) {
        let count_dims = dims.with_suffix("count");
        let sum_dims = dims.with_suffix("sum");
        let min_dims = dims.with_suffix("min");
        let max_dims = dims.with_suffix("max");
        let sum = finite(dims, "sum", aggregates.sum);
        let min = finite(dims, "min", aggregates.min);
        let max = finite(dims, "max", aggregates.max);

        match temporality {
            Temporality::Delta => {
                out.push(&count_dims, MetricKind::Count, aggregates.count as f64, ts);
                if let Some(sum) = sum {
                    out.push(&sum_dims, MetricKind::Count, sum, ts);
                }

                if self.send_aggregations {
                    if let Some(min) = min {
                        out.push(&min_dims, MetricKind::Gauge, min, ts);
                    }
                    if let Some(max) = max {
                        out.push(&max_dims, MetricKind::Gauge, max, ts);
                    }
                }
            }
            Temporality::Cumulative => {
                let count = aggregates.count as f64;
                let count_delta = out.record(self.cache.observe(&count_dims.identity(), ts, count));
                let sum_delta = sum.map(|sum| out.record(self.cache.observe(&sum_dims.identity(), ts, sum)));

                // Cumulative extrema are only reported when they were reached in the last window.
                let (min, max) = if self.send_aggregations {
                    (
                        min.filter(|min| self.cache.observe_extremum(&min_dims.identity(), ts, *min)),
                        max.filter(|max| self.cache.observe_extremum(&max_dims.identity(), ts, *max)),
                    )
                } else {
                    (None, None)
                };

                let (count, sum) = match (count_delta, sum_delta) {
                    (Some(count), None) => (count, None),
                    (Some(count), Some(Some(sum))) => (count, Some(sum)),
                    _ => return,
                };

                out.push(&count_dims, MetricKind::Count, count, ts);
                if let Some(sum) = sum {
                    out.push(&sum_dims, MetricKind::Count, sum, ts);
                }
                if let Some(min) = min {
                    out.push(&min_dims, MetricKind::Gauge, min, ts);
                }
                if let Some(max) = max {
                    out.push(&max_dims, MetricKind::Gauge, max, ts);
                }
            }
        }
    }

    fn bucket_counters(
        &self, out: &mut Translation, dims: &Dimensions, point: &HistogramDataPoint, temporality: Temporality,
    ) {
        let bounds = &point.explicit_bounds;
        let counts = &point.bucket_counts;
        if counts.is_empty() {
            return;
        }
        if counts.len() != bounds.len() + 1 {
            debug!(
                metric_name = dims.name(),
                buckets = counts.len(),
                bounds = bounds.len(),
                "Skipping histogram buckets with mismatched bounds."
            );
            return;
        }

        let ts = point.time_unix_nano;
        let bucket_dims = dims.with_suffix("bucket");
        for (i, count) in counts.iter().enumerate() {
            let lower = if i == 0 { f64::NEG_INFINITY } else { bounds[i - 1] };
            let upper = if i == bounds.len() { f64::INFINITY } else { bounds[i] };
            let tagged = bucket_dims.add_tags([
                Tag::from_key_value("lower_bound", &format_bound(lower)),
                Tag::from_key_value("upper_bound", &format_bound(upper)),
            ]);

            let value = match temporality {
                Temporality::Delta => Some(*count as f64),
                Temporality::Cumulative => out.record(self.cache.observe(&tagged.identity(), ts, *count as f64)),
            };
            if let Some(value) = value {
                out.push(&tagged, MetricKind::Count, value, ts);
            }
        }
    }
}

struct Aggregates {
    count: u64,
    sum: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

fn finite(dims: &Dimensions, field: &'static str, value: Option<f64>) -> Option<f64> {
    value.filter(|value| {
        let finite = value.is_finite();
        if !finite {
            debug!(metric_name = dims.name(), field, value, "Skipping non-finite histogram value.");
        }
        finite
    })
}

fn format_bound(bound: f64) -> String {
    bound.to_string()
}

fn exponential_buckets(buckets: Option<&Buckets>) -> ExponentialBuckets {
    buckets
        .map(|buckets| ExponentialBuckets {
            offset: buckets.offset,
            counts: buckets.bucket_counts.clone(),
        })
        .unwrap_or_default()
}
