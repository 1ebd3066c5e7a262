//! Translated output points.

use otlp_attributes::tags::TagSet;
use serde::Serialize;

/// The Datadog metric type of a translated point.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// A count over the interval ending at the point's timestamp.
    Count,

    /// A point-in-time value.
    Gauge,

    /// A per-second rate.
    Rate,

    /// A distribution of values.
    Distribution,
}

/// The aggregation temporality of a distribution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    /// Values cover the interval since the previous report.
    Delta,

    /// Values cover the interval since the start of the series.
    Cumulative,
}

/// A run of consecutive exponential buckets.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExponentialBuckets {
    /// Index of the first bucket.
    pub offset: i32,

    /// Count per bucket, starting at `offset`.
    pub counts: Vec<u64>,
}

/// The bucket layout of a distribution, as reported by the source.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BucketLayout {
    /// Buckets with explicit upper bounds. There is one more count than there are bounds.
    Explicit {
        /// Upper bounds, exclusive of the final open-ended bucket.
        bounds: Vec<f64>,

        /// Count per bucket.
        counts: Vec<u64>,
    },

    /// Base-2 exponential buckets.
    Exponential {
        /// Resolution of the buckets.
        scale: i32,

        /// Count of values in the zero bucket.
        zero_count: u64,

        /// Buckets for positive values.
        positive: ExponentialBuckets,

        /// Buckets for negative values.
        negative: ExponentialBuckets,
    },
}

/// A distribution value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionValue {
    /// Number of values.
    pub count: u64,

    /// Sum of values, if reported.
    pub sum: Option<f64>,

    /// Minimum value, if reported.
    pub min: Option<f64>,

    /// Maximum value, if reported.
    pub max: Option<f64>,

    /// Aggregation temporality of the counts.
    pub temporality: Temporality,

    /// Bucket layout.
    pub layout: BucketLayout,
}

/// The value of a translated point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    /// A single value.
    Scalar(f64),

    /// A distribution.
    Distribution(DistributionValue),
}

impl PointValue {
    /// Returns the scalar value, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Distribution(_) => None,
        }
    }

    /// Returns the distribution value, if this is one.
    pub fn as_distribution(&self) -> Option<&DistributionValue> {
        match self {
            Self::Scalar(_) => None,
            Self::Distribution(value) => Some(value),
        }
    }
}

/// A translated point, ready to be sent to Datadog.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslatedPoint {
    /// Metric name.
    pub name: String,

    /// Value.
    pub value: PointValue,

    /// Timestamp, in seconds since the Unix epoch.
    pub timestamp: u64,

    /// Tags.
    pub tags: TagSet,

    /// Host, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Origin identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,

    /// Metric type.
    pub kind: MetricKind,
}

/// Receives translated points.
pub trait Consumer {
    /// Consumes a single point.
    fn consume(&mut self, point: TranslatedPoint);
}

impl Consumer for Vec<TranslatedPoint> {
    fn consume(&mut self, point: TranslatedPoint) {
        self.push(point);
    }
}
