//! Series dimensions and identity.

use opentelemetry_proto::tonic::common::v1::KeyValue;
use otlp_attributes::{
    tags::{Tag, TagSet},
    value::scalar_to_string,
};

use crate::point::{MetricKind, PointValue, TranslatedPoint};

/// The dimensions of a series being translated: name, tags, host and origin.
#[derive(Clone, Debug, Default)]
pub struct Dimensions {
    name: String,
    tags: TagSet,
    host: Option<String>,
    origin_id: Option<String>,
}

impl Dimensions {
    /// Creates a new `Dimensions` with the given name and no tags, host or origin.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    /// Sets the origin identifier.
    pub fn with_origin_id(mut self, origin_id: Option<String>) -> Self {
        self.origin_id = origin_id;
        self
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tags.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Returns the host, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the origin identifier, if any.
    pub fn origin_id(&self) -> Option<&str> {
        self.origin_id.as_deref()
    }

    /// Creates a new `Dimensions` with a different name and the same tags, host and origin.
    pub fn with_name<S: Into<String>>(&self, name: S) -> Self {
        Self {
            name: name.into(),
            tags: self.tags.clone(),
            host: self.host.clone(),
            origin_id: self.origin_id.clone(),
        }
    }

    /// Creates a new `Dimensions` with `.<suffix>` appended to the name.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        self.with_name(format!("{}.{}", self.name, suffix))
    }

    /// Creates a new `Dimensions` with additional tags.
    pub fn add_tags<I, T>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let mut new = self.clone();
        new.tags.extend(tags);
        new
    }

    /// Creates a new `Dimensions` with tags from data point attributes.
    ///
    /// Attributes with string, boolean, integer or double values become `key:value` tags. They come before the existing
    /// tags.
    pub fn with_attribute_map(&self, attributes: &[KeyValue]) -> Self {
        if attributes.is_empty() {
            return self.clone();
        }

        let mut tags = TagSet::with_capacity(attributes.len() + self.tags.len());
        for kv in attributes {
            if let Some(value) = scalar_to_string(kv) {
                tags.insert_tag(Tag::from_key_value(&kv.key, &value));
            }
        }
        tags.merge_missing(&self.tags);

        Self {
            name: self.name.clone(),
            tags,
            host: self.host.clone(),
            origin_id: self.origin_id.clone(),
        }
    }

    /// Returns the identity of the series described by these dimensions.
    pub fn identity(&self) -> SeriesIdentity {
        SeriesIdentity::new(&self.name, &self.tags, self.host.clone(), self.origin_id.clone())
    }

    /// Builds a point for this series.
    pub(crate) fn to_point(&self, kind: MetricKind, value: PointValue, timestamp_ns: u64) -> TranslatedPoint {
        TranslatedPoint {
            name: self.name.clone(),
            value,
            timestamp: timestamp_ns / 1_000_000_000,
            tags: self.tags.clone(),
            host: self.host.clone(),
            origin_id: self.origin_id.clone(),
            kind,
        }
    }
}

/// The identity of a single logical time series.
///
/// Two identities are equal when they have the same name, host, origin and tags, regardless of the order in which the
/// tags were given. Duplicate tags are ignored.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SeriesIdentity {
    name: String,
    tags: Box<[String]>,
    host: Option<String>,
    origin_id: Option<String>,
}

impl SeriesIdentity {
    /// Creates a new `SeriesIdentity`.
    pub fn new<I, T>(name: &str, tags: I, host: Option<String>, origin_id: Option<String>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut tags: Vec<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        tags.sort_unstable();
        tags.dedup();

        Self {
            name: name.to_string(),
            tags: tags.into_boxed_slice(),
            host,
            origin_id,
        }
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tags, sorted.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the host, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the origin identifier, if any.
    pub fn origin_id(&self) -> Option<&str> {
        self.origin_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};
    use proptest::prelude::*;

    use super::*;

    fn kv(key: &str, value: Value) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    #[test]
    fn with_suffix_keeps_everything_else() {
        let dims = Dimensions::new("http.duration")
            .with_tags(["env:prod"].into_iter().collect())
            .with_host(Some("host-1".to_string()))
            .with_origin_id(Some("container_id://abc".to_string()));

        let count = dims.with_suffix("count");
        assert_eq!(count.name(), "http.duration.count");
        assert_eq!(count.tags(), dims.tags());
        assert_eq!(count.host(), Some("host-1"));
        assert_eq!(count.origin_id(), Some("container_id://abc"));
    }

    #[test]
    fn attribute_map_renders_scalars() {
        let dims = Dimensions::new("m").with_tags(["service:api"].into_iter().collect());
        let attributes = vec![
            kv("code", Value::IntValue(200)),
            kv("ok", Value::BoolValue(true)),
            kv("ratio", Value::DoubleValue(0.25)),
            kv("route", Value::StringValue("/users".to_string())),
            kv("blob", Value::BytesValue(vec![1, 2, 3])),
        ];

        let point_dims = dims.with_attribute_map(&attributes);
        assert_eq!(
            point_dims.tags().to_sorted_strings(),
            vec!["code:200", "ok:true", "ratio:0.25", "route:/users", "service:api"]
        );
    }

    #[test]
    fn identity_ignores_tag_order_and_duplicates() {
        let a = SeriesIdentity::new("m", ["b:2", "a:1"], None, None);
        let b = SeriesIdentity::new("m", ["a:1", "b:2", "a:1"], None, None);
        assert_eq!(a, b);
        assert_eq!(a.tags(), &["a:1".to_string(), "b:2".to_string()]);
    }

    #[test]
    fn identity_distinguishes_host_and_origin() {
        let base = SeriesIdentity::new("m", ["a:1"], None, None);
        let with_host = SeriesIdentity::new("m", ["a:1"], Some("h".to_string()), None);
        let with_origin = SeriesIdentity::new("m", ["a:1"], None, Some("container_id://x".to_string()));
        assert_ne!(base, with_host);
        assert_ne!(base, with_origin);
        assert_ne!(with_host, with_origin);
    }

    #[test]
    fn attribute_order_does_not_change_identity() {
        let dims = Dimensions::new("m");
        let forward = vec![
            kv("a", Value::StringValue("1".to_string())),
            kv("b", Value::StringValue("2".to_string())),
        ];
        let backward: Vec<KeyValue> = forward.iter().rev().cloned().collect();
        assert_eq!(
            dims.with_attribute_map(&forward).identity(),
            dims.with_attribute_map(&backward).identity()
        );
    }

    proptest! {
        #[test]
        fn property_identity_is_order_independent(
            mut tags in proptest::collection::vec("[a-z]{1,4}:[a-z0-9]{0,4}", 0..12),
        ) {
            let original = SeriesIdentity::new("metric", tags.iter(), Some("host".to_string()), None);
            tags.reverse();
            let reversed = SeriesIdentity::new("metric", tags.iter(), Some("host".to_string()), None);
            prop_assert_eq!(original, reversed);
        }
    }
}
