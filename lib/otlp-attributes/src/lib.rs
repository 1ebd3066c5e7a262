//! Datadog tag derivation from OTLP resource attributes.
//!
//! This crate maps OpenTelemetry semantic-convention attributes onto the tag names used by Datadog: unified service
//! tags, Kubernetes and container metadata, process and OS information. It also resolves the source (host or ECS
//! Fargate task) and the origin identifier of a resource.
#![deny(missing_docs)]

use std::collections::HashMap;

use opentelemetry_proto::tonic::common::v1::KeyValue;
use opentelemetry_semantic_conventions::resource::{CONTAINER_ID, K8S_POD_UID};

mod mappings;
use self::mappings::*;

mod process;
use self::process::ProcessAttributes;

pub mod source;
pub use self::source::{resource_to_source, NoopSourceProvider, Source, SourceKind, SourceProvider};

mod system;
use self::system::system_tag;

pub mod tags;
use self::tags::{Tag, TagSet};

pub mod value;
use self::value::string_value;

/// A generic error.
pub type GenericError = anyhow::Error;

/// A hash map using `foldhash` for fast, quality hashing.
pub type FastHashMap<K, V> = hashbrown::HashMap<K, V, foldhash::quality::RandomState>;

/// A hash set using `foldhash` for fast, quality hashing.
pub type FastHashSet<T> = hashbrown::HashSet<T, foldhash::quality::RandomState>;

/// Derives Datadog tags from OTLP resource attributes.
///
/// Only string attributes are considered, and attributes with empty values are skipped. Attributes that have no
/// Datadog counterpart are dropped.
pub fn tags_from_attributes(attributes: &[KeyValue]) -> TagSet {
    let mut tags = TagSet::default();
    let mut process = ProcessAttributes::default();

    for kv in attributes {
        let Some(value) = string_value(kv) else {
            continue;
        };
        let key = kv.key.as_str();

        if process.observe(key, value) {
            continue;
        }

        if let Some(tag) = system_tag(key, value) {
            tags.insert_tag(tag);
            continue;
        }

        if value.is_empty() {
            continue;
        }

        if let Some(datadog_key) = CORE_MAPPING.get(key) {
            tags.insert_tag(Tag::from_key_value(datadog_key, value));
        }

        if let Some(datadog_key) = KUBERNETES_MAPPING.get(key) {
            tags.insert_tag(Tag::from_key_value(datadog_key, value));
        }

        if let Some(label) = key.strip_prefix(DATADOG_LABEL_PREFIX) {
            if !label.is_empty() {
                tags.insert_tag(Tag::from_key_value(label, value));
            }
        }

        if KUBERNETES_DD_TAGS.contains(key) {
            tags.insert_tag(Tag::from_key_value(key, value));
        }
    }

    if let Some(tag) = process.extract_tag() {
        tags.insert_tag(tag);
    }

    visit_container_tags(attributes, |key, value| {
        tags.insert_tag(Tag::from_key_value(key, value));
    });

    tags
}

/// Derives container tags from resource attributes.
///
/// Semantic-convention container, cloud, ECS and Kubernetes attributes are mapped to their Datadog names. Attributes
/// under the `datadog.container.tag.` namespace are forwarded with the prefix removed, unless the same tag was
/// already set through a semantic-convention attribute.
pub fn container_tags_from_resource_attributes(attributes: &[KeyValue]) -> HashMap<String, String> {
    let mut container_tags = HashMap::new();
    visit_container_tags(attributes, |key, value| {
        container_tags.insert(key.to_string(), value.to_string());
    });
    container_tags
}

/// Derives container tags from a plain attribute map.
///
/// Only allow-listed container, cloud, ECS and Kubernetes keys are kept, renamed to their Datadog names. Values are
/// kept as-is, including empty ones.
pub fn container_tags_from_attributes(attributes: &HashMap<String, String>) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(key, value)| {
            CONTAINER_MAPPINGS
                .get(key.as_str())
                .map(|datadog_key| (datadog_key.to_string(), value.clone()))
        })
        .collect()
}

/// Derives the origin identifier of a resource.
///
/// A container ID takes precedence over a pod UID. When neither is present, an empty string is returned.
pub fn origin_id_from_attributes(attributes: &[KeyValue]) -> String {
    let mut pod_uid = None;

    for kv in attributes {
        let Some(value) = string_value(kv) else {
            continue;
        };

        match kv.key.as_str() {
            CONTAINER_ID => return format!("container_id://{}", value),
            K8S_POD_UID => pod_uid = Some(value),
            _ => {}
        }
    }

    pod_uid
        .map(|uid| format!("kubernetes_pod_uid://{}", uid))
        .unwrap_or_default()
}

fn visit_container_tags<'a, F>(attributes: &'a [KeyValue], mut visit: F)
where
    F: FnMut(&'a str, &'a str),
{
    let mut extracted = FastHashSet::default();

    for kv in attributes {
        let Some(value) = string_value(kv).filter(|v| !v.is_empty()) else {
            continue;
        };

        if let Some(datadog_key) = CONTAINER_MAPPINGS.get(kv.key.as_str()) {
            extracted.insert(*datadog_key);
            visit(*datadog_key, value);
        }
    }

    for kv in attributes {
        let Some(value) = string_value(kv).filter(|v| !v.is_empty()) else {
            continue;
        };

        if let Some(custom_key) = kv.key.strip_prefix(CUSTOM_CONTAINER_TAG_PREFIX) {
            if !custom_key.is_empty() && extracted.insert(custom_key) {
                visit(custom_key, value);
            }
        }
    }
}
